//! # Cargador de Contenido
//! src/cache/loader.rs
//!
//! Frontera con el sistema de archivos: lo único que la caché necesita es
//! saber si un recurso existe y leerlo completo.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Fuente de contenido para la caché
pub trait ContentLoader: Send + Sync + 'static {
    /// ¿Existe un recurso legible para esta clave?
    fn exists(&self, key: &str) -> bool;

    /// Lee el recurso completo
    ///
    /// La caché solo lo llama después de que `exists` respondió `true`.
    fn load(&self, key: &str) -> io::Result<Vec<u8>>;
}

/// Carga archivos relativos a un directorio raíz
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Traduce una clave (path del request) a una ruta bajo la raíz
    ///
    /// Retorna `None` si la clave intenta salir de la raíz (`..`, prefijos de
    /// unidad) o no nombra nada.
    ///
    /// # Ejemplo
    /// ```
    /// use file_server::cache::FsLoader;
    /// use std::path::Path;
    ///
    /// let loader = FsLoader::new("/srv/www");
    /// assert_eq!(loader.resolve("/docs/a.txt").as_deref(), Some(Path::new("/srv/www/docs/a.txt")));
    /// assert_eq!(loader.resolve("/../etc/passwd"), None);
    /// ```
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        let mut named = false;

        for component in Path::new(key.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    named = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        named.then_some(path)
    }
}

impl ContentLoader for FsLoader {
    fn exists(&self, key: &str) -> bool {
        self.resolve(key).is_some_and(|path| path.is_file())
    }

    fn load(&self, key: &str) -> io::Result<Vec<u8>> {
        let path = self
            .resolve(key)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("invalid path: {}", key)))?;

        fs::read(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_under_root() {
        let loader = FsLoader::new("/srv/www");
        assert_eq!(
            loader.resolve("/a/b.txt"),
            Some(PathBuf::from("/srv/www/a/b.txt"))
        );
        assert_eq!(
            loader.resolve("/./a.txt"),
            Some(PathBuf::from("/srv/www/a.txt"))
        );
    }

    #[test]
    fn test_resolve_rejects_traversal_and_empty() {
        let loader = FsLoader::new("/srv/www");
        assert_eq!(loader.resolve("/../secret"), None);
        assert_eq!(loader.resolve("/a/../../secret"), None);
        assert_eq!(loader.resolve("/"), None);
        assert_eq!(loader.resolve(""), None);
    }

    #[test]
    fn test_load_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), b"hi").unwrap();
        let loader = FsLoader::new(dir.path());

        assert!(loader.exists("/hello.txt"));
        assert_eq!(loader.load("/hello.txt").unwrap(), b"hi");
    }

    #[test]
    fn test_load_missing_and_directories_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let loader = FsLoader::new(dir.path());

        assert!(!loader.exists("/missing.txt"));
        assert_eq!(
            loader.load("/missing.txt").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );

        assert!(!loader.exists("/sub"));
        assert!(loader.load("/sub").is_err());
    }
}
