//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor de archivos con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./file_server --root ./public --port 8080 \
//!   --workers 8 \
//!   --cache-ttl-secs 60 \
//!   --idle-timeout-secs 30
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! FILE_ROOT=./public HTTP_PORT=8080 HTTP_HOST=0.0.0.0 ./file_server
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Configuración del servidor de archivos
#[derive(Debug, Clone, Parser)]
#[command(name = "file_server")]
#[command(about = "Servidor concurrente de archivos estáticos")]
#[command(version)]
pub struct Config {
    /// Directorio raíz desde donde se sirven los archivos
    #[arg(short = 'd', long, default_value = ".", env = "FILE_ROOT")]
    pub root: PathBuf,

    /// Puerto en el que escucha el servidor (0 = puerto efímero)
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    // === Concurrencia ===

    /// Threads del pool que leen archivos (se acota a núcleos × 5)
    #[arg(long, default_value = "4", env = "WORKERS")]
    pub workers: usize,

    /// Threads del runtime async que atienden los sockets
    #[arg(long = "reactor-threads", default_value = "2", env = "REACTOR_THREADS")]
    pub reactor_threads: usize,

    // === Caché ===

    /// Segundos que una entrada de caché se considera fresca
    #[arg(long = "cache-ttl-secs", default_value = "30", env = "CACHE_TTL_SECS")]
    pub cache_ttl_secs: u64,

    /// Cada cuántos segundos se eliminan entradas vencidas (0 = nunca)
    #[arg(long = "cache-sweep-secs", default_value = "0", env = "CACHE_SWEEP_SECS")]
    pub cache_sweep_secs: u64,

    // === Conexiones ===

    /// Tamaño máximo de un request sin delimitador
    #[arg(long = "max-request-bytes", default_value = "8192", env = "MAX_REQUEST_BYTES")]
    pub max_request_bytes: usize,

    /// Cierra conexiones inactivas por más de estos segundos (0 = nunca)
    #[arg(long = "idle-timeout-secs", default_value = "0", env = "IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    // === Observabilidad ===

    /// Cada cuántos segundos se registran estadísticas (0 = nunca)
    #[arg(long = "stats-interval-secs", default_value = "0", env = "STATS_INTERVAL_SECS")]
    pub stats_interval_secs: u64,
}

impl Config {
    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use file_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `None` si el reaper está deshabilitado
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_secs > 0).then(|| Duration::from_secs(self.cache_sweep_secs))
    }

    /// Valida la configuración
    ///
    /// No revisa el directorio raíz; eso lo hace el servidor al arrancar.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.reactor_threads == 0 {
            return Err("Reactor threads must be >= 1".to_string());
        }
        if self.max_request_bytes < 16 {
            return Err("Max request bytes must be >= 16".to_string());
        }
        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }

        Ok(())
    }

    /// Registra un resumen de la configuración
    pub fn log_summary(&self) {
        info!(
            address = %self.address(),
            root = %self.root.display(),
            "configuración de red"
        );
        info!(
            workers = self.workers,
            reactor_threads = self.reactor_threads,
            "configuración de concurrencia"
        );
        info!(
            cache_ttl_secs = self.cache_ttl_secs,
            cache_sweep_secs = self.cache_sweep_secs,
            max_request_bytes = self.max_request_bytes,
            idle_timeout_secs = self.idle_timeout_secs,
            stats_interval_secs = self.stats_interval_secs,
            "configuración de caché y conexiones"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            port: 8080,
            host: "127.0.0.1".to_string(),
            workers: 4,
            reactor_threads: 2,
            cache_ttl_secs: 30,
            cache_sweep_secs: 0,
            max_request_bytes: 8192,
            idle_timeout_secs: 0,
            stats_interval_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.workers, 4);
        assert_eq!(config.reactor_threads, 2);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.max_request_bytes, 8192);
    }

    #[test]
    fn test_address_custom() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ..Config::default()
        };
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_workers() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("Workers"));
    }

    #[test]
    fn test_validate_invalid_reactor_threads() {
        let config = Config {
            reactor_threads: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("Reactor threads"));
    }

    #[test]
    fn test_validate_tiny_request_limit() {
        let config = Config {
            max_request_bytes: 4,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("Max request bytes"));
    }

    #[test]
    fn test_optional_intervals_disabled_by_zero() {
        let config = Config::default();
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.stats_interval(), None);
        assert_eq!(config.cache_sweep_interval(), None);

        let config = Config {
            idle_timeout_secs: 10,
            stats_interval_secs: 5,
            cache_sweep_secs: 60,
            ..Config::default()
        };
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.stats_interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.cache_sweep_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_cli_flags() {
        let config = Config::try_parse_from([
            "file_server",
            "-d",
            "/srv/www",
            "-p",
            "9000",
            "--host",
            "0.0.0.0",
            "--workers",
            "8",
            "--reactor-threads",
            "3",
            "--cache-ttl-secs",
            "5",
            "--idle-timeout-secs",
            "15",
        ])
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/www"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.workers, 8);
        assert_eq!(config.reactor_threads, 3);
        assert_eq!(config.cache_ttl_secs, 5);
        assert_eq!(config.idle_timeout_secs, 15);
    }

    #[test]
    fn test_parse_rejects_invalid_port() {
        assert!(Config::try_parse_from(["file_server", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_log_summary_does_not_panic() {
        Config::default().log_summary();
    }
}
