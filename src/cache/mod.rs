//! # Caché de Respuestas
//! src/cache/mod.rs
//!
//! Mapa clave → contenido con coalescencia de cargas por clave y frescura por
//! tiempo.
//!
//! ## Garantías
//!
//! - Mientras una clave está Pending hay a lo sumo una carga en vuelo para
//!   ella; los `get()` concurrentes se encolan como waiters.
//! - Cada waiter se invoca exactamente una vez, en orden de registro, cuando la
//!   carga termina (con contenido o con `NotFound`).
//! - El mutex solo protege búsqueda, inserción y transiciones de estado. La
//!   lectura del archivo y los callbacks corren sin el lock, así que una carga
//!   lenta nunca bloquea otras claves.
//! - Ninguna entrada se queda Pending para siempre: si la carga falla, entra
//!   en pánico o su trabajo se descarta en el apagado del pool, la entrada pasa
//!   a Missing y todos sus waiters reciben `NotFound`.
//!
//! ## Ejemplo
//!
//! ```
//! use file_server::cache::{CacheOutcome, FsLoader, ResponseCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let dir = std::env::temp_dir();
//! let cache = Arc::new(ResponseCache::new(FsLoader::new(dir), Duration::from_secs(30)));
//!
//! cache.get("/no-such-file-here.txt", |outcome| {
//!     assert_eq!(outcome, CacheOutcome::NotFound);
//! });
//! ```

pub mod entry;
pub mod loader;

pub use entry::{CacheEntry, EntryStatus};
pub use loader::{ContentLoader, FsLoader};

use crate::scheduler::TaskScheduler;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Resultado que recibe cada waiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Contenido completo del recurso
    Found(Arc<[u8]>),

    /// El recurso no existe o no se pudo leer
    NotFound,
}

impl CacheOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, CacheOutcome::Found(_))
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            CacheOutcome::Found(content) => Some(content.as_ref()),
            CacheOutcome::NotFound => None,
        }
    }
}

/// Callback que se invoca una sola vez con el resultado
pub type Waiter = Box<dyn FnOnce(CacheOutcome) + Send + 'static>;

/// Conteo de entradas por estado
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub pending: usize,
    pub valid: usize,
    pub expired: usize,
    pub missing: usize,

    /// Cargas iniciadas desde que existe la caché
    pub loads: u64,
}

/// Lo que `get()` decide hacer después de soltar el lock
enum Action {
    Deliver(Arc<[u8]>, Waiter),
    Wait,

    /// `refresh`: la clave ya estaba cargada y venció
    Load { refresh: bool },
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    loader: Arc<dyn ContentLoader>,
    ttl: Duration,

    /// Pool donde correr las cargas; sin pool se cargan en el thread llamador
    executor: Option<Arc<TaskScheduler>>,

    loads: AtomicU64,
}

impl ResponseCache {
    /// Caché que carga en el thread que llama a `get()`
    pub fn new(loader: impl ContentLoader, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            loader: Arc::new(loader),
            ttl,
            executor: None,
            loads: AtomicU64::new(0),
        }
    }

    /// Envía las cargas al pool en vez de bloquear al llamador
    pub fn with_executor(mut self, executor: Arc<TaskScheduler>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resuelve `key` e invoca `on_resolved` exactamente una vez
    ///
    /// - Valid: se invoca de inmediato, en este thread.
    /// - Pending: se agrega a los waiters y retorna.
    /// - Ausente, Expired o Missing: pasa a Pending y arranca una carga.
    pub fn get<F>(self: &Arc<Self>, key: &str, on_resolved: F)
    where
        F: FnOnce(CacheOutcome) + Send + 'static,
    {
        let waiter: Waiter = Box::new(on_resolved);

        let action = {
            let mut entries = self.lock();
            let now = Instant::now();

            match entries.get_mut(key) {
                Some(entry) => match entry.status(self.ttl, now) {
                    EntryStatus::Valid => match entry.content() {
                        Some(content) => Action::Deliver(Arc::clone(content), waiter),
                        None => {
                            entry.rearm(waiter);
                            Action::Load { refresh: false }
                        }
                    },
                    EntryStatus::Pending => {
                        entry.add_waiter(waiter);
                        Action::Wait
                    }
                    EntryStatus::Expired => {
                        entry.rearm(waiter);
                        Action::Load { refresh: true }
                    }
                    EntryStatus::Missing => {
                        entry.rearm(waiter);
                        Action::Load { refresh: false }
                    }
                },
                None => {
                    entries.insert(key.to_string(), CacheEntry::pending(now, waiter));
                    Action::Load { refresh: false }
                }
            }
        };

        match action {
            Action::Deliver(content, waiter) => {
                trace!(key, "hit en caché");
                waiter(CacheOutcome::Found(content));
            }
            Action::Wait => trace!(key, "carga en curso, esperando"),
            Action::Load { refresh } => self.start_load(key, refresh),
        }
    }

    /// Las recargas de claves vencidas van al frente de la cola del pool
    fn start_load(self: &Arc<Self>, key: &str, refresh: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(key, refresh, "cargando recurso");

        let load = PendingLoad {
            cache: Arc::clone(self),
            key: key.to_string(),
            finished: false,
        };

        match &self.executor {
            Some(executor) => {
                // Si el pool rechaza, el closure se suelta y PendingLoad
                // libera a los waiters desde su Drop
                let submitted = if refresh {
                    executor.submit_expedited(move || load.run())
                } else {
                    executor.submit(move || load.run())
                };
                if let Err(e) = submitted {
                    warn!(key, error = %e, "no se pudo encolar la carga");
                }
            }
            None => load.run(),
        }
    }

    /// Saca la entrada de Pending e invoca sus waiters fuera del lock
    fn complete(&self, key: &str, loaded: Option<Vec<u8>>) {
        let resolved = {
            let mut entries = self.lock();
            entries
                .get_mut(key)
                .map(|entry| entry.resolve(loaded, Instant::now()))
        };

        let Some((outcome, waiters)) = resolved else {
            return;
        };

        debug!(key, found = outcome.is_found(), waiters = waiters.len(), "carga resuelta");

        for waiter in waiters {
            waiter(outcome.clone());
        }
    }

    /// Estado actual de una clave, si existe
    pub fn status(&self, key: &str) -> Option<EntryStatus> {
        let now = Instant::now();
        self.lock().get(key).map(|entry| entry.status(self.ttl, now))
    }

    /// Elimina las entradas Expired y Missing
    ///
    /// Nunca toca entradas Pending (tienen waiters) ni Valid. Retorna cuántas
    /// se eliminaron.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();

        entries.retain(|_, entry| {
            matches!(
                entry.status(self.ttl, now),
                EntryStatus::Pending | EntryStatus::Valid
            )
        });

        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock();

        let mut stats = CacheStats {
            entries: entries.len(),
            loads: self.loads.load(Ordering::Relaxed),
            ..CacheStats::default()
        };

        for entry in entries.values() {
            match entry.status(self.ttl, now) {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Valid => stats.valid += 1,
                EntryStatus::Expired => stats.expired += 1,
                EntryStatus::Missing => stats.missing += 1,
            }
        }

        stats
    }
}

/// Carga en vuelo para una clave
///
/// Si se suelta sin haber terminado (trabajo descartado, pánico del loader),
/// resuelve la entrada como Missing.
struct PendingLoad {
    cache: Arc<ResponseCache>,
    key: String,
    finished: bool,
}

impl PendingLoad {
    fn run(mut self) {
        let loader = &self.cache.loader;

        let loaded = if !loader.exists(&self.key) {
            debug!(key = %self.key, "recurso inexistente");
            None
        } else {
            match loader.load(&self.key) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    debug!(key = %self.key, error = %e, "carga fallida");
                    None
                }
            }
        };

        self.finished = true;
        self.cache.complete(&self.key, loaded);
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        if !self.finished {
            warn!(key = %self.key, "carga abandonada, liberando waiters");
            self.cache.complete(&self.key, None);
        }
    }
}
