//! # Planificador de Tareas
//! src/scheduler/mod.rs
//!
//! Pool de workers de tamaño fijo que ejecuta trabajo bloqueante (lecturas de
//! archivos) fuera de los threads del reactor.
//!
//! ```text
//! submit()            ──► [ n1 n2 n3 ] ──► worker 1
//! submit_expedited()  ──► [ x1 | n1 ... ] ──► worker 2
//!                                        ──► worker N
//! ```
//!
//! No sabe nada de HTTP: solo recibe closures y devuelve sus resultados.

pub mod pool;
pub mod queue;

pub use pool::{JobHandle, PoolStats, TaskScheduler, THREAD_SCALE_LIMIT};
pub use queue::{JobQueue, Position};

use thiserror::Error;

/// Errores del planificador
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// El pool ya no acepta trabajos
    #[error("scheduler is shut down")]
    ShutDown,

    /// El trabajo se descartó sin ejecutarse durante el shutdown
    #[error("job was cancelled before it started")]
    Cancelled,

    /// El trabajo entró en pánico; el worker sigue vivo
    #[error("job panicked: {0}")]
    JobPanicked(String),

    /// No se pudo crear un thread worker
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
