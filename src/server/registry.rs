//! # Registro de Sesiones
//! src/server/registry.rs
//!
//! Lleva la cuenta de las sesiones vivas para que el listener pueda cerrar
//! las inactivas y abortarlas todas al apagarse.

use super::session::{Phase, SessionActivity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identificador de una sesión dentro del registro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

struct Tracked {
    activity: Arc<SessionActivity>,

    /// Se adjunta después de hacer spawn de la tarea
    abort: Option<AbortHandle>,
}

#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, Tracked>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Tracked>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, activity: Arc<SessionActivity>) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(
            id,
            Tracked {
                activity,
                abort: None,
            },
        );
        id
    }

    /// Si la sesión ya terminó, no hace nada
    pub fn attach(&self, id: SessionId, abort: AbortHandle) {
        if let Some(tracked) = self.lock().get_mut(&id) {
            tracked.abort = Some(abort);
        }
    }

    pub fn remove(&self, id: SessionId) {
        self.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Aborta las sesiones que esperan un request hace más de `timeout`
    ///
    /// Solo cuenta la fase Reading: una sesión esperando la caché o
    /// escribiendo no está inactiva. Retorna cuántas se abortaron.
    pub fn reap_idle(&self, timeout: Duration) -> usize {
        let sessions = self.lock();
        let mut reaped = 0;

        for (id, tracked) in sessions.iter() {
            let idle = tracked.activity.elapsed_idle();
            if tracked.activity.phase() != Phase::Reading || idle <= timeout {
                continue;
            }

            if let Some(abort) = &tracked.abort {
                debug!(session = id.0, idle_ms = idle.as_millis() as u64, "cerrando sesión inactiva");
                abort.abort();
                reaped += 1;
            }
        }

        reaped
    }

    /// Aborta todas las sesiones; retorna cuántas había
    pub fn abort_all(&self) -> usize {
        let sessions = self.lock();

        for abort in sessions.values().filter_map(|tracked| tracked.abort.as_ref()) {
            abort.abort();
        }

        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked_task() -> tokio::task::JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let a = registry.register(Arc::new(SessionActivity::new()));
        let b = registry.register(Arc::new(SessionActivity::new()));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.remove(a);
        assert_eq!(registry.len(), 1);

        // Adjuntar a una sesión ya removida no la revive
        registry.attach(a, parked_task().abort_handle());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reap_only_idle_reading_sessions() {
        let registry = SessionRegistry::new();

        let idle = Arc::new(SessionActivity::new());
        let busy = Arc::new(SessionActivity::new());
        busy.set_phase(Phase::Resolving);
        let fresh = Arc::new(SessionActivity::new());

        let idle_task = parked_task();
        let busy_task = parked_task();
        let fresh_task = parked_task();

        for (activity, task) in [(&idle, &idle_task), (&busy, &busy_task), (&fresh, &fresh_task)] {
            let id = registry.register(Arc::clone(activity));
            registry.attach(id, task.abort_handle());
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        fresh.touch();

        assert_eq!(registry.reap_idle(Duration::from_millis(40)), 1);
        assert!(idle_task.await.unwrap_err().is_cancelled());
        assert!(!busy_task.is_finished());
        assert!(!fresh_task.is_finished());

        assert_eq!(registry.abort_all(), 3);
        assert!(busy_task.await.unwrap_err().is_cancelled());
        assert!(fresh_task.await.unwrap_err().is_cancelled());
    }
}
