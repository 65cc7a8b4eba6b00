//! # Cola de Trabajos Cerrable
//! src/scheduler/queue.rs
//!
//! Cola thread-safe de doble extremo que consumen los workers del pool.
//!
//! - Los trabajos normales entran por el final (FIFO).
//! - Los trabajos expeditos entran delante de todos los normales pendientes,
//!   pero detrás de los expeditos que ya estaban encolados (FIFO entre ellos).
//! - `close()` despierta a todos los consumidores bloqueados; a partir de ese
//!   momento `pop()` retorna `None` aunque queden trabajos, y `push()` rechaza.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Dónde se inserta un trabajo nuevo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Al final de la cola (prioridad normal)
    Back,

    /// Delante de todos los trabajos normales (prioridad expedita)
    Front,
}

/// Estado protegido por el mutex
struct QueueState<T> {
    jobs: VecDeque<T>,

    /// Cuántos trabajos expeditos hay al frente de `jobs`
    expedited: usize,

    closed: bool,
}

/// Cola bloqueante y cerrable
pub struct JobQueue<T> {
    state: Mutex<QueueState<T>>,

    /// Notifica a los workers cuando hay trabajo o la cola se cierra
    condvar: Condvar,
}

impl<T> JobQueue<T> {
    /// Crea una cola vacía y abierta
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                expedited: 0,
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encola un trabajo y despierta a un worker
    ///
    /// Si la cola está cerrada, devuelve el trabajo intacto en `Err`.
    pub fn push(&self, job: T, position: Position) -> Result<(), T> {
        let mut state = self.lock();

        if state.closed {
            return Err(job);
        }

        match position {
            Position::Back => state.jobs.push_back(job),
            Position::Front => {
                let index = state.expedited;
                state.jobs.insert(index, job);
                state.expedited += 1;
            }
        }

        self.condvar.notify_one();
        Ok(())
    }

    /// Desencola el siguiente trabajo
    ///
    /// Bloquea hasta que haya un trabajo disponible. Retorna `None` cuando la
    /// cola se cierra.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();

        loop {
            if state.closed {
                return None;
            }

            if let Some(job) = state.jobs.pop_front() {
                state.expedited = state.expedited.saturating_sub(1);
                return Some(job);
            }

            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Cierra la cola y despierta a todos los consumidores
    ///
    /// Retorna `false` si ya estaba cerrada.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        let was_open = !state.closed;
        state.closed = true;
        self.condvar.notify_all();
        was_open
    }

    /// Retira todos los trabajos pendientes sin ejecutarlos
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        state.expedited = 0;
        state.jobs.drain(..).collect()
    }

    /// Número de trabajos esperando
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn drain_in_order(queue: &JobQueue<&'static str>) -> Vec<&'static str> {
        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.pop().unwrap());
        }
        out
    }

    #[test]
    fn test_back_is_fifo() {
        let queue = JobQueue::new();
        queue.push("a", Position::Back).unwrap();
        queue.push("b", Position::Back).unwrap();
        queue.push("c", Position::Back).unwrap();

        assert_eq!(drain_in_order(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_front_jumps_normal_jobs_but_keeps_own_order() {
        let queue = JobQueue::new();
        queue.push("n1", Position::Back).unwrap();
        queue.push("n2", Position::Back).unwrap();
        queue.push("x1", Position::Front).unwrap();
        queue.push("x2", Position::Front).unwrap();
        queue.push("n3", Position::Back).unwrap();

        assert_eq!(drain_in_order(&queue), vec!["x1", "x2", "n1", "n2", "n3"]);
    }

    #[test]
    fn test_front_after_partial_consumption() {
        let queue = JobQueue::new();
        queue.push("x1", Position::Front).unwrap();
        queue.push("n1", Position::Back).unwrap();

        assert_eq!(queue.pop(), Some("x1"));

        // x1 ya salió: el nuevo expedito va delante de n1
        queue.push("x2", Position::Front).unwrap();
        assert_eq!(drain_in_order(&queue), vec!["x2", "n1"]);
    }

    #[test]
    fn test_push_after_close_returns_job() {
        let queue = JobQueue::new();
        assert!(queue.close());
        assert!(!queue.close());

        assert_eq!(queue.push("late", Position::Back), Err("late"));
        assert_eq!(queue.push("late", Position::Front), Err("late"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_unblocks_waiting_consumers() {
        let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new());

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for consumer in consumers {
            assert_eq!(consumer.join().unwrap(), None);
        }
    }

    #[test]
    fn test_closed_queue_keeps_jobs_for_drain() {
        let queue = JobQueue::new();
        queue.push(1, Position::Back).unwrap();
        queue.push(2, Position::Front).unwrap();
        queue.close();

        // Cerrada: nadie más desencola, pero los trabajos siguen ahí
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain(), vec![2, 1]);
        assert!(queue.is_empty());
    }
}
