//! # Pool de Workers
//! src/scheduler/pool.rs
//!
//! Pool de threads de tamaño fijo con dos prioridades de envío y apagado
//! cooperativo.
//!
//! ## Invariantes
//!
//! - `idle_workers + trabajos_en_ejecución == workers` mientras el pool corre.
//! - Un trabajo en pánico nunca mata a su worker: el pánico se entrega al
//!   llamador como `SchedulerError::JobPanicked`.
//! - `shutdown()` deja terminar los trabajos en curso y descarta los que no
//!   empezaron; sus `JobHandle` reciben `SchedulerError::Cancelled`.

use super::queue::{JobQueue, Position};
use super::SchedulerError;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Máximo de workers por núcleo disponible
pub const THREAD_SCALE_LIMIT: usize = 5;

/// Unidad de trabajo tal como la ve un worker
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Snapshot observacional del pool
///
/// No sirve para sincronizar: puede quedar obsoleto en cuanto se lee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub idle_workers: usize,
    pub queued_jobs: usize,
}

/// Pool de workers con cola de doble extremo
pub struct TaskScheduler {
    queue: Arc<JobQueue<Job>>,
    idle: Arc<AtomicUsize>,
    size: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    /// Se pone en `true` cuando el apagado terminó de drenar la cola
    stopped: (Mutex<bool>, Condvar),
}

impl TaskScheduler {
    /// Arranca el pool con `requested` workers (acotado, ver `effective_size`)
    ///
    /// # Ejemplo
    /// ```
    /// use file_server::scheduler::TaskScheduler;
    ///
    /// let pool = TaskScheduler::start(2).unwrap();
    /// let answer = pool.submit(|| 40 + 2).unwrap().wait();
    /// assert_eq!(answer, Ok(42));
    /// pool.shutdown();
    /// ```
    pub fn start(requested: usize) -> Result<Self, SchedulerError> {
        let size = Self::effective_size(requested);
        let queue: Arc<JobQueue<Job>> = Arc::new(JobQueue::new());
        let idle = Arc::new(AtomicUsize::new(size));
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let worker_queue = Arc::clone(&queue);
            let worker_idle = Arc::clone(&idle);

            let spawned = thread::Builder::new()
                .name(format!("pool-worker-{}", index))
                .spawn(move || worker_loop(index, worker_queue, worker_idle));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Deshacer lo que ya arrancó antes de fallar
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::Spawn(e.to_string()));
                }
            }
        }

        info!(workers = size, requested, "pool de workers iniciado");

        let worker_ids = workers.iter().map(|handle| handle.thread().id()).collect();

        Ok(Self {
            queue,
            idle,
            size,
            workers: Mutex::new(workers),
            worker_ids,
            stopped: (Mutex::new(false), Condvar::new()),
        })
    }

    /// Tamaño real del pool: `clamp(max(requested, 1), 1, núcleos * THREAD_SCALE_LIMIT)`
    pub fn effective_size(requested: usize) -> usize {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        requested.max(1).min(cores * THREAD_SCALE_LIMIT)
    }

    /// Encola un trabajo al final de la cola (FIFO)
    pub fn submit<F, T>(&self, task: F) -> Result<JobHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(task, Position::Back)
    }

    /// Encola un trabajo delante de todos los trabajos normales pendientes
    ///
    /// Entre expeditos se respeta el orden de envío.
    pub fn submit_expedited<F, T>(&self, task: F) -> Result<JobHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(task, Position::Front)
    }

    fn enqueue<F, T>(&self, task: F, position: Position) -> Result<JobHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| SchedulerError::JobPanicked(panic_message(payload.as_ref())));
            // Si el llamador soltó su handle, el resultado se pierde
            let _ = tx.send(result);
        });

        // El trabajo rechazado se descarta aquí mismo junto con su sender
        self.queue
            .push(job, position)
            .map_err(|_| SchedulerError::ShutDown)?;

        Ok(JobHandle { rx })
    }

    /// Apaga el pool
    ///
    /// 1. Cierra la cola: no se aceptan más envíos y los workers dejan de
    ///    desencolar.
    /// 2. Espera a que terminen los trabajos en ejecución.
    /// 3. Descarta los trabajos que seguían en cola.
    ///
    /// Es idempotente. Si se llama desde un worker, ese worker no se espera.
    /// Con llamadas concurrentes, todas retornan después del paso 3.
    pub fn shutdown(&self) {
        if !self.queue.close() {
            self.wait_stopped();
            return;
        }

        let current = thread::current().id();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("un worker terminó con pánico");
            }
        }

        // Soltar los trabajos suelta sus senders: los handles ven Cancelled
        let discarded = self.queue.drain();
        let discarded_count = discarded.len();
        drop(discarded);

        self.idle.store(0, Ordering::SeqCst);

        let (lock, cvar) = &self.stopped;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();

        info!(discarded = discarded_count, "pool de workers detenido");
    }

    /// Espera a que otro llamador termine el apagado
    ///
    /// Un worker no espera: el apagado en curso podría estar esperándolo a él.
    fn wait_stopped(&self) {
        if self.worker_ids.contains(&thread::current().id()) {
            return;
        }

        let (lock, cvar) = &self.stopped;
        let mut stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            stopped = cvar.wait(stopped).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Workers libres y trabajos en cola
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            idle_workers: self.idle.load(Ordering::SeqCst),
            queued_jobs: self.queue.len(),
        }
    }

    /// Número de workers fijado al arrancar
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, queue: Arc<JobQueue<Job>>, idle: Arc<AtomicUsize>) {
    debug!(worker = index, "worker listo");

    while let Some(job) = queue.pop() {
        idle.fetch_sub(1, Ordering::SeqCst);
        job();

        // Durante el apagado el contador lo fija shutdown()
        if queue.is_closed() {
            break;
        }
        idle.fetch_add(1, Ordering::SeqCst);
    }

    debug!(worker = index, "worker terminado");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resultado pendiente de un trabajo enviado al pool
///
/// Se puede esperar de forma bloqueante con `wait()` (fuera del runtime
/// async) o con `.await`.
#[must_use = "si se descarta el handle, el resultado del trabajo se pierde"]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> JobHandle<T> {
    /// Bloquea el thread actual hasta tener el resultado
    ///
    /// No llamar desde dentro de un runtime de tokio; usar `.await`.
    pub fn wait(self) -> Result<T, SchedulerError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SchedulerError::Cancelled))
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::Cancelled)))
    }
}
