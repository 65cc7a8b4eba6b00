//! # Sesión de Conexión
//! src/server/session.rs
//!
//! Una sesión por conexión aceptada. Recorre el ciclo
//!
//! ```text
//! Reading ──► Parsing ──► Resolving ──► Writing ──┐
//!    ▲                                           │
//!    └───────────────────────────────────────────┘
//! ```
//!
//! y termina en `Closed` desde cualquier fase. La sesión vive dentro de una
//! sola tarea, que es su única dueña; las fases corren en secuencia, así que
//! nunca hay dos operaciones pendientes sobre el mismo socket.
//!
//! El exterior (el reaper del listener) solo ve la sesión a través de
//! `SessionActivity`: fase actual y tiempo inactivo.

use crate::cache::{CacheOutcome, ResponseCache};
use crate::http::request::{find_frame_end, DEFAULT_VERSION};
use crate::http::{ParseError, Request, Response};
use crate::metrics::MetricsCollector;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Bytes pedidos al socket en cada lectura
const READ_CHUNK: usize = 1024;

/// Errores que terminan una conexión
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),

    #[error("request exceeded {limit} bytes without a delimiter")]
    RequestTooLarge { limit: usize },

    #[error("peer closed the connection mid-request ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

/// Fase del ciclo de vida de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Reading = 0,
    Parsing = 1,
    Resolving = 2,
    Writing = 3,
    Closed = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Reading,
            1 => Phase::Parsing,
            2 => Phase::Resolving,
            3 => Phase::Writing,
            _ => Phase::Closed,
        }
    }
}

/// Estado observable de una sesión, compartido con el registro
#[derive(Debug)]
pub struct SessionActivity {
    epoch: Instant,

    /// Microsegundos desde `epoch` hasta la última lectura o escritura
    last_active_us: AtomicU64,

    phase: AtomicU8,
}

impl SessionActivity {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_active_us: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Reading as u8),
        }
    }

    /// Marca que una operación de I/O acaba de completarse
    pub fn touch(&self) {
        let now = u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.last_active_us.store(now, Ordering::Relaxed);
    }

    /// Tiempo desde la última lectura o escritura completada
    pub fn elapsed_idle(&self) -> Duration {
        let last = Duration::from_micros(self.last_active_us.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Default for SessionActivity {
    fn default() -> Self {
        Self::new()
    }
}

/// Lo que todas las sesiones comparten
pub struct SessionContext {
    pub cache: Arc<ResponseCache>,
    pub metrics: Arc<MetricsCollector>,
    pub max_request_bytes: usize,
}

pub struct ConnectionSession<S> {
    stream: S,
    buffer: Vec<u8>,
    context: Arc<SessionContext>,
    activity: Arc<SessionActivity>,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, context: Arc<SessionContext>, activity: Arc<SessionActivity>) -> Self {
        activity.touch();
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            context,
            activity,
        }
    }

    pub fn activity(&self) -> &Arc<SessionActivity> {
        &self.activity
    }

    /// Atiende requests hasta que el cliente cierra o algo falla
    ///
    /// `Ok(())` significa cierre limpio: EOF entre requests.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.serve().await;

        self.activity.set_phase(Phase::Closed);
        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "shutdown del socket falló");
        }

        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            // 1. Reading
            self.activity.set_phase(Phase::Reading);
            let frame = match self.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e @ SessionError::RequestTooLarge { .. }) => {
                    self.reject().await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            let started = Instant::now();

            // 2. Parsing
            self.activity.set_phase(Phase::Parsing);
            let request = match Request::parse(&frame) {
                Ok(request) => request,
                Err(e) => {
                    self.reject().await?;
                    return Err(e.into());
                }
            };
            trace!(method = request.method(), path = request.path(), "request");

            // 3. Resolving
            self.activity.set_phase(Phase::Resolving);
            let outcome = resolve(&self.context.cache, request.path()).await;

            // 4. Writing
            self.activity.set_phase(Phase::Writing);
            let response = Response::from_outcome(request.version(), &outcome);
            let written = self.write_response(&response).await?;

            self.context
                .metrics
                .record_request(response.status().as_u16(), started.elapsed(), written);
            debug!(
                path = request.path(),
                status = response.status().as_u16(),
                bytes = written,
                "request atendido"
            );
        }
    }

    /// Acumula lecturas hasta encontrar `\r\n\r\n`
    ///
    /// Retorna el mensaje sin el delimitador; lo que venga después en el
    /// buffer se descarta. `None` si el cliente cerró sin mandar nada.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let limit = self.context.max_request_bytes;
        let mut chunk = [0u8; READ_CHUNK];
        let mut scanned = 0;

        self.buffer.clear();

        loop {
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(SessionError::Truncated {
                        buffered: self.buffer.len(),
                    })
                };
            }

            self.activity.touch();
            self.buffer.extend_from_slice(&chunk[..read]);

            if let Some(end) = find_frame_end(&self.buffer, scanned) {
                if end > limit {
                    return Err(SessionError::RequestTooLarge { limit });
                }

                let mut frame = std::mem::take(&mut self.buffer);
                frame.truncate(end);
                return Ok(Some(frame));
            }

            if self.buffer.len() > limit {
                return Err(SessionError::RequestTooLarge { limit });
            }
            scanned = self.buffer.len();
        }
    }

    async fn write_response(&mut self, response: &Response) -> Result<usize, SessionError> {
        let bytes = response.to_bytes();

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.activity.touch();

        Ok(bytes.len())
    }

    /// 404 para un request que no se pudo entender
    async fn reject(&mut self) -> Result<(), SessionError> {
        self.activity.set_phase(Phase::Writing);
        let response = Response::not_found(DEFAULT_VERSION);
        let written = self.write_response(&response).await?;
        self.context
            .metrics
            .record_request(response.status().as_u16(), Duration::ZERO, written);
        Ok(())
    }
}

/// Pide la clave a la caché y espera a que el waiter la entregue
async fn resolve(cache: &Arc<ResponseCache>, key: &str) -> CacheOutcome {
    let (tx, rx) = oneshot::channel();

    cache.get(key, move |outcome| {
        // La sesión pudo haber sido abortada mientras esperaba
        let _ = tx.send(outcome);
    });

    rx.await.unwrap_or(CacheOutcome::NotFound)
}
