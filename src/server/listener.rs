//! # Listener del Servidor
//! src/server/listener.rs
//!
//! Acepta conexiones y lanza una `ConnectionSession` por cada una. Además
//! corre las tareas de mantenimiento opcionales:
//!
//! - reaper de sesiones inactivas (`idle_timeout_secs`)
//! - reporte periódico de estadísticas (`stats_interval_secs`)
//! - limpieza de entradas vencidas de la caché (`cache_sweep_secs`)
//!
//! Al apagarse deja de aceptar, aborta las sesiones vivas y detiene el pool.

use super::registry::{SessionId, SessionRegistry};
use super::session::{ConnectionSession, SessionActivity, SessionContext, SessionError};
use crate::cache::{CacheStats, FsLoader, ResponseCache};
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::scheduler::{PoolStats, TaskScheduler};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Vista combinada que registra el reporter periódico
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub sessions: usize,
    pub scheduler: PoolStats,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
}

pub struct Server {
    config: Config,
    listener: TcpListener,
    scheduler: Arc<TaskScheduler>,
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsCollector>,
    registry: Arc<SessionRegistry>,
    context: Arc<SessionContext>,
}

impl Server {
    /// Valida la configuración, abre el puerto y arranca el pool
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;
        let root = check_root(&config.root).await?;

        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;

        let scheduler = Arc::new(
            TaskScheduler::start(config.workers)
                .map_err(|e| ServerError::Runtime(e.to_string()))?,
        );
        let cache = Arc::new(
            ResponseCache::new(FsLoader::new(&root), config.cache_ttl())
                .with_executor(Arc::clone(&scheduler)),
        );
        let metrics = Arc::new(MetricsCollector::new());
        let context = Arc::new(SessionContext {
            cache: Arc::clone(&cache),
            metrics: Arc::clone(&metrics),
            max_request_bytes: config.max_request_bytes,
        });

        info!(
            address = %listener.local_addr()?,
            root = %root.display(),
            workers = scheduler.size(),
            "servidor escuchando"
        );

        Ok(Self {
            config,
            listener,
            scheduler,
            cache,
            metrics,
            registry: Arc::new(SessionRegistry::new()),
            context,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn stats(&self) -> ServerStats {
        collect_stats(&self.registry, &self.scheduler, &self.cache, &self.metrics)
    }

    /// Atiende conexiones hasta recibir Ctrl+C
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Atiende conexiones hasta que `shutdown` se completa
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let maintenance = self.spawn_maintenance();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("apagando servidor");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => {
                        // Típicamente falta de descriptores: esperar un poco
                        warn!(error = %e, "error al aceptar conexión");
                        time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        for task in maintenance {
            task.abort();
        }

        let aborted = self.registry.abort_all();

        let scheduler = Arc::clone(&self.scheduler);
        tokio::task::spawn_blocking(move || scheduler.shutdown())
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!(aborted_sessions = aborted, "servidor detenido");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "no se pudo activar TCP_NODELAY");
        }

        let activity = Arc::new(SessionActivity::new());
        let id = self.registry.register(Arc::clone(&activity));
        self.metrics.connection_opened();

        let guard = SessionGuard {
            id,
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
        };
        let session = ConnectionSession::new(stream, Arc::clone(&self.context), activity);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            debug!(%peer, "conexión aceptada");

            match session.run().await {
                Ok(()) => debug!(%peer, "conexión cerrada"),
                Err(SessionError::Io(e)) => debug!(%peer, error = %e, "conexión interrumpida"),
                Err(e) => warn!(%peer, error = %e, "conexión cerrada por error"),
            }
        });

        self.registry.attach(id, handle.abort_handle());
    }

    fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if let Some(timeout) = self.config.idle_timeout() {
            let registry = Arc::clone(&self.registry);
            let period = (timeout / 2).max(Duration::from_millis(100));

            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    let reaped = registry.reap_idle(timeout);
                    if reaped > 0 {
                        info!(reaped, "sesiones inactivas cerradas");
                    }
                }
            }));
        }

        if let Some(period) = self.config.stats_interval() {
            let registry = Arc::clone(&self.registry);
            let scheduler = Arc::clone(&self.scheduler);
            let cache = Arc::clone(&self.cache);
            let metrics = Arc::clone(&self.metrics);

            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    let stats = collect_stats(&registry, &scheduler, &cache, &metrics);
                    match serde_json::to_string(&stats) {
                        Ok(json) => info!(stats = %json, "estadísticas"),
                        Err(e) => warn!(error = %e, "no se pudieron serializar las estadísticas"),
                    }
                }
            }));
        }

        if let Some(period) = self.config.cache_sweep_interval() {
            let cache = Arc::clone(&self.cache);

            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    let removed = cache.sweep();
                    debug!(removed, "limpieza de caché");
                }
            }));
        }

        tasks
    }
}

/// Saca la sesión del registro cuando su tarea termina o es abortada
struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
    metrics: Arc<MetricsCollector>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        self.metrics.connection_closed();
    }
}

fn collect_stats(
    registry: &SessionRegistry,
    scheduler: &TaskScheduler,
    cache: &ResponseCache,
    metrics: &MetricsCollector,
) -> ServerStats {
    ServerStats {
        sessions: registry.len(),
        scheduler: scheduler.stats(),
        cache: cache.stats(),
        metrics: metrics.snapshot(),
    }
}

/// La raíz debe existir y ser un directorio; se retorna canonicalizada
async fn check_root(root: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| ServerError::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| invalid(e.to_string()))?;

    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    Ok(canonical)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "no se pudo escuchar Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_root_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = check_root(dir.path()).await.unwrap();
        assert!(root.is_absolute());
    }

    #[tokio::test]
    async fn test_check_root_rejects_file_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            check_root(&file).await,
            Err(ServerError::InvalidRoot { .. })
        ));
        assert!(matches!(
            check_root(&dir.path().join("nope")).await,
            Err(ServerError::InvalidRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(matches!(
            Server::bind(config).await,
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stats_reflect_pool_size() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            port: 0,
            workers: 3,
            ..Config::default()
        };

        let server = Server::bind(config).await.unwrap();
        let stats = server.stats();
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.scheduler.workers, 3);
        assert_eq!(stats.cache.entries, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["scheduler"]["workers"], 3);

        server.run_until(async {}).await.unwrap();
    }
}
