//! # File Server
//! src/lib.rs
//!
//! Servidor concurrente de archivos estáticos sobre un subconjunto de
//! HTTP/1.x. Muchas conexiones simultáneas, pocos threads haciendo trabajo.
//!
//! ## Arquitectura
//!
//! - `scheduler`: pool de workers acotado con envío normal y prioritario
//! - `cache`: caché por clave que agrupa cargas concurrentes del mismo archivo
//! - `http`: framing, parsing de requests y serialización de respuestas
//! - `server`: listener, sesiones asíncronas por conexión y su registro
//! - `metrics`: contadores, latencias y conexiones activas
//! - `config`: argumentos CLI y variables de entorno
//! - `error`: errores fatales de arranque
//!
//! ```text
//! Listener ──► ConnectionSession ──► ResponseCache ──► TaskScheduler ──► FsLoader
//!                     ▲                    │
//!                     └──── waiter ◄───────┘
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use file_server::config::Config;
//! use file_server::server::Server;
//!
//! # async fn run() -> Result<(), file_server::error::ServerError> {
//! let config = Config {
//!     root: "./public".into(),
//!     ..Config::default()
//! };
//! Server::bind(config).await?.run().await
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod scheduler;
pub mod server;
