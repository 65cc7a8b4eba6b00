//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! 1. `listener`: escucha en un puerto y acepta conexiones
//! 2. `session`: una máquina de estados asíncrona por conexión
//! 3. `registry`: sesiones vivas, para el reaper y el apagado

pub mod listener;
pub mod registry;
pub mod session;

pub use listener::{Server, ServerStats};
pub use registry::{SessionId, SessionRegistry};
pub use session::{ConnectionSession, Phase, SessionActivity, SessionContext, SessionError};
