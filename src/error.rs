//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales de arranque. Los errores de una conexión viven en
//! `server::session` y nunca tumban el servidor.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// La raíz no existe o no es un directorio
    #[error("invalid root directory {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// No se pudo construir el runtime o arrancar el pool
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
