//! # Módulo HTTP
//!
//! Subconjunto mínimo de HTTP/1.x que habla el servidor de archivos:
//!
//! - Framing por `\r\n\r\n` (un mensaje por ciclo de lectura)
//! - Parsing de la request line y headers
//! - Serialización de las respuestas 200 y 404
//!
//! No hay chunked transfer encoding ni cuerpos en los requests.

pub mod request;
pub mod response;
pub mod status;

pub use request::{ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
