//! # Construcción de Respuestas
//! src/http/response.rs
//!
//! Serializa los dos resultados posibles de un request:
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! content-type: text/plain\r\n
//! content-length: 2\r\n
//! \r\n
//! hi
//! ```
//!
//! ```text
//! HTTP/1.1 404 Not Found\r\n
//! content-type: text/plain\r\n
//! \r\n
//! ```
//!
//! La versión de la status line repite la del request.

use super::request::DEFAULT_VERSION;
use super::StatusCode;
use crate::cache::CacheOutcome;
use std::sync::Arc;

/// Tipo de contenido que se anuncia para todo archivo servido
pub const CONTENT_TYPE: &str = "text/plain";

/// Respuesta lista para escribirse en el socket
#[derive(Debug, Clone)]
pub struct Response {
    version: String,
    status: StatusCode,

    /// Headers en orden de inserción
    headers: Vec<(String, String)>,

    /// Compartido con la caché, no se copia por respuesta
    body: Option<Arc<[u8]>>,
}

impl Response {
    /// Respuesta con la versión por defecto, sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Agrega un header; si ya existe, reemplaza su valor en su posición
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match self.headers.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    /// Establece el body y agrega `content-length`
    pub fn with_body(self, body: Arc<[u8]>) -> Self {
        let length = body.len().to_string();
        let mut response = self.with_header("content-length", &length);
        response.body = Some(body);
        response
    }

    /// 200 con el contenido o 404, según lo que resolvió la caché
    ///
    /// # Ejemplo
    /// ```
    /// use file_server::cache::CacheOutcome;
    /// use file_server::http::Response;
    /// use std::sync::Arc;
    ///
    /// let outcome = CacheOutcome::Found(Arc::from(&b"hi"[..]));
    /// let bytes = Response::from_outcome("HTTP/1.1", &outcome).to_bytes();
    ///
    /// assert_eq!(
    ///     bytes,
    ///     b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nhi"
    /// );
    /// ```
    pub fn from_outcome(version: &str, outcome: &CacheOutcome) -> Self {
        match outcome {
            CacheOutcome::Found(content) => Self::new(StatusCode::Ok)
                .with_version(version)
                .with_header("content-type", CONTENT_TYPE)
                .with_body(Arc::clone(content)),
            CacheOutcome::NotFound => Self::not_found(version),
        }
    }

    pub fn not_found(version: &str) -> Self {
        Self::new(StatusCode::NotFound)
            .with_version(version)
            .with_header("content-type", CONTENT_TYPE)
    }

    /// Status line, headers, línea vacía y body
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, |body| body.len());
        let mut result = Vec::with_capacity(64 + body_len);

        // 1. Status line
        result.extend_from_slice(format!("{} {}\r\n", self.version, self.status).as_bytes());

        // 2. Headers
        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        // 3. Línea vacía
        result.extend_from_slice(b"\r\n");

        // 4. Body
        if let Some(body) = &self.body {
            result.extend_from_slice(body);
        }

        result
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(bytes: &[u8]) -> CacheOutcome {
        CacheOutcome::Found(Arc::from(bytes))
    }

    #[test]
    fn test_found_serialization_is_exact() {
        let bytes = Response::from_outcome("HTTP/1.1", &found(b"hi")).to_bytes();
        assert_eq!(
            bytes,
            b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nhi".to_vec()
        );
    }

    #[test]
    fn test_not_found_has_no_length_or_body() {
        let response = Response::from_outcome("HTTP/1.1", &CacheOutcome::NotFound);

        assert_eq!(response.status(), StatusCode::NotFound);
        assert_eq!(response.header("content-length"), None);
        assert!(response.body().is_empty());
        assert_eq!(
            response.to_bytes(),
            b"HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_version_is_echoed() {
        let bytes = Response::not_found("HTTP/1.0").to_bytes();
        assert!(bytes.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn test_binary_body_and_empty_file() {
        let payload = [0u8, 159, 146, 150, 255];
        let response = Response::from_outcome("HTTP/1.1", &found(&payload));
        assert_eq!(response.header("content-length"), Some("5"));
        assert!(response.to_bytes().ends_with(&payload));

        let empty = Response::from_outcome("HTTP/1.1", &found(b""));
        assert_eq!(empty.header("content-length"), Some("0"));
        assert!(empty.to_bytes().ends_with(b"content-length: 0\r\n\r\n"));
    }

    #[test]
    fn test_with_header_replaces_in_place() {
        let response = Response::new(StatusCode::Ok)
            .with_header("content-type", "text/html")
            .with_header("x-extra", "1")
            .with_header("content-type", CONTENT_TYPE);

        let text = String::from_utf8(response.to_bytes()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\nx-extra: 1\r\n\r\n"
        );
    }
}
