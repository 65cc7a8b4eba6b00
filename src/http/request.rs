//! # Parsing de Requests
//! src/http/request.rs
//!
//! Framing y parsing del subconjunto de HTTP/1.x que entiende el servidor.
//!
//! ## Formato de un Request
//!
//! ```text
//! GET /docs/a.txt?lang=es HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! \r\n
//! ```
//!
//! 1. **Request Line**: `METHOD /path[?query] VERSION`, tokens separados por
//!    un espacio. Tokens extra se ignoran. Una versión distinta de
//!    `HTTP/1.0` o `HTTP/1.1` se reemplaza por `HTTP/1.1`.
//! 2. **Headers**: `Name: Value`, partidos en el primer `": "`. Si un header
//!    se repite, gana el último.
//! 3. **Delimitador**: `\r\n\r\n` marca el fin del mensaje. Lo que venga
//!    después en la misma lectura se descarta.

use std::collections::HashMap;
use thiserror::Error;

/// Fin de un mensaje dentro del flujo de bytes
pub const FRAME_DELIMITER: &[u8] = b"\r\n\r\n";

/// Versión usada cuando el request no trae una reconocida
pub const DEFAULT_VERSION: &str = "HTTP/1.1";

/// Versiones que se repiten tal cual en la línea de estado
pub const SUPPORTED_VERSIONS: [&str; 2] = ["HTTP/1.0", "HTTP/1.1"];

/// Busca el delimitador en `buffer` a partir de `from`
///
/// Retorna el índice donde empieza el delimitador. `from` permite no volver a
/// escanear lo que ya se revisó en lecturas anteriores.
///
/// # Ejemplo
/// ```
/// use file_server::http::request::find_frame_end;
///
/// assert_eq!(find_frame_end(b"GET / HTTP/1.1\r\n\r\nextra", 0), Some(14));
/// assert_eq!(find_frame_end(b"GET / HTTP/1.1\r\n", 0), None);
/// ```
pub fn find_frame_end(buffer: &[u8], from: usize) -> Option<usize> {
    // Retroceder lo suficiente para no perder un delimitador partido
    let start = from.saturating_sub(FRAME_DELIMITER.len() - 1);

    buffer
        .get(start..)?
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
        .map(|offset| start + offset)
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Request vacío
    #[error("empty request")]
    EmptyRequest,

    /// El request no es texto válido
    #[error("request is not valid UTF-8")]
    InvalidEncoding,

    /// La request line no trae método
    #[error("missing method in request line")]
    MissingMethod,

    /// La request line no trae path
    #[error("missing path in request line: {0:?}")]
    MissingPath(String),
}

/// Request parseado
#[derive(Debug, Clone)]
pub struct Request {
    /// Método tal cual llegó (ej: "GET")
    method: String,

    /// Path sin query string (ej: "/docs/a.txt")
    path: String,

    /// Versión del protocolo (ej: "HTTP/1.1")
    version: String,

    headers: HashMap<String, String>,
}

impl Request {
    /// Parsea un mensaje ya enmarcado (sin el delimitador final)
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use file_server::http::Request;
    ///
    /// let raw = b"GET /hello.txt?v=2 HTTP/1.1\r\nHost: localhost";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.method(), "GET");
    /// assert_eq!(request.path(), "/hello.txt");
    /// assert_eq!(request.header("Host"), Some("localhost"));
    /// ```
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(frame).map_err(|_| ParseError::InvalidEncoding)?;

        if text.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));

        // 1. Request line
        let request_line = lines.next().unwrap_or_default();
        let (method, path, version) = Self::parse_request_line(request_line)?;

        // 2. Headers
        let headers = Self::parse_headers(lines);

        Ok(Request {
            method,
            path,
            version,
            headers,
        })
    }

    fn parse_request_line(line: &str) -> Result<(String, String, String), ParseError> {
        let mut tokens = line.split(' ');

        let method = tokens
            .next()
            .filter(|token| !token.is_empty())
            .ok_or(ParseError::MissingMethod)?;

        let target = tokens
            .next()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ParseError::MissingPath(line.to_string()))?;

        // Cualquier otro token terminaría copiado en la línea de estado
        let version = tokens
            .next()
            .filter(|token| SUPPORTED_VERSIONS.contains(token))
            .unwrap_or(DEFAULT_VERSION);

        // Quitar la query string desde el primer '?'
        let path = match target.find('?') {
            Some(query_start) => &target[..query_start],
            None => target,
        };

        Ok((method.to_string(), path.to_string(), version.to_string()))
    }

    /// Las líneas sin `": "` no son headers y se ignoran
    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            if let Some((name, value)) = line.split_once(": ") {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        headers
    }

    // === Accesores ===

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path sin query string; es la clave de la caché
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET /hello.txt HTTP/1.1").unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/hello.txt");
        assert_eq!(request.version(), "HTTP/1.1");
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_query_is_stripped_at_first_question_mark() {
        let request = Request::parse(b"GET /a.txt?x=1?y=2 HTTP/1.0").unwrap();
        assert_eq!(request.path(), "/a.txt");
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[test]
    fn test_extra_tokens_are_ignored() {
        let request = Request::parse(b"GET /a HTTP/1.1 trailing junk").unwrap();
        assert_eq!(request.path(), "/a");
        assert_eq!(request.version(), "HTTP/1.1");
    }

    #[test]
    fn test_missing_version_uses_default() {
        let request = Request::parse(b"GET /a").unwrap();
        assert_eq!(request.version(), DEFAULT_VERSION);
    }

    #[test]
    fn test_unknown_version_falls_back_to_default() {
        for raw in [&b"GET /a garbage"[..], b"GET /a HTTP/2.0", b"GET /a http/1.0"] {
            let request = Request::parse(raw).unwrap();
            assert_eq!(request.version(), DEFAULT_VERSION);
            assert_eq!(request.path(), "/a");
        }

        let request = Request::parse(b"GET /a HTTP/1.0").unwrap();
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[test]
    fn test_headers_last_duplicate_wins() {
        let raw = b"GET / HTTP/1.1\r\nX-Tag: one\r\nHost: localhost:8080\r\nX-Tag: two";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("Host"), Some("localhost:8080"));
        assert_eq!(request.header("X-Tag"), Some("two"));
    }

    #[test]
    fn test_header_split_at_first_separator() {
        let raw = b"GET / HTTP/1.1\r\nX-Time: 12: 30\r\nnot a header";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("X-Time"), Some("12: 30"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn test_missing_path_is_error() {
        assert!(matches!(
            Request::parse(b"GET"),
            Err(ParseError::MissingPath(_))
        ));
        assert!(matches!(
            Request::parse(b"GET  HTTP/1.1"),
            Err(ParseError::MissingPath(_))
        ));
    }

    #[test]
    fn test_missing_method_is_error() {
        assert_eq!(
            Request::parse(b" /a HTTP/1.1").unwrap_err(),
            ParseError::MissingMethod
        );
    }

    #[test]
    fn test_empty_and_binary_requests() {
        assert_eq!(Request::parse(b"").unwrap_err(), ParseError::EmptyRequest);
        assert_eq!(Request::parse(b"\r\n").unwrap_err(), ParseError::EmptyRequest);
        assert_eq!(
            Request::parse(b"\xff\xfe\x00garbage").unwrap_err(),
            ParseError::InvalidEncoding
        );
    }

    #[test]
    fn test_find_frame_end_across_reads() {
        let buffer = b"GET / HTTP/1.1\r\n\r\n";

        // El delimitador quedó partido entre lecturas: ya se habían escaneado 16 bytes
        assert_eq!(find_frame_end(buffer, 16), Some(14));
        assert_eq!(find_frame_end(b"abc", 0), None);
        assert_eq!(find_frame_end(b"", 10), None);
    }
}
