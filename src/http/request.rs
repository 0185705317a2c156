use bytes::{BufMut, BytesMut};
use std::fmt;
use url::Url;

use crate::http::headers::Headers;

/// HTTP request methods.
///
/// The parser accepts exactly these tokens; anything else makes the request
/// invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Loop-back test
    TRACE,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use rampart::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "CONNECT" => Some(Method::CONNECT),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request, either parsed from a client or prepared for sending.
///
/// A connection keeps one of these for its whole life and clears it between
/// requests on a keep-alive connection.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request target exactly as received (e.g. "/a?x=1")
    pub uri: String,
    /// Absolute location built from the `Host` header and the decoded path
    pub location: Option<Url>,
    /// Percent-decoded query parameters in order of appearance
    pub params: Vec<(String, String)>,
    pub v_major: u32,
    pub v_minor: u32,
    pub headers: Headers,
    /// Cookies split out of the `Cookie` header
    pub cookies: Vec<(String, String)>,
    /// Url-encoded form fields, plus single-line multipart values
    pub form_data: Vec<(String, String)>,
    /// Raw body bytes
    pub content: Vec<u8>,
    /// Expected body size
    pub content_length: usize,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    version: (u32, u32),
    headers: Headers,
    content: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            uri: None,
            version: (1, 1),
            headers: Headers::new(),
            content: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(key, value);
        self
    }

    pub fn content(mut self, content: Vec<u8>) -> Self {
        self.content = content;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let content_length = self.content.len();
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            uri: self.uri.ok_or("uri missing")?,
            v_major: self.version.0,
            v_minor: self.version.1,
            headers: self.headers,
            content: self.content,
            content_length,
            ..Request::default()
        })
    }
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the request for the next message on the same connection.
    pub fn clear(&mut self) {
        self.method = Method::GET;
        self.uri.clear();
        self.location = None;
        self.params.clear();
        self.v_major = 0;
        self.v_minor = 0;
        self.headers.clear();
        self.cookies.clear();
        self.form_data.clear();
        self.content.clear();
        self.content_length = 0;
    }

    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Path component of the URI (everything before `?`).
    pub fn path(&self) -> &str {
        match self.uri.find('?') {
            Some(idx) => &self.uri[..idx],
            None => &self.uri,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.cookies, name)
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        lookup(&self.form_data, name)
    }

    /// Determines whether the client asked to keep the connection open.
    ///
    /// Checks the Connection header. HTTP/1.1 defaults to keep-alive,
    /// HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) => v.eq_ignore_ascii_case("keep-alive") || v.eq_ignore_ascii_case("upgrade"),
            None => (self.v_major, self.v_minor) >= (1, 1),
        }
    }

    /// True for a WebSocket opening handshake.
    pub fn is_web_socket_upgrade(&self) -> bool {
        let upgrade = self
            .header("Upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self.header("Connection").is_some_and(|v| {
            v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade"))
        });
        upgrade && connection && self.header("Sec-WebSocket-Key").is_some()
    }

    /// Fills in the request line and the headers a client sends by default.
    pub fn prepare(&mut self, method: Method, uri: impl Into<String>, host: &str) {
        self.method = method;
        self.uri = uri.into();
        self.v_major = 1;
        self.v_minor = 1;
        self.headers.set("Host", host);
        if !self.headers.contains("User-Agent") {
            self.headers.set("User-Agent", concat!("rampart/", env!("CARGO_PKG_VERSION")));
        }
        if !self.headers.contains("Accept") {
            self.headers.set("Accept", "*/*");
        }
        if !self.content.is_empty() {
            self.headers.set("Content-Length", self.content.len().to_string());
        }
        self.content_length = self.content.len();
    }

    /// Serializes the request line, headers and content.
    pub fn to_buffers(&self, buf: &mut BytesMut) {
        let uri = if self.uri.is_empty() { "/" } else { &self.uri };
        let (major, minor) = match (self.v_major, self.v_minor) {
            (0, 0) => (1, 1),
            v => v,
        };
        buf.reserve(uri.len() + 32 + self.content.len());
        buf.put_slice(format!("{} {} HTTP/{}.{}\r\n", self.method, uri, major, minor).as_bytes());
        self.headers.write_to(buf);
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.content);
    }
}

fn lookup<'a>(list: &'a [(String, String)], name: &str) -> Option<&'a str> {
    list.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
