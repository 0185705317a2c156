use bytes::{BufMut, BytesMut};

use crate::http::headers::Headers;
use crate::http::mime;

/// Value of the `Server` header on every reply.
pub const SERVER_NAME: &str = concat!("rampart/", env!("CARGO_PKG_VERSION"));

/// HTTP status codes with a stock reply.
///
/// Both the stock reply tables and the reply parser's lookup go through
/// [`StatusCode::from_u16`], so the two always agree on the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    SwitchingProtocols,
    Ok,
    Created,
    Accepted,
    NonAuthoritative,
    NoContent,
    MultipleChoices,
    MovedPermanently,
    MovedTemporarily,
    SeeOther,
    NotModified,
    BadRequest,
    Unauthorized,
    PaymentRequired,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use rampart::http::reply::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NonAuthoritative => 203,
            StatusCode::NoContent => 204,
            StatusCode::MultipleChoices => 300,
            StatusCode::MovedPermanently => 301,
            StatusCode::MovedTemporarily => 302,
            StatusCode::SeeOther => 303,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::PaymentRequired => 402,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::BadGateway => 502,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::GatewayTimeout => 504,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            101 => StatusCode::SwitchingProtocols,
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            203 => StatusCode::NonAuthoritative,
            204 => StatusCode::NoContent,
            300 => StatusCode::MultipleChoices,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::MovedTemporarily,
            303 => StatusCode::SeeOther,
            304 => StatusCode::NotModified,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            402 => StatusCode::PaymentRequired,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            502 => StatusCode::BadGateway,
            503 => StatusCode::ServiceUnavailable,
            504 => StatusCode::GatewayTimeout,
            _ => return None,
        };
        Some(status)
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use rampart::http::reply::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NonAuthoritative => "Non-Authoritative Information",
            StatusCode::NoContent => "No Content",
            StatusCode::MultipleChoices => "Multiple Choices",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::PaymentRequired => "Payment Required",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
        }
    }

    /// Statuses that never carry a stock body.
    fn is_bodyless(&self) -> bool {
        matches!(
            self,
            StatusCode::SwitchingProtocols
                | StatusCode::Ok
                | StatusCode::NoContent
                | StatusCode::NotModified
        )
    }

    pub fn stock_html(&self) -> String {
        let (code, text) = (self.as_u16(), self.reason_phrase());
        format!(
            "<html><head><title>{text}</title></head><body><h1>{code} {text}</h1></body></html>"
        )
    }

    pub fn stock_json(&self) -> String {
        serde_json::json!({
            "error": {
                "code": self.as_u16(),
                "message": self.reason_phrase(),
            }
        })
        .to_string()
    }
}

/// Kind of content a reply carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Json,
    Xml,
    Text,
    Sbin,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Json => "application/json",
            ContentType::Xml => "application/xml",
            ContentType::Text => "text/plain",
            ContentType::Sbin => "application/octet-stream",
        }
    }

    fn header_value(&self) -> String {
        match self {
            ContentType::Sbin => self.mime().to_string(),
            _ => format!("{}; charset=utf-8", self.mime()),
        }
    }
}

/// Escapes (json) or strips (xml, text) ASCII control characters other than
/// TAB, LF and CR. Html and binary content pass through untouched.
pub fn sanitize_content(content: &[u8], content_type: ContentType) -> Vec<u8> {
    let is_control = |b: u8| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f;
    match content_type {
        ContentType::Json => {
            let mut out = Vec::with_capacity(content.len());
            for &b in content {
                if is_control(b) {
                    out.extend_from_slice(format!("\\u{:04x}", b).as_bytes());
                } else {
                    out.push(b);
                }
            }
            out
        }
        ContentType::Xml | ContentType::Text => {
            content.iter().copied().filter(|&b| !is_control(b)).collect()
        }
        ContentType::Html | ContentType::Sbin => content.to_vec(),
    }
}

/// An HTTP reply, either produced by a server handler or parsed from an
/// upstream server.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// Numeric status; parsed replies may carry codes outside [`StatusCode`]
    pub status: u16,
    pub status_text: String,
    pub v_major: u32,
    pub v_minor: u32,
    pub headers: Headers,
    pub content: Vec<u8>,
    pub content_length: usize,
    /// Whether the connection closes once this reply is written
    pub close_connection: bool,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simple 200 OK reply with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let mut reply = Reply::new();
        reply.content = body.into();
        reply.get_reply(StatusCode::Ok, Some(ContentType::Text));
        reply
    }

    /// Creates a stock reply for `status` with an HTML or JSON body.
    pub fn stock(status: StatusCode, content_type: ContentType) -> Self {
        let mut reply = Reply::new();
        reply.get_reply(status, Some(content_type));
        reply
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Resets the reply for the next exchange on the same connection.
    pub fn clear(&mut self) {
        self.status = 0;
        self.status_text.clear();
        self.v_major = 0;
        self.v_minor = 0;
        self.headers.clear();
        self.content.clear();
        self.content_length = 0;
        self.close_connection = false;
    }

    /// Sets `Content-Type` from the extension of `path`.
    pub fn content_type_from_path(&mut self, path: &str) {
        self.headers.set("Content-Type", mime::ext_to_type_for_path(path));
    }

    /// Turns the reply into a complete `status` reply.
    ///
    /// Fills the status line and the standard headers. When the content is
    /// empty and the status is an error or redirect, the stock body for the
    /// content type (JSON when `content_type` is json, HTML otherwise) is
    /// used instead.
    pub fn get_reply(&mut self, status: StatusCode, content_type: Option<ContentType>) {
        self.status = status.as_u16();
        self.status_text = status.reason_phrase().to_string();
        self.v_major = 1;
        self.v_minor = 1;

        let mut content_type = content_type;
        if self.content.is_empty() && !status.is_bodyless() {
            let json = content_type == Some(ContentType::Json);
            self.content = if json {
                status.stock_json().into_bytes()
            } else {
                status.stock_html().into_bytes()
            };
            content_type = Some(if json { ContentType::Json } else { ContentType::Html });
        }

        if let Some(ct) = content_type {
            self.content = sanitize_content(&self.content, ct);
            self.headers.set("Content-Type", ct.header_value());
        }

        self.headers.set("Server", SERVER_NAME);
        self.headers.set("Date", http_date());

        if !matches!(status, StatusCode::SwitchingProtocols | StatusCode::NoContent) {
            self.headers.set("Content-Length", self.content.len().to_string());
        }
        self.content_length = self.content.len();

        if status == StatusCode::SwitchingProtocols {
            return;
        }
        let connection = if self.close_connection { "close" } else { "keep-alive" };
        self.headers.set("Connection", connection);
    }

    /// Serializes the status line, headers and content.
    pub fn to_buffers(&self, buf: &mut BytesMut) {
        let (major, minor) = match (self.v_major, self.v_minor) {
            (0, 0) => (1, 1),
            v => v,
        };
        buf.reserve(64 + self.content.len());
        buf.put_slice(
            format!("HTTP/{}.{} {} {}\r\n", major, minor, self.status, self.status_text).as_bytes(),
        );
        self.headers.write_to(buf);
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.content);
    }
}

/// Current time in IMF-fixdate form.
pub fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
