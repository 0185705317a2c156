//! Incremental HTTP request parser.
//!
//! [`RequestParser::parse`] feeds bytes one at a time through a character
//! state machine. All progress lives in the [`Request`] being built and the
//! [`RequestContext`], so a request split across any number of reads parses
//! to the same result as the whole buffer at once.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::http::form::{FormData, FormDataItem};
use crate::http::headers::{Header, Headers};
use crate::http::request::{Method, Request};

/// Outcome of a parse call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// The message is complete.
    Complete,
    /// The input is not valid at the current state; the connection is in error.
    Invalid,
    /// More bytes are needed; keep the context and call again.
    Incomplete,
}

const MAX_METHOD_LEN: usize = 16;

/// Largest request body accepted unless the context is configured otherwise.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Upper bound on the capacity reserved up front for a body.
pub(crate) const MAX_RESERVE: usize = 64 * 1024;

/// Request parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    MethodStart,
    Method,
    UriStart,
    Uri,
    UriParamStart,
    UriParam,
    UriParamMime,
    HttpVersionH,
    HttpVersionT1,
    HttpVersionT2,
    HttpVersionP,
    HttpVersionSlash,
    HttpVersionMajorStart,
    HttpVersionMajor,
    HttpVersionMinorStart,
    HttpVersionMinor,
    ExpectingNewline1,
    HeaderLineStart,
    HeaderLws,
    HeaderName,
    SpaceBeforeHeaderValue,
    HeaderValue,
    HeaderValueOptionsStart,
    HeaderValueOptions,
    ExpectingNewline2,
    ExpectingNewline3,
    Content,
    FormDataStart,
    FormData,
    FormMime,
}

/// Header line under construction, shared by the request and reply parsers.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderScratch {
    name: String,
    value: Vec<u8>,
    option: Vec<u8>,
    options: Vec<(String, String)>,
}

impl HeaderScratch {
    pub(crate) fn push_name(&mut self, c: u8) {
        self.name.push(c as char);
    }

    pub(crate) fn push_value(&mut self, c: u8) {
        self.value.push(c);
    }

    pub(crate) fn push_option_byte(&mut self, c: u8) {
        self.value.push(c);
        self.option.push(c);
    }

    /// Closes the option being read, if any.
    pub(crate) fn end_option(&mut self) {
        if self.option.is_empty() {
            return;
        }
        let raw = String::from_utf8_lossy(&self.option).into_owned();
        self.option.clear();
        let (k, v) = raw.split_once('=').unwrap_or((raw.as_str(), ""));
        let v = v.trim();
        let v = if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
            &v[1..v.len() - 1]
        } else {
            v
        };
        self.options.push((k.trim().to_string(), v.to_string()));
    }

    /// Moves the finished header into `headers`.
    pub(crate) fn finish(&mut self, headers: &mut Headers) {
        self.end_option();
        let value = String::from_utf8_lossy(&self.value).trim().to_string();
        headers.push(Header {
            name: std::mem::take(&mut self.name),
            value,
            options: std::mem::take(&mut self.options),
        });
        self.value.clear();
    }

    /// Reopens the last header for a folded (LWS) continuation line.
    pub(crate) fn reopen(&mut self, headers: &mut Headers) -> bool {
        match headers.pop() {
            Some(header) => {
                self.name = header.name;
                self.value = header.value.into_bytes();
                self.value.push(b' ');
                self.options = header.options;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.name.clear();
        self.value.clear();
        self.option.clear();
        self.options.clear();
    }
}

pub(crate) fn is_char(c: u8) -> bool {
    c <= 127
}

pub(crate) fn is_ctl(c: u8) -> bool {
    c <= 31 || c == 127
}

pub(crate) fn is_tspecial(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'['
            | b']' | b'?' | b'=' | b'{' | b'}' | b' ' | b'\t'
    )
}

pub(crate) fn is_token(c: u8) -> bool {
    is_char(c) && !is_ctl(c) && !is_tspecial(c)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Percent-decodes `s`, failing on a malformed escape or invalid UTF-8.
/// `+` is left alone.
pub fn decode_url(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            if hi.is_none() || lo.is_none() {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Parse cursor persisted between reads of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub state: RequestState,
    headers_only: bool,
    max_content_length: usize,
    method: String,
    mime: [u8; 2],
    mime_index: usize,
    /// Decoded bytes of the current query or form pair
    pair: Vec<u8>,
    /// Key of the current pair once a literal `=` was seen
    pair_key: Option<String>,
    header: HeaderScratch,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            state: RequestState::default(),
            headers_only: false,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            method: String::new(),
            mime: [0; 2],
            mime_index: 0,
            pair: Vec::new(),
            pair_key: None,
            header: HeaderScratch::default(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context rejecting bodies longer than `limit` bytes.
    pub fn with_max_content_length(limit: usize) -> Self {
        Self {
            max_content_length: limit,
            ..Self::default()
        }
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    /// Context for a bare header block (multipart part headers).
    ///
    /// Parsing completes at the blank line; no location, cookies or content
    /// are processed.
    pub fn headers_only() -> Self {
        Self {
            state: RequestState::HeaderLineStart,
            headers_only: true,
            ..Self::default()
        }
    }

    /// Resets the cursor for the next request.
    pub fn clear(&mut self) {
        let headers_only = self.headers_only;
        *self = Self::with_max_content_length(self.max_content_length);
        if headers_only {
            self.headers_only = true;
            self.state = RequestState::HeaderLineStart;
        }
    }

    fn flush_pair(&mut self, into: &mut Vec<(String, String)>) {
        let value = String::from_utf8_lossy(&self.pair).into_owned();
        self.pair.clear();
        match self.pair_key.take() {
            Some(key) => into.push((key, value)),
            None if !value.is_empty() => into.push((value, String::new())),
            None => {}
        }
    }

    fn split_pair(&mut self) {
        let key = String::from_utf8_lossy(&self.pair).into_owned();
        self.pair.clear();
        self.pair_key = Some(key);
    }
}

/// Incremental request parser.
pub struct RequestParser;

impl RequestParser {
    /// Consumes `input` into `request`.
    ///
    /// Returns the parse outcome and the number of bytes consumed. Bytes past
    /// a complete request are left untouched.
    pub fn parse(
        request: &mut Request,
        context: &mut RequestContext,
        input: &[u8],
    ) -> (ParseResult, usize) {
        let mut i = 0;
        while i < input.len() {
            if context.state == RequestState::Content {
                let need = request.content_length.saturating_sub(request.content.len());
                let take = need.min(input.len() - i);
                request.content.extend_from_slice(&input[i..i + take]);
                i += take;
                if request.content.len() >= request.content_length {
                    return (ParseResult::Complete, i);
                }
                continue;
            }

            let remaining = input.len() - i - 1;
            let result = Self::consume(request, context, input[i], remaining);
            i += 1;
            match result {
                ParseResult::Incomplete => {}
                result => return (result, i),
            }
        }
        (ParseResult::Incomplete, i)
    }

    /// Advances the state machine by one byte.
    ///
    /// `remaining` is the number of bytes still available after `c` in the
    /// current chunk; it is the inferred content length when the request has
    /// no `Content-Length` header.
    pub fn consume(
        request: &mut Request,
        ctx: &mut RequestContext,
        c: u8,
        remaining: usize,
    ) -> ParseResult {
        use ParseResult::{Incomplete, Invalid};
        use RequestState as S;

        match ctx.state {
            S::MethodStart => {
                if !is_token(c) {
                    return Invalid;
                }
                ctx.method.clear();
                ctx.method.push(c as char);
                ctx.state = S::Method;
                Incomplete
            }
            S::Method => {
                if c == b' ' {
                    match Method::from_str(&ctx.method) {
                        Some(method) => {
                            request.method = method;
                            ctx.state = S::UriStart;
                            Incomplete
                        }
                        None => Invalid,
                    }
                } else if !is_token(c) || ctx.method.len() >= MAX_METHOD_LEN {
                    Invalid
                } else {
                    ctx.method.push(c as char);
                    Incomplete
                }
            }
            S::UriStart => {
                if is_ctl(c) || !is_char(c) || c == b' ' {
                    return Invalid;
                }
                request.uri.push(c as char);
                ctx.state = if c == b'?' { S::UriParamStart } else { S::Uri };
                Incomplete
            }
            S::Uri => match c {
                b' ' => {
                    ctx.state = S::HttpVersionH;
                    Incomplete
                }
                b'?' => {
                    request.uri.push('?');
                    ctx.state = S::UriParamStart;
                    Incomplete
                }
                _ if is_ctl(c) || !is_char(c) => Invalid,
                _ => {
                    request.uri.push(c as char);
                    Incomplete
                }
            },
            S::UriParamStart => match c {
                b' ' => {
                    ctx.state = S::HttpVersionH;
                    Incomplete
                }
                b'&' => {
                    request.uri.push('&');
                    Incomplete
                }
                _ => {
                    ctx.state = S::UriParam;
                    Self::consume(request, ctx, c, remaining)
                }
            },
            S::UriParam => match c {
                b' ' => {
                    ctx.flush_pair(&mut request.params);
                    ctx.state = S::HttpVersionH;
                    Incomplete
                }
                b'&' => {
                    request.uri.push('&');
                    ctx.flush_pair(&mut request.params);
                    ctx.state = S::UriParamStart;
                    Incomplete
                }
                b'=' if ctx.pair_key.is_none() => {
                    request.uri.push('=');
                    ctx.split_pair();
                    Incomplete
                }
                b'%' => {
                    request.uri.push('%');
                    ctx.mime_index = 0;
                    ctx.state = S::UriParamMime;
                    Incomplete
                }
                b'+' => {
                    request.uri.push('+');
                    ctx.pair.push(b' ');
                    Incomplete
                }
                _ if is_ctl(c) || !is_char(c) => Invalid,
                _ => {
                    request.uri.push(c as char);
                    ctx.pair.push(c);
                    Incomplete
                }
            },
            S::UriParamMime => {
                if hex_value(c).is_none() {
                    return Invalid;
                }
                request.uri.push(c as char);
                ctx.mime[ctx.mime_index] = c;
                ctx.mime_index += 1;
                if ctx.mime_index == 2 {
                    ctx.pair.push(decode_mime(ctx.mime));
                    ctx.state = S::UriParam;
                }
                Incomplete
            }
            S::HttpVersionH => expect(ctx, c, b'H', S::HttpVersionT1),
            S::HttpVersionT1 => expect(ctx, c, b'T', S::HttpVersionT2),
            S::HttpVersionT2 => expect(ctx, c, b'T', S::HttpVersionP),
            S::HttpVersionP => expect(ctx, c, b'P', S::HttpVersionSlash),
            S::HttpVersionSlash => {
                if c != b'/' {
                    return Invalid;
                }
                request.v_major = 0;
                request.v_minor = 0;
                ctx.state = S::HttpVersionMajorStart;
                Incomplete
            }
            S::HttpVersionMajorStart => match digit(c) {
                Some(d) => {
                    request.v_major = d;
                    ctx.state = S::HttpVersionMajor;
                    Incomplete
                }
                None => Invalid,
            },
            S::HttpVersionMajor => match (c, digit(c)) {
                (b'.', _) => {
                    ctx.state = S::HttpVersionMinorStart;
                    Incomplete
                }
                (_, Some(d)) if request.v_major < 100 => {
                    request.v_major = request.v_major * 10 + d;
                    Incomplete
                }
                _ => Invalid,
            },
            S::HttpVersionMinorStart => match digit(c) {
                Some(d) => {
                    request.v_minor = d;
                    ctx.state = S::HttpVersionMinor;
                    Incomplete
                }
                None => Invalid,
            },
            S::HttpVersionMinor => match (c, digit(c)) {
                (b'\r', _) => {
                    ctx.state = S::ExpectingNewline1;
                    Incomplete
                }
                (_, Some(d)) if request.v_minor < 100 => {
                    request.v_minor = request.v_minor * 10 + d;
                    Incomplete
                }
                _ => Invalid,
            },
            S::ExpectingNewline1 => expect(ctx, c, b'\n', S::HeaderLineStart),
            S::HeaderLineStart => {
                if c == b'\r' {
                    ctx.state = S::ExpectingNewline3;
                    Incomplete
                } else if (c == b' ' || c == b'\t') && !request.headers.is_empty() {
                    ctx.state = S::HeaderLws;
                    Incomplete
                } else if !is_token(c) {
                    Invalid
                } else {
                    ctx.header.clear();
                    ctx.header.push_name(c);
                    ctx.state = S::HeaderName;
                    Incomplete
                }
            }
            S::HeaderLws => match c {
                b'\r' => {
                    ctx.state = S::ExpectingNewline2;
                    Incomplete
                }
                b' ' | b'\t' => Incomplete,
                _ if is_ctl(c) => Invalid,
                _ => {
                    if !ctx.header.reopen(&mut request.headers) {
                        return Invalid;
                    }
                    ctx.state = S::HeaderValue;
                    Self::consume(request, ctx, c, remaining)
                }
            },
            S::HeaderName => {
                if c == b':' {
                    ctx.state = S::SpaceBeforeHeaderValue;
                    Incomplete
                } else if !is_token(c) {
                    Invalid
                } else {
                    ctx.header.push_name(c);
                    Incomplete
                }
            }
            S::SpaceBeforeHeaderValue => match c {
                b' ' | b'\t' => Incomplete,
                _ => {
                    ctx.state = S::HeaderValue;
                    Self::consume(request, ctx, c, remaining)
                }
            },
            S::HeaderValue => match c {
                b'\r' => {
                    ctx.header.finish(&mut request.headers);
                    ctx.state = S::ExpectingNewline2;
                    Incomplete
                }
                b';' => {
                    ctx.header.push_value(c);
                    ctx.state = S::HeaderValueOptionsStart;
                    Incomplete
                }
                b'\t' => {
                    ctx.header.push_value(c);
                    Incomplete
                }
                _ if is_ctl(c) => Invalid,
                _ => {
                    ctx.header.push_value(c);
                    Incomplete
                }
            },
            S::HeaderValueOptionsStart => match c {
                b'\r' => {
                    ctx.header.finish(&mut request.headers);
                    ctx.state = S::ExpectingNewline2;
                    Incomplete
                }
                b' ' | b'\t' | b';' => {
                    ctx.header.push_value(c);
                    Incomplete
                }
                _ if is_ctl(c) => Invalid,
                _ => {
                    ctx.header.push_option_byte(c);
                    ctx.state = S::HeaderValueOptions;
                    Incomplete
                }
            },
            S::HeaderValueOptions => match c {
                b'\r' => {
                    ctx.header.finish(&mut request.headers);
                    ctx.state = S::ExpectingNewline2;
                    Incomplete
                }
                b';' => {
                    ctx.header.end_option();
                    ctx.header.push_value(c);
                    ctx.state = S::HeaderValueOptionsStart;
                    Incomplete
                }
                _ if is_ctl(c) && c != b'\t' => Invalid,
                _ => {
                    ctx.header.push_option_byte(c);
                    Incomplete
                }
            },
            S::ExpectingNewline2 => expect(ctx, c, b'\n', S::HeaderLineStart),
            S::ExpectingNewline3 => {
                if c != b'\n' {
                    return Invalid;
                }
                Self::end_of_headers(request, ctx, remaining)
            }
            S::Content => {
                request.content.push(c);
                content_done(request)
            }
            S::FormDataStart => {
                ctx.state = S::FormData;
                Self::consume(request, ctx, c, remaining)
            }
            S::FormData => {
                request.content.push(c);
                match c {
                    b'&' => ctx.flush_pair(&mut request.form_data),
                    b'=' if ctx.pair_key.is_none() => ctx.split_pair(),
                    b'+' => ctx.pair.push(b' '),
                    b'%' => {
                        ctx.mime_index = 0;
                        ctx.state = S::FormMime;
                    }
                    b'\r' | b'\n' => {}
                    _ => ctx.pair.push(c),
                }
                Self::form_done(request, ctx)
            }
            S::FormMime => {
                if hex_value(c).is_none() {
                    return Invalid;
                }
                request.content.push(c);
                ctx.mime[ctx.mime_index] = c;
                ctx.mime_index += 1;
                if ctx.mime_index == 2 {
                    ctx.pair.push(decode_mime(ctx.mime));
                    ctx.state = S::FormData;
                }
                Self::form_done(request, ctx)
            }
        }
    }

    fn form_done(request: &mut Request, ctx: &mut RequestContext) -> ParseResult {
        if request.content.len() < request.content_length {
            return ParseResult::Incomplete;
        }
        if ctx.state == RequestState::FormMime {
            return ParseResult::Invalid;
        }
        ctx.flush_pair(&mut request.form_data);
        ParseResult::Complete
    }

    fn end_of_headers(
        request: &mut Request,
        ctx: &mut RequestContext,
        remaining: usize,
    ) -> ParseResult {
        if ctx.headers_only {
            return ParseResult::Complete;
        }

        if !Self::build_location(request) {
            return ParseResult::Invalid;
        }
        Self::parse_cookies(request);

        request.content_length = remaining;
        if let Some(value) = request.headers.get("Content-Length") {
            match value.trim().parse::<usize>() {
                Ok(length) => request.content_length = length,
                Err(_) => return ParseResult::Invalid,
            }
        }

        if request.content_length > ctx.max_content_length {
            return ParseResult::Invalid;
        }
        if request.content_length == 0 {
            return ParseResult::Complete;
        }

        request.content.reserve(request.content_length.min(MAX_RESERVE));
        let url_encoded = request
            .headers
            .find("Content-Type")
            .is_some_and(|h| h.main_value().eq_ignore_ascii_case("application/x-www-form-urlencoded"));
        ctx.state = if url_encoded {
            RequestState::FormDataStart
        } else {
            RequestState::Content
        };
        ParseResult::Incomplete
    }

    /// Combines `Host` and the decoded URI path into `request.location`.
    fn build_location(request: &mut Request) -> bool {
        if request.uri == "*" {
            request.location = None;
            return true;
        }

        let Some(path) = decode_url(request.path()) else {
            return false;
        };

        let target = if path.starts_with("http://") || path.starts_with("https://") {
            path
        } else if path.starts_with('/') {
            let host = request.headers.get("Host").unwrap_or("localhost");
            format!("http://{host}{path}")
        } else {
            return false;
        };

        match Url::parse(&target) {
            Ok(url) => {
                request.location = Some(url);
                true
            }
            Err(_) => false,
        }
    }

    fn parse_cookies(request: &mut Request) {
        let cookies = request
            .headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("Cookie"))
            .flat_map(|h| h.value.split(';'))
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }
                let (k, v) = part.split_once('=').unwrap_or((part, ""));
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect::<Vec<_>>();
        request.cookies = cookies;
    }

    /// Splits a `multipart/form-data` body into `form_data`.
    ///
    /// The boundary comes from the `Content-Type` `boundary` option, or from
    /// the first line of the body when the option is missing. Part headers
    /// are parsed with a header-only [`RequestContext`]. Single-line plain
    /// field values are also appended to `request.form_data`.
    ///
    /// Returns `false` when the body is not well-formed multipart.
    pub fn parse_form_data(request: &mut Request, form_data: &mut FormData) -> bool {
        let boundary = request
            .headers
            .find("Content-Type")
            .and_then(|h| h.option("boundary"))
            .map(str::to_string)
            .or_else(|| infer_boundary(&request.content));

        let Some(boundary) = boundary else {
            return false;
        };

        let delimiter = format!("--{boundary}");
        let closing = format!("\r\n{delimiter}");
        let content = &request.content;

        let Some(mut pos) = find(content, delimiter.as_bytes(), 0) else {
            return false;
        };

        let mut mirrored = Vec::new();
        loop {
            pos += delimiter.len();
            if content[pos..].starts_with(b"--") {
                break;
            }
            if content[pos..].starts_with(b"\r\n") {
                pos += 2;
            }

            let Some(end) = find(content, closing.as_bytes(), pos) else {
                return false;
            };
            let part = &content[pos..end];

            let mut scratch = Request::new();
            let mut ctx = RequestContext::headers_only();
            let (result, consumed) = Self::parse(&mut scratch, &mut ctx, part);
            if result != ParseResult::Complete {
                return false;
            }

            let disposition = scratch.headers.find("Content-Disposition");
            let item = FormDataItem {
                name: disposition
                    .and_then(|h| h.option("name"))
                    .unwrap_or_default()
                    .to_string(),
                file: disposition
                    .and_then(|h| h.option("filename"))
                    .unwrap_or_default()
                    .to_string(),
                content_type: scratch
                    .headers
                    .find("Content-Type")
                    .map(|h| h.main_value().to_string())
                    .unwrap_or_default(),
                data: part[consumed..].to_vec(),
            };

            if !item.is_file() && !item.data.contains(&b'\n') && !item.data.contains(&b'\r') {
                if let Some(text) = item.text() {
                    mirrored.push((item.name.clone(), text.to_string()));
                }
            }
            form_data.push(item);

            pos = end + 2;
        }

        request.form_data.extend(mirrored);
        true
    }
}

fn expect(ctx: &mut RequestContext, c: u8, want: u8, next: RequestState) -> ParseResult {
    if c == want {
        ctx.state = next;
        ParseResult::Incomplete
    } else {
        ParseResult::Invalid
    }
}

fn content_done(request: &Request) -> ParseResult {
    if request.content.len() >= request.content_length {
        ParseResult::Complete
    } else {
        ParseResult::Incomplete
    }
}

pub(crate) fn digit(c: u8) -> Option<u32> {
    c.is_ascii_digit().then(|| (c - b'0') as u32)
}

fn decode_mime(mime: [u8; 2]) -> u8 {
    let hi = hex_value(mime[0]).unwrap_or(0);
    let lo = hex_value(mime[1]).unwrap_or(0);
    (hi << 4) | lo
}

fn infer_boundary(content: &[u8]) -> Option<String> {
    let end = find(content, b"\r\n", 0)?;
    let line = &content[..end];
    if line.len() > 2 && line.starts_with(b"--") {
        Some(String::from_utf8_lossy(&line[2..]).into_owned())
    } else {
        None
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let input = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut request = Request::new();
        let mut ctx = RequestContext::new();

        let (result, consumed) = RequestParser::parse(&mut request, &mut ctx, input);

        assert_eq!(result, ParseResult::Complete);
        assert_eq!(request.uri, "/");
        assert_eq!(request.header("Host"), Some("example.com"));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn decode_url_rejects_bad_escapes() {
        assert_eq!(decode_url("/a%20b").as_deref(), Some("/a b"));
        assert_eq!(decode_url("/a%2"), None);
        assert_eq!(decode_url("/a%zz"), None);
    }
}
