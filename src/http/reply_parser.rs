//! Incremental HTTP reply parser.
//!
//! Mirrors [`RequestParser`](crate::http::parser::RequestParser) for the
//! status line `HTTP/<major>.<minor> <code> <text>`. There is no form
//! handling on this side.

use crate::http::parser::{
    DEFAULT_MAX_CONTENT_LENGTH, HeaderScratch, MAX_RESERVE, ParseResult, digit, is_ctl, is_token,
};
use crate::http::reply::Reply;

/// Reply parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    HttpVersionH,
    HttpVersionT1,
    HttpVersionT2,
    HttpVersionP,
    HttpVersionSlash,
    HttpVersionMajorStart,
    HttpVersionMajor,
    HttpVersionMinorStart,
    HttpVersionMinor,
    StatusCodeStart,
    StatusCode,
    StatusTextStart,
    StatusText,
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
}

/// Parse cursor persisted between reads of one reply.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub state: ReplyState,
    status_digits: usize,
    status_text: Vec<u8>,
    header: HeaderScratch,
    max_content_length: usize,
    /// A reply without `Content-Length` runs until the peer closes
    read_to_eof: bool,
    /// The body being read is delimited by end of stream
    until_eof: bool,
}

impl Default for ReplyContext {
    fn default() -> Self {
        Self {
            state: ReplyState::default(),
            status_digits: 0,
            status_text: Vec::new(),
            header: HeaderScratch::default(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            read_to_eof: false,
            until_eof: false,
        }
    }
}

impl ReplyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest body accepted; longer replies are `Invalid`.
    pub fn set_max_content_length(&mut self, limit: usize) {
        self.max_content_length = limit;
    }

    /// When set, a reply without `Content-Length` takes everything up to end
    /// of stream as its body, completed by [`ReplyParser::finish_on_eof`].
    /// Otherwise its length is the bytes left in the current read.
    pub fn set_read_to_eof(&mut self, value: bool) {
        self.read_to_eof = value;
    }

    /// True while reading a body that only end of stream terminates.
    pub fn until_eof(&self) -> bool {
        self.until_eof
    }

    /// Resets the cursor for the next reply, keeping the settings.
    pub fn clear(&mut self) {
        *self = Self {
            max_content_length: self.max_content_length,
            read_to_eof: self.read_to_eof,
            ..Self::default()
        };
    }
}

/// Incremental reply parser.
pub struct ReplyParser;

impl ReplyParser {
    /// Consumes `input` into `reply`, returning the outcome and the number
    /// of bytes consumed.
    pub fn parse(reply: &mut Reply, context: &mut ReplyContext, input: &[u8]) -> (ParseResult, usize) {
        let mut i = 0;
        while i < input.len() {
            if context.state == ReplyState::Content && context.until_eof {
                let rest = &input[i..];
                if reply.content.len() + rest.len() > context.max_content_length {
                    return (ParseResult::Invalid, i);
                }
                reply.content.extend_from_slice(rest);
                return (ParseResult::Incomplete, input.len());
            }
            if context.state == ReplyState::Content {
                let need = reply.content_length.saturating_sub(reply.content.len());
                let take = need.min(input.len() - i);
                reply.content.extend_from_slice(&input[i..i + take]);
                i += take;
                if reply.content.len() >= reply.content_length {
                    return (ParseResult::Complete, i);
                }
                continue;
            }

            let remaining = input.len() - i - 1;
            let result = Self::consume(reply, context, input[i], remaining);
            i += 1;
            match result {
                ParseResult::Incomplete => {}
                result => return (result, i),
            }
        }
        (ParseResult::Incomplete, i)
    }

    /// Advances the state machine by one byte.
    pub fn consume(reply: &mut Reply, ctx: &mut ReplyContext, c: u8, remaining: usize) -> ParseResult {
        use ParseResult::{Incomplete, Invalid};
        use ReplyState as S;

        let expect = |ctx: &mut ReplyContext, want: u8, next: ReplyState| {
            if c == want {
                ctx.state = next;
                Incomplete
            } else {
                Invalid
            }
        };

        match ctx.state {
            S::HttpVersionH => expect(ctx, b'H', S::HttpVersionT1),
            S::HttpVersionT1 => expect(ctx, b'T', S::HttpVersionT2),
            S::HttpVersionT2 => expect(ctx, b'T', S::HttpVersionP),
            S::HttpVersionP => expect(ctx, b'P', S::HttpVersionSlash),
            S::HttpVersionSlash => {
                reply.v_major = 0;
                reply.v_minor = 0;
                expect(ctx, b'/', S::HttpVersionMajorStart)
            }
            S::HttpVersionMajorStart => match digit(c) {
                Some(d) => {
                    reply.v_major = d;
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
                (_, Some(d)) if reply.v_major < 100 => {
                    reply.v_major = reply.v_major * 10 + d;
                    Incomplete
                }
                _ => Invalid,
            },
            S::HttpVersionMinorStart => match digit(c) {
                Some(d) => {
                    reply.v_minor = d;
                    ctx.state = S::HttpVersionMinor;
                    Incomplete
                }
                None => Invalid,
            },
            S::HttpVersionMinor => match (c, digit(c)) {
                (b' ', _) => {
                    ctx.state = S::StatusCodeStart;
                    Incomplete
                }
                (_, Some(d)) if reply.v_minor < 100 => {
                    reply.v_minor = reply.v_minor * 10 + d;
                    Incomplete
                }
                _ => Invalid,
            },
            S::StatusCodeStart => match digit(c) {
                Some(d) => {
                    reply.status = d as u16;
                    ctx.status_digits = 1;
                    ctx.state = S::StatusCode;
                    Incomplete
                }
                None => Invalid,
            },
            S::StatusCode => match (c, digit(c)) {
                (b' ', _) if ctx.status_digits == 3 => {
                    ctx.state = S::StatusTextStart;
                    Incomplete
                }
                (b'\r', _) if ctx.status_digits == 3 => {
                    ctx.state = S::ExpectingNewline1;
                    Incomplete
                }
                (_, Some(d)) if ctx.status_digits < 3 => {
                    reply.status = reply.status * 10 + d as u16;
                    ctx.status_digits += 1;
                    Incomplete
                }
                _ => Invalid,
            },
            S::StatusTextStart | S::StatusText => match c {
                b'\r' => {
                    reply.status_text = String::from_utf8_lossy(&ctx.status_text).trim().to_string();
                    ctx.state = S::ExpectingNewline1;
                    Incomplete
                }
                _ if is_ctl(c) && c != b'\t' => Invalid,
                _ => {
                    ctx.status_text.push(c);
                    ctx.state = S::StatusText;
                    Incomplete
                }
            },
            S::ExpectingNewline1 => expect(ctx, b'\n', S::HeaderLineStart),
            S::HeaderLineStart => {
                if c == b'\r' {
                    ctx.state = S::ExpectingNewline3;
                    Incomplete
                } else if (c == b' ' || c == b'\t') && !reply.headers.is_empty() {
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
                    if !ctx.header.reopen(&mut reply.headers) {
                        return Invalid;
                    }
                    ctx.state = S::HeaderValue;
                    Self::consume(reply, ctx, c, remaining)
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
                    Self::consume(reply, ctx, c, remaining)
                }
            },
            S::HeaderValue => match c {
                b'\r' => {
                    ctx.header.finish(&mut reply.headers);
                    ctx.state = S::ExpectingNewline2;
                    Incomplete
                }
                b';' => {
                    ctx.header.push_value(c);
                    ctx.state = S::HeaderValueOptionsStart;
                    Incomplete
                }
                _ if is_ctl(c) && c != b'\t' => Invalid,
                _ => {
                    ctx.header.push_value(c);
                    Incomplete
                }
            },
            S::HeaderValueOptionsStart => match c {
                b'\r' => {
                    ctx.header.finish(&mut reply.headers);
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
                    ctx.header.finish(&mut reply.headers);
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
            S::ExpectingNewline2 => expect(ctx, b'\n', S::HeaderLineStart),
            S::ExpectingNewline3 => {
                if c != b'\n' {
                    return Invalid;
                }
                Self::end_of_headers(reply, ctx, remaining)
            }
            S::Content => {
                reply.content.push(c);
                if ctx.until_eof {
                    return if reply.content.len() > ctx.max_content_length { Invalid } else { Incomplete };
                }
                if reply.content.len() >= reply.content_length {
                    ParseResult::Complete
                } else {
                    Incomplete
                }
            }
        }
    }

    fn end_of_headers(reply: &mut Reply, ctx: &mut ReplyContext, remaining: usize) -> ParseResult {
        // 1xx, 204 and 304 never carry a body; whatever follows belongs to
        // the next protocol or message.
        if matches!(reply.status, 100..=199 | 204 | 304) {
            reply.content_length = 0;
            return ParseResult::Complete;
        }

        match reply.headers.get("Content-Length") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(length) => reply.content_length = length,
                Err(_) => return ParseResult::Invalid,
            },
            None if ctx.read_to_eof => {
                reply.content_length = 0;
                ctx.until_eof = true;
                ctx.state = ReplyState::Content;
                return ParseResult::Incomplete;
            }
            None => reply.content_length = remaining,
        }

        if reply.content_length > ctx.max_content_length {
            return ParseResult::Invalid;
        }
        if reply.content_length == 0 {
            return ParseResult::Complete;
        }

        reply.content.reserve(reply.content_length.min(MAX_RESERVE));
        ctx.state = ReplyState::Content;
        ParseResult::Incomplete
    }

    /// The peer closed the stream. Completes a body delimited by end of
    /// stream; any other reply still in progress was cut short.
    pub fn finish_on_eof(reply: &mut Reply, ctx: &mut ReplyContext) -> ParseResult {
        if ctx.state == ReplyState::Content && ctx.until_eof {
            ctx.until_eof = false;
            reply.content_length = reply.content.len();
            ParseResult::Complete
        } else {
            ParseResult::Invalid
        }
    }
}
