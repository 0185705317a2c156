//! Client side: the sans-io [`ClientConnection`] and a tokio
//! [`HttpClient`] that drives one over a TCP stream.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::connection::{
    ConnectionId, ConnectionStatus, DEFAULT_RECV_BUFFER, Protocol, WEBSOCKET_RECV_BUFFER,
};
use crate::http::parser::{MAX_RESERVE, ParseResult};
use crate::http::reply::Reply;
use crate::http::reply_parser::{ReplyContext, ReplyParser};
use crate::http::request::{Method, Request};
use crate::websocket::frame::{DEFAULT_MAX_MESSAGE_SIZE, MAX_LITERAL_LENGTH, OpCode, WebSocket};
use crate::websocket::handshake::{accept_key, generate_key, generate_mask};
use crate::websocket::parser::WebSocketParser;

/// Application callbacks for a client connection.
pub trait ClientHandler {
    /// A complete reply is available in `conn.reply()`.
    fn on_reply(&self, _conn: &mut ClientConnection) {}

    /// A complete WebSocket message is available in `conn.web_socket()`.
    fn on_web_socket(&self, _conn: &mut ClientConnection) {}
}

impl ClientHandler for () {}

pub struct ClientConnection {
    id: ConnectionId,
    input: BytesMut,
    output: BytesMut,
    request: Request,
    reply: Reply,
    context: ReplyContext,
    ws_frame: WebSocket,
    ws_message: WebSocket,
    /// A fragmented message is waiting for its final frame
    ws_fragmented: bool,
    max_message_size: usize,
    status: ConnectionStatus,
    protocol: Protocol,
    /// Key sent with an upgrade request, checked against the 101 reply
    web_socket_key: Option<String>,
    recv_buffer_size: usize,
}

impl ClientConnection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            input: BytesMut::with_capacity(DEFAULT_RECV_BUFFER),
            output: BytesMut::new(),
            request: Request::new(),
            reply: Reply::new(),
            context: ReplyContext::new(),
            ws_frame: WebSocket::new(),
            ws_message: WebSocket::new(),
            ws_fragmented: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            status: ConnectionStatus::Connected,
            protocol: Protocol::Http,
            web_socket_key: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// Takes the parsed reply, leaving an empty one behind.
    pub fn take_reply(&mut self) -> Reply {
        std::mem::take(&mut self.reply)
    }

    pub fn web_socket(&self) -> &WebSocket {
        &self.ws_message
    }

    /// Longest reply body accepted; longer replies are a `ReplyError`.
    pub fn set_max_content_length(&mut self, limit: usize) {
        self.context.set_max_content_length(limit);
    }

    /// Treat a reply without `Content-Length` as running until the server
    /// closes; [`handle_eof`](Self::handle_eof) then completes it.
    pub fn set_read_to_eof(&mut self, value: bool) {
        self.context.set_read_to_eof(value);
    }

    /// Longest WebSocket message accepted, counting every fragment.
    pub fn set_max_message_size(&mut self, limit: usize) {
        self.max_message_size = limit;
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn is_closed(&self) -> bool {
        self.status == ConnectionStatus::Closed
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn take_output(&mut self) -> BytesMut {
        self.output.split()
    }

    pub fn close(&mut self) {
        self.status = ConnectionStatus::Closed;
        self.input.clear();
    }

    /// Resets request and reply so the connection can carry another exchange.
    pub fn clear(&mut self) {
        self.request.clear();
        self.reply.clear();
        self.context.clear();
        self.web_socket_key = None;
        self.status = ConnectionStatus::Connected;
    }

    /// Turns the request into a WebSocket opening handshake.
    pub fn prepare_web_socket(&mut self, uri: &str, host: &str) -> Result<(), ring::error::Unspecified> {
        let key = generate_key()?;
        self.request.prepare(Method::GET, uri, host);
        self.request.headers.set("Upgrade", "websocket");
        self.request.headers.set("Connection", "Upgrade");
        self.request.headers.set("Sec-WebSocket-Key", key.as_str());
        self.request.headers.set("Sec-WebSocket-Version", "13");
        self.web_socket_key = Some(key);
        Ok(())
    }

    /// Serializes the prepared request into the output buffer.
    pub fn send_request(&mut self) {
        self.request.to_buffers(&mut self.output);
        self.status = ConnectionStatus::RequestReady;
        tracing::debug!(conn = self.id, method = %self.request.method, uri = %self.request.uri, "Request queued");
    }

    /// Reports that the request was written; the connection now awaits the reply.
    pub fn on_request_sent(&mut self) {
        self.status = ConnectionStatus::RequestSent;
    }

    pub fn handle_readable<H: ClientHandler + ?Sized>(&mut self, data: &[u8], handler: &H) {
        if self.is_closed() {
            return;
        }
        self.input.extend_from_slice(data);
        self.parse_input(handler);
    }

    /// The server closed the stream.
    ///
    /// A reply whose body runs to end of stream completes here; a reply cut
    /// short becomes a `ReplyError`. The connection is closed either way.
    pub fn handle_eof<H: ClientHandler + ?Sized>(&mut self, handler: &H) {
        if self.protocol == Protocol::Http
            && matches!(self.status, ConnectionStatus::RequestSent | ConnectionStatus::WaitReply)
        {
            match ReplyParser::finish_on_eof(&mut self.reply, &mut self.context) {
                ParseResult::Complete => {
                    self.status = ConnectionStatus::ReplyOk;
                    tracing::debug!(conn = self.id, status = self.reply.status, "Reply received at end of stream");
                    handler.on_reply(self);
                    if self.status == ConnectionStatus::ReplyOk {
                        return;
                    }
                }
                _ => {
                    tracing::warn!(conn = self.id, "Connection closed mid-reply");
                    self.status = ConnectionStatus::ReplyError;
                    return;
                }
            }
        }
        self.close();
    }

    pub fn parse_input<H: ClientHandler + ?Sized>(&mut self, handler: &H) {
        loop {
            if self.is_closed() || self.input.is_empty() {
                return;
            }
            let more = match self.protocol {
                Protocol::Http => self.parse_http(handler),
                Protocol::WebSocket => self.parse_web_socket(handler),
            };
            if !more {
                return;
            }
        }
    }

    fn parse_http<H: ClientHandler + ?Sized>(&mut self, handler: &H) -> bool {
        if !matches!(
            self.status,
            ConnectionStatus::RequestReady | ConnectionStatus::RequestSent | ConnectionStatus::WaitReply
        ) {
            return false;
        }

        let (result, consumed) = ReplyParser::parse(&mut self.reply, &mut self.context, &self.input);
        self.input.advance(consumed);

        match result {
            ParseResult::Complete => {
                if self.reply.status == 101 && !self.accept_upgrade() {
                    self.status = ConnectionStatus::ReplyError;
                    return false;
                }
                self.status = ConnectionStatus::ReplyOk;
                tracing::debug!(conn = self.id, status = self.reply.status, "Reply received");
                handler.on_reply(self);
                true
            }
            ParseResult::Invalid => {
                tracing::warn!(conn = self.id, state = ?self.context.state, "Malformed reply");
                self.status = ConnectionStatus::ReplyError;
                self.input.clear();
                false
            }
            ParseResult::Incomplete => {
                self.status = ConnectionStatus::WaitReply;
                let pending = self.reply.content_length.saturating_sub(self.reply.content.len());
                if pending > self.input.capacity() {
                    self.input.reserve(pending.min(MAX_RESERVE));
                }
                false
            }
        }
    }

    fn accept_upgrade(&mut self) -> bool {
        let Some(key) = self.web_socket_key.as_deref() else {
            tracing::warn!(conn = self.id, "Unsolicited 101 reply");
            return false;
        };
        if self.reply.header("Sec-WebSocket-Accept") != Some(accept_key(key).as_str()) {
            tracing::warn!(conn = self.id, "Sec-WebSocket-Accept mismatch");
            return false;
        }
        self.protocol = Protocol::WebSocket;
        self.recv_buffer_size = WEBSOCKET_RECV_BUFFER;
        self.input.reserve(WEBSOCKET_RECV_BUFFER);
        tracing::info!(conn = self.id, uri = %self.request.uri, "Switched to WebSocket");
        true
    }

    fn parse_web_socket<H: ClientHandler + ?Sized>(&mut self, handler: &H) -> bool {
        let used = if self.ws_fragmented { self.ws_message.size() } else { 0 };
        let budget = self.max_message_size.saturating_sub(used).max(MAX_LITERAL_LENGTH);
        let (result, consumed) = WebSocketParser::parse_with_limit(&mut self.ws_frame, &self.input, budget);
        self.input.advance(consumed);

        match result {
            ParseResult::Incomplete => false,
            ParseResult::Invalid => {
                tracing::warn!(conn = self.id, length = self.ws_frame.payload_length(), "Malformed or oversized WebSocket frame");
                self.close();
                false
            }
            ParseResult::Complete => {
                let mut frame = std::mem::take(&mut self.ws_frame);
                match frame.opcode() {
                    Some(op @ (OpCode::Continuation | OpCode::Text | OpCode::Binary)) => {
                        if op != OpCode::Continuation {
                            self.ws_message.clear();
                            self.ws_message.set_opcode(op);
                        }
                        self.ws_message.append_payload(&frame.take_payload());
                        if self.ws_message.size() > self.max_message_size {
                            tracing::warn!(conn = self.id, limit = self.max_message_size, "WebSocket message too big");
                            self.close();
                            return false;
                        }
                        self.ws_fragmented = !frame.frame().fin;
                        if frame.frame().fin {
                            self.status = ConnectionStatus::ReplyOk;
                            handler.on_web_socket(self);
                        }
                        true
                    }
                    Some(OpCode::Ping) => {
                        if self.send_web_socket(OpCode::Pong, frame.payload()).is_err() {
                            self.close();
                            return false;
                        }
                        true
                    }
                    Some(OpCode::Pong) => true,
                    Some(OpCode::Close) | None => {
                        tracing::debug!(conn = self.id, opcode = frame.frame().opcode, "WebSocket closed by peer");
                        self.close();
                        false
                    }
                }
            }
        }
    }

    /// Queues a masked WebSocket frame.
    pub fn send_web_socket(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), ring::error::Unspecified> {
        let mut frame = WebSocket::with_opcode(opcode);
        frame.set_payload(payload);
        frame.set_masking_key(generate_mask()?);
        frame.save_to_stream(&mut self.output);
        self.status = ConnectionStatus::RequestReady;
        Ok(())
    }
}

/// Executes single requests over fresh TCP connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }
}

impl HttpClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Sends `request` to `addr` (`host:port`) and returns the reply.
    ///
    /// Timeouts surface as [`tokio::time::error::Elapsed`] in the error chain.
    pub async fn execute(&self, addr: &str, request: Request) -> Result<Reply> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {addr}"))?;

        tracing::trace!(addr, "Connected");

        timeout(self.request_timeout, Self::exchange(&mut stream, request))
            .await
            .context("Request timeout")?
    }

    async fn exchange(stream: &mut TcpStream, request: Request) -> Result<Reply> {
        let mut conn = ClientConnection::new(0);
        conn.set_read_to_eof(true);
        *conn.request_mut() = request;
        conn.send_request();

        let out = conn.take_output();
        stream.write_all(&out).await?;
        stream.flush().await?;
        conn.on_request_sent();

        let mut buffer = BytesMut::with_capacity(conn.recv_buffer_size());
        loop {
            buffer.clear();
            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                conn.handle_eof(&());
                if conn.status() == ConnectionStatus::ReplyOk {
                    return Ok(conn.take_reply());
                }
                anyhow::bail!("Connection closed before complete reply received");
            }
            conn.handle_readable(&buffer[..n], &());

            match conn.status() {
                ConnectionStatus::ReplyOk => return Ok(conn.take_reply()),
                ConnectionStatus::ReplyError => anyhow::bail!("Malformed reply from {}", conn.request().uri),
                _ => {}
            }
        }
    }
}
