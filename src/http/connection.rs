//! Server-side connection state machine.
//!
//! The connection is sans-io: the driver hands it bytes with
//! [`ServerConnection::handle_readable`], writes whatever
//! [`ServerConnection::take_output`] returns, reports the flush with
//! [`ServerConnection::on_reply_sent`] and calls
//! [`ServerConnection::handle_timeout`] when its idle timer fires.

use bytes::{Buf, BytesMut};

use crate::http::parser::{MAX_RESERVE, ParseResult, RequestContext, RequestParser};
use crate::http::reply::{ContentType, Reply, StatusCode};
use crate::http::request::Request;
use crate::websocket::frame::{DEFAULT_MAX_MESSAGE_SIZE, MAX_LITERAL_LENGTH, OpCode, WebSocket};
use crate::websocket::handshake::accept_key;
use crate::websocket::parser::WebSocketParser;

/// Identifies a connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Initial receive buffer size for HTTP traffic.
pub const DEFAULT_RECV_BUFFER: usize = 4096;
/// Receive buffer size once a connection speaks WebSocket.
pub const WEBSOCKET_RECV_BUFFER: usize = 256 * 1024;

/// Close code sent for protocol errors.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code sent when a message exceeds the size limit.
const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

/// Where a connection is in its request/reply cycle.
///
/// Servers move `Connected → WaitRequest → RequestOk | RequestError →
/// ReplyReady → ReplySent`; clients move `RequestReady → RequestSent →
/// WaitReply → ReplyOk | ReplyError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    WaitRequest,
    RequestOk,
    RequestError,
    RequestReady,
    RequestSent,
    WaitReply,
    ReplyOk,
    ReplyError,
    ReplyReady,
    ReplySent,
    Closed,
}

/// Protocol currently spoken on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
}

/// Application callbacks for a server connection.
pub trait ServerHandler {
    /// A complete HTTP request is available in `conn.request()`.
    fn on_request(&self, conn: &mut ServerConnection);

    /// A complete WebSocket message is available in `conn.web_socket()`.
    fn on_web_socket(&self, _conn: &mut ServerConnection) {}
}

pub struct ServerConnection {
    id: ConnectionId,
    input: BytesMut,
    output: BytesMut,
    request: Request,
    context: RequestContext,
    reply: Reply,
    /// Frame being received
    ws_frame: WebSocket,
    /// Message reassembled from one or more frames
    ws_message: WebSocket,
    /// A fragmented message is waiting for its final frame
    ws_fragmented: bool,
    max_message_size: usize,
    status: ConnectionStatus,
    protocol: Protocol,
    /// Default close policy for replies
    close_connection: bool,
    /// Decision for the reply currently queued
    close_after_reply: bool,
    recv_buffer_size: usize,
}

impl ServerConnection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            input: BytesMut::with_capacity(DEFAULT_RECV_BUFFER),
            output: BytesMut::new(),
            request: Request::new(),
            context: RequestContext::new(),
            reply: Reply::new(),
            ws_frame: WebSocket::new(),
            ws_message: WebSocket::new(),
            ws_fragmented: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            status: ConnectionStatus::Connected,
            protocol: Protocol::Http,
            close_connection: true,
            close_after_reply: false,
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

    pub fn reply_mut(&mut self) -> &mut Reply {
        &mut self.reply
    }

    /// Last complete WebSocket message.
    pub fn web_socket(&self) -> &WebSocket {
        &self.ws_message
    }

    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    pub fn set_close_connection(&mut self, value: bool) {
        self.close_connection = value;
    }

    /// Longest request body accepted; longer ones get a 400. Applies from
    /// the next request parsed.
    pub fn set_max_content_length(&mut self, limit: usize) {
        self.context = RequestContext::with_max_content_length(limit);
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

    /// True when bytes are buffered that have not been parsed yet.
    pub fn has_pending_input(&self) -> bool {
        !self.input.is_empty()
    }

    /// Bytes queued for the peer.
    pub fn take_output(&mut self) -> BytesMut {
        self.output.split()
    }

    /// Marks the connection closed; nothing more is parsed or sent.
    pub fn close(&mut self) {
        self.status = ConnectionStatus::Closed;
        self.input.clear();
    }

    /// Entry point for bytes read from the socket.
    pub fn handle_readable<H: ServerHandler + ?Sized>(&mut self, data: &[u8], handler: &H) {
        if self.is_closed() {
            return;
        }
        self.input.extend_from_slice(data);
        self.parse_input(handler);
    }

    /// Parses buffered input with the parser of the active protocol.
    pub fn parse_input<H: ServerHandler + ?Sized>(&mut self, handler: &H) {
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

    fn parse_http<H: ServerHandler + ?Sized>(&mut self, handler: &H) -> bool {
        // One request in flight: wait until its reply is written.
        if matches!(
            self.status,
            ConnectionStatus::RequestOk | ConnectionStatus::ReplyReady | ConnectionStatus::RequestError
        ) {
            return false;
        }

        let (result, consumed) = RequestParser::parse(&mut self.request, &mut self.context, &self.input);
        self.input.advance(consumed);

        match result {
            ParseResult::Complete => {
                self.status = ConnectionStatus::RequestOk;
                tracing::debug!(
                    conn = self.id,
                    method = %self.request.method,
                    uri = %self.request.uri,
                    "Request received"
                );
                handler.on_request(self);
                true
            }
            ParseResult::Invalid => {
                self.status = ConnectionStatus::RequestError;
                tracing::warn!(conn = self.id, state = ?self.context.state, "Malformed request");
                self.send_stock_reply(StatusCode::BadRequest);
                self.close_after_reply = true;
                self.input.clear();
                false
            }
            ParseResult::Incomplete => {
                self.status = ConnectionStatus::WaitRequest;
                let pending = self.request.content_length.saturating_sub(self.request.content.len());
                if pending > self.input.capacity() {
                    self.input.reserve(pending.min(MAX_RESERVE));
                }
                false
            }
        }
    }

    /// Payload budget left for the next frame. Control frames may always
    /// carry their maximum.
    fn frame_budget(&self) -> usize {
        let used = if self.ws_fragmented { self.ws_message.size() } else { 0 };
        self.max_message_size.saturating_sub(used).max(MAX_LITERAL_LENGTH)
    }

    fn reject_oversized_message(&mut self) -> bool {
        tracing::warn!(conn = self.id, limit = self.max_message_size, "WebSocket message too big");
        self.ws_frame.clear();
        self.ws_message.clear();
        self.ws_fragmented = false;
        self.send_web_socket_close(CLOSE_MESSAGE_TOO_BIG);
        self.input.clear();
        false
    }

    fn parse_web_socket<H: ServerHandler + ?Sized>(&mut self, handler: &H) -> bool {
        let budget = self.frame_budget();
        let (result, consumed) = WebSocketParser::parse_with_limit(&mut self.ws_frame, &self.input, budget);
        self.input.advance(consumed);

        match result {
            ParseResult::Incomplete => {
                self.status = ConnectionStatus::WaitRequest;
                false
            }
            ParseResult::Invalid if self.ws_frame.payload_length() > budget as u64 => self.reject_oversized_message(),
            ParseResult::Invalid => {
                tracing::warn!(conn = self.id, "Malformed WebSocket frame");
                self.close_after_reply = true;
                self.send_web_socket_close(CLOSE_PROTOCOL_ERROR);
                self.input.clear();
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
                            return self.reject_oversized_message();
                        }
                        self.ws_fragmented = !frame.frame().fin;
                        if frame.frame().fin {
                            self.status = ConnectionStatus::RequestOk;
                            handler.on_web_socket(self);
                        } else {
                            self.status = ConnectionStatus::WaitRequest;
                        }
                    }
                    Some(OpCode::Close) => {
                        tracing::debug!(conn = self.id, "WebSocket close received");
                        self.close_after_reply = true;
                        let mut close = WebSocket::with_opcode(OpCode::Close);
                        close.set_payload(frame.payload().get(..2).unwrap_or_default());
                        self.queue_frame(&close);
                        self.input.clear();
                        return false;
                    }
                    Some(OpCode::Ping) => {
                        let mut pong = WebSocket::with_opcode(OpCode::Pong);
                        pong.set_payload(frame.payload());
                        self.queue_frame(&pong);
                    }
                    Some(OpCode::Pong) => {}
                    None => {
                        tracing::warn!(conn = self.id, opcode = frame.frame().opcode, "Unknown WebSocket opcode");
                        self.close_after_reply = true;
                        self.send_web_socket_close(CLOSE_PROTOCOL_ERROR);
                        self.input.clear();
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Queues the reply for `status`.
    ///
    /// The connection closes after the reply according to the configured
    /// close policy, except that a 200 reply to a request asking for
    /// `keep-alive` or `upgrade` keeps it open.
    pub fn send_reply(&mut self, status: StatusCode, content_type: Option<ContentType>) {
        self.reply.close_connection = self.close_policy(status.as_u16());
        self.reply.get_reply(status, content_type);
        self.queue_reply();
    }

    fn close_policy(&self, status: u16) -> bool {
        if status == StatusCode::Ok.as_u16() {
            let keep = self.request.header("Connection").is_some_and(|v| {
                v.eq_ignore_ascii_case("keep-alive") || v.eq_ignore_ascii_case("upgrade")
            });
            if keep {
                return false;
            }
        }
        self.close_connection
    }

    /// Queues a stock reply, JSON when the client accepts JSON.
    pub fn send_stock_reply(&mut self, status: StatusCode) {
        let json = self
            .request
            .header("Accept")
            .is_some_and(|v| v.contains("application/json"));
        self.reply.clear();
        let content_type = if json { ContentType::Json } else { ContentType::Html };
        self.send_reply(status, Some(content_type));
    }

    /// Queues a reply produced elsewhere (an upstream server) as-is, apart
    /// from the hop-by-hop headers which follow this connection's policy.
    pub fn relay_reply(&mut self, reply: Reply) {
        self.reply = reply;
        self.reply.close_connection = self.close_policy(self.reply.status);
        self.reply.headers.remove("Keep-Alive");
        self.reply.headers.remove("Transfer-Encoding");
        let connection = if self.reply.close_connection { "close" } else { "keep-alive" };
        self.reply.headers.set("Connection", connection);
        self.queue_reply();
    }

    fn queue_reply(&mut self) {
        self.close_after_reply = self.reply.close_connection;
        self.reply.to_buffers(&mut self.output);
        self.status = ConnectionStatus::ReplyReady;
        tracing::debug!(conn = self.id, status = self.reply.status, close = self.close_after_reply, "Reply queued");
    }

    /// Accepts a WebSocket handshake and switches the connection to
    /// WebSocket framing.
    ///
    /// Returns `false` (and changes nothing) when the request is not a
    /// WebSocket upgrade.
    pub fn switching_protocols(&mut self, sub_protocol: Option<&str>) -> bool {
        let Some(key) = self
            .request
            .is_web_socket_upgrade()
            .then(|| self.request.header("Sec-WebSocket-Key"))
            .flatten()
        else {
            return false;
        };
        let accept = accept_key(key);

        self.reply.clear();
        self.reply.headers.set("Upgrade", "websocket");
        self.reply.headers.set("Connection", "Upgrade");
        self.reply.headers.set("Sec-WebSocket-Accept", accept);
        if let Some(sub_protocol) = sub_protocol {
            self.reply.headers.set("Sec-WebSocket-Protocol", sub_protocol);
        }
        self.reply.close_connection = false;
        self.reply.get_reply(StatusCode::SwitchingProtocols, None);

        self.protocol = Protocol::WebSocket;
        self.close_connection = false;
        self.recv_buffer_size = WEBSOCKET_RECV_BUFFER;
        self.input.reserve(WEBSOCKET_RECV_BUFFER);
        self.queue_reply();

        tracing::info!(conn = self.id, uri = %self.request.uri, "Switched to WebSocket");
        true
    }

    fn queue_frame(&mut self, frame: &WebSocket) {
        frame.save_to_stream(&mut self.output);
        self.status = ConnectionStatus::ReplyReady;
    }

    /// Queues a WebSocket data frame.
    pub fn send_web_socket(&mut self, opcode: OpCode, payload: &[u8]) {
        let mut frame = WebSocket::with_opcode(opcode);
        frame.set_payload(payload);
        self.queue_frame(&frame);
    }

    pub fn send_web_socket_text(&mut self, text: &str) {
        self.send_web_socket(OpCode::Text, text.as_bytes());
    }

    pub fn send_web_socket_ping(&mut self) {
        self.send_web_socket(OpCode::Ping, &[]);
    }

    /// Queues a Close frame carrying `code` and closes after it is sent.
    pub fn send_web_socket_close(&mut self, code: u16) {
        self.close_after_reply = true;
        self.send_web_socket(OpCode::Close, &code.to_be_bytes());
    }

    /// Reports that everything from [`take_output`](Self::take_output) was
    /// written.
    pub fn on_reply_sent(&mut self) {
        if self.is_closed() {
            return;
        }
        self.status = ConnectionStatus::ReplySent;
        if self.close_after_reply {
            tracing::debug!(conn = self.id, "Closing after reply");
            self.close();
            return;
        }
        if self.protocol == Protocol::Http {
            self.request.clear();
            self.context.clear();
            self.reply.clear();
        }
    }

    /// Idle timer expiry.
    ///
    /// A request that was accepted but never answered gets a 504 stock reply
    /// and the connection is force-closed after it. An idle HTTP connection
    /// is closed. WebSocket connections stay open. Returns `true` when the
    /// connection is closing.
    pub fn handle_timeout(&mut self) -> bool {
        if self.protocol == Protocol::WebSocket || self.is_closed() {
            return false;
        }
        match self.status {
            ConnectionStatus::RequestOk => {
                tracing::warn!(conn = self.id, uri = %self.request.uri, "Request timed out without a reply");
                self.close_connection = true;
                self.send_stock_reply(StatusCode::GatewayTimeout);
                self.close_after_reply = true;
                true
            }
            ConnectionStatus::ReplyReady => false,
            _ => {
                self.close();
                true
            }
        }
    }
}
