use crate::http::parser::ParseResult;
use crate::websocket::frame::{DEFAULT_MAX_MESSAGE_SIZE, MAX_LITERAL_LENGTH, OpCode, WebSocket};

/// Feeds stream bytes into a [`WebSocket`], reassembling a frame whose
/// payload arrives over several reads.
pub struct WebSocketParser;

impl WebSocketParser {
    /// Loads a new frame header when none is in progress, otherwise keeps
    /// filling the payload of the current one.
    ///
    /// Returns the outcome and the bytes consumed. Reserved bits, a 64-bit
    /// length with the top bit set, and oversized or fragmented control
    /// frames are `Invalid`, as is any payload longer than
    /// [`DEFAULT_MAX_MESSAGE_SIZE`].
    pub fn parse(ws: &mut WebSocket, input: &[u8]) -> (ParseResult, usize) {
        Self::parse_with_limit(ws, input, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Like [`parse`](Self::parse), rejecting frames that announce more
    /// than `max_payload` bytes.
    pub fn parse_with_limit(ws: &mut WebSocket, input: &[u8], max_payload: usize) -> (ParseResult, usize) {
        let consumed = if ws.header_loaded() {
            ws.payload_from_stream(input)
        } else {
            match ws.load_from_stream(input) {
                Some(consumed) => {
                    if !Self::valid_header(ws) || ws.payload_length() > max_payload as u64 {
                        return (ParseResult::Invalid, consumed);
                    }
                    consumed
                }
                None => return (ParseResult::Incomplete, 0),
            }
        };

        if ws.is_complete() {
            (ParseResult::Complete, consumed)
        } else {
            (ParseResult::Incomplete, consumed)
        }
    }

    fn valid_header(ws: &WebSocket) -> bool {
        let frame = ws.frame();
        if frame.rsv != 0 || ws.payload_length() >> 63 != 0 {
            return false;
        }
        match ws.opcode() {
            Some(op) if op.is_control() => {
                frame.fin && ws.payload_length() <= MAX_LITERAL_LENGTH as u64
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bits_are_invalid() {
        let mut ws = WebSocket::new();
        let (result, _) = WebSocketParser::parse(&mut ws, &[0xC1, 0x00]);
        assert_eq!(result, ParseResult::Invalid);
    }

    #[test]
    fn payload_over_limit_is_invalid() {
        let mut ws = WebSocket::new();
        let header = [0x82, 126, 0x01, 0x00];
        let (result, _) = WebSocketParser::parse_with_limit(&mut ws, &header, 255);
        assert_eq!(result, ParseResult::Invalid);

        let mut ws = WebSocket::new();
        let (result, _) = WebSocketParser::parse_with_limit(&mut ws, &header, 256);
        assert_eq!(result, ParseResult::Incomplete);
    }

    #[test]
    fn fragmented_ping_is_invalid() {
        let mut ws = WebSocket::new();
        let (result, _) = WebSocketParser::parse(&mut ws, &[OpCode::Ping.as_u8(), 0x00]);
        assert_eq!(result, ParseResult::Invalid);
    }
}
