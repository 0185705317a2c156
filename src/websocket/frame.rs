//! WebSocket frame codec.
//!
//! Wire layout:
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key (0 or 4 bytes, present iff MASK is set)       |
//! +---------------------------------------------------------------+
//! |                     Payload (XOR key[i % 4])                  |
//! +---------------------------------------------------------------+
//! ```

use bytes::{BufMut, BytesMut};

/// Largest payload announced with the 7-bit length field.
pub const MAX_LITERAL_LENGTH: usize = 125;

/// Marker values of the 7-bit length field.
pub const LENGTH_16: u8 = 126;
pub const LENGTH_64: u8 = 127;

/// Upper bound on the capacity reserved up front for a payload.
const MAX_RESERVE: usize = 64 * 1024;

/// Largest message, after fragment reassembly, accepted by default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// 7-bit length field for a payload of `len` bytes.
fn length_field(len: usize) -> u8 {
    if len <= MAX_LITERAL_LENGTH {
        len as u8
    } else if len <= 0xFFFF {
        LENGTH_16
    } else {
        LENGTH_64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// Frame header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// RSV1..RSV3 as a 3-bit value
    pub rsv: u8,
    /// Raw opcode nibble; unknown values are kept so the connection can reject them
    pub opcode: u8,
    pub mask: bool,
    /// 7-bit length field: the length itself, or 126/127
    pub length: u8,
    pub masking_key: [u8; 4],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode: OpCode::Text.as_u8(),
            mask: false,
            length: 0,
            masking_key: [0; 4],
        }
    }
}

/// XORs `data` with `key`, starting at key position `offset % 4`.
///
/// Applying it twice with the same key and offset restores the input.
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}

/// A frame plus its payload, either being received or prepared for sending.
#[derive(Debug, Clone, Default)]
pub struct WebSocket {
    frame: Frame,
    payload: Vec<u8>,
    /// Resolved payload length
    payload_length: u64,
    /// Payload bytes received so far
    size: usize,
    header_loaded: bool,
}

impl WebSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// An outgoing frame with `opcode` and FIN set.
    pub fn with_opcode(opcode: OpCode) -> Self {
        let mut ws = Self::new();
        ws.frame.opcode = opcode.as_u8();
        ws.header_loaded = true;
        ws
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.frame.opcode)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn take_payload(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.payload)
    }

    pub fn payload_length(&self) -> u64 {
        self.payload_length
    }

    /// Payload bytes received (or stored) so far.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn header_loaded(&self) -> bool {
        self.header_loaded
    }

    /// True once the header is loaded and the whole payload is present.
    pub fn is_complete(&self) -> bool {
        self.header_loaded && self.size as u64 == self.payload_length
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Sets the masking key and raises the MASK bit.
    pub fn set_masking_key(&mut self, key: [u8; 4]) {
        self.frame.masking_key = key;
        self.frame.mask = true;
    }

    pub fn set_opcode(&mut self, opcode: OpCode) {
        self.frame.opcode = opcode.as_u8();
    }

    pub fn set_fin(&mut self, fin: bool) {
        self.frame.fin = fin;
    }

    /// Stores `data` as the payload, choosing the length encoding by size.
    pub fn set_payload(&mut self, data: &[u8]) {
        self.payload.clear();
        self.append_payload(data);
    }

    /// Appends payload bytes of a continuation fragment in place.
    pub fn append_payload(&mut self, data: &[u8]) {
        self.payload.extend_from_slice(data);
        self.frame.length = length_field(self.payload.len());
        self.payload_length = self.payload.len() as u64;
        self.size = self.payload.len();
        self.header_loaded = true;
    }

    /// Reads a frame header from `stream` and as much payload as it holds.
    ///
    /// Returns the number of bytes consumed, or `None` when `stream` does not
    /// yet contain the complete header; nothing is consumed in that case.
    pub fn load_from_stream(&mut self, stream: &[u8]) -> Option<usize> {
        if stream.len() < 2 {
            return None;
        }

        let fin = stream[0] & 0x80 != 0;
        let rsv = (stream[0] >> 4) & 0x07;
        let opcode = stream[0] & 0x0F;
        let mask = stream[1] & 0x80 != 0;
        let length = stream[1] & 0x7F;

        let mut pos = 2;
        let payload_length = match length {
            LENGTH_16 => {
                let bytes = stream.get(pos..pos + 2)?;
                pos += 2;
                u16::from_be_bytes([bytes[0], bytes[1]]) as u64
            }
            LENGTH_64 => {
                let bytes = stream.get(pos..pos + 8)?;
                pos += 8;
                let mut be = [0u8; 8];
                be.copy_from_slice(bytes);
                u64::from_be_bytes(be)
            }
            n => n as u64,
        };

        let mut masking_key = [0u8; 4];
        if mask {
            masking_key.copy_from_slice(stream.get(pos..pos + 4)?);
            pos += 4;
        }

        self.frame = Frame {
            fin,
            rsv,
            opcode,
            mask,
            length,
            masking_key,
        };
        self.payload_length = payload_length;
        self.size = 0;
        self.payload.clear();
        self.payload
            .reserve(usize::try_from(payload_length).unwrap_or(MAX_RESERVE).min(MAX_RESERVE));
        self.header_loaded = true;

        Some(pos + self.payload_from_stream(&stream[pos..]))
    }

    /// Continues filling the payload of the frame in progress.
    ///
    /// Masked bytes are unmasked using the running offset, so the payload
    /// may arrive in any number of pieces. Returns the bytes consumed.
    pub fn payload_from_stream(&mut self, stream: &[u8]) -> usize {
        let need = self.payload_length.saturating_sub(self.size as u64);
        let take = usize::try_from(need).unwrap_or(usize::MAX).min(stream.len());

        let start = self.payload.len();
        self.payload.extend_from_slice(&stream[..take]);
        if self.frame.mask {
            apply_mask(&mut self.payload[start..], self.frame.masking_key, self.size);
        }
        self.size += take;
        take
    }

    /// Serializes the frame: header, extended length, masking key and the
    /// (masked, when MASK is set) payload.
    pub fn save_to_stream(&self, out: &mut BytesMut) {
        let len = self.payload.len();
        out.reserve(len + 14);

        let mut b0 = (self.frame.rsv & 0x07) << 4 | (self.frame.opcode & 0x0F);
        if self.frame.fin {
            b0 |= 0x80;
        }
        out.put_u8(b0);

        let mask_bit = if self.frame.mask { 0x80 } else { 0x00 };
        if len <= MAX_LITERAL_LENGTH {
            out.put_u8(mask_bit | len as u8);
        } else if len <= 0xFFFF {
            out.put_u8(mask_bit | LENGTH_16);
            out.put_u16(len as u16);
        } else {
            out.put_u8(mask_bit | LENGTH_64);
            out.put_u64(len as u64);
        }

        if self.frame.mask {
            out.put_slice(&self.frame.masking_key);
            let start = out.len();
            out.put_slice(&self.payload);
            apply_mask(&mut out[start..], self.frame.masking_key, 0);
        } else {
            out.put_slice(&self.payload);
        }
    }
}
