//! Packet framing for client-to-server traffic.
//!
//! Every client packet starts with a 3-byte header:
//!
//! ```text
//! ┌──────────────────┬──────────┬────────────────────────┐
//! │ length: i16 (LE) │ type: u8 │ body: length - 1 bytes │
//! └──────────────────┴──────────┴────────────────────────┘
//! ```
//!
//! The declared length counts the type byte, so an empty body has length 1.
//! A header is rejected *before* any body bytes are read if the implied
//! body length is negative or above [`MAX_BODY_LEN`], or if the type code
//! isn't a known client message. That check is [`is_header_valid`], which
//! the TCP transport calls as soon as the three header bytes arrive.

use crate::ctos::CtosType;
use crate::error::ProtocolError;

/// Size of the length + type header.
pub const HEADER_LEN: usize = 3;

/// Largest body a single frame may carry, in either direction.
pub const MAX_BODY_LEN: usize = 1021;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The decoded 3-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: i16,
    pub msg_type: u8,
}

impl Header {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            length: i16::from_le_bytes([bytes[0], bytes[1]]),
            msg_type: bytes[2],
        }
    }

    /// Checks the header and returns the body length and message type.
    ///
    /// The body length is computed in `i32` so `length = 0` (body -1) and
    /// negative lengths are caught instead of wrapping.
    pub fn validate(&self) -> Result<(usize, CtosType), ProtocolError> {
        let malformed = ProtocolError::MalformedHeader {
            length: self.length,
            msg_type: self.msg_type,
        };
        let body_len = i32::from(self.length) - 1;
        let body_len = usize::try_from(body_len).map_err(|_| malformed.clone())?;
        if body_len > MAX_BODY_LEN {
            return Err(malformed);
        }
        let msg_type = CtosType::try_from(self.msg_type).map_err(|_| malformed)?;
        Ok((body_len, msg_type))
    }
}

/// Pure predicate over the three header bytes.
///
/// `true` means the body can be read safely: its length is within
/// `0..=MAX_BODY_LEN` and the type is a known client message.
pub fn is_header_valid(bytes: &[u8; HEADER_LEN]) -> bool {
    Header::parse(bytes).validate().is_ok()
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A fully framed client packet.
///
/// `msg_type` is a [`CtosType`], so a `Packet` can only exist for a known
/// client message. The body is kept as raw bytes; typed access goes through
/// [`Packet::read_fixed`] or the variable-length parsers in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub msg_type: CtosType,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(msg_type: CtosType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            body: body.into(),
        }
    }

    /// Reinterprets the body as a fixed-layout payload.
    ///
    /// Succeeds only when the body is exactly `T::SIZE` bytes. A shorter or
    /// longer body is reported as [`ProtocolError::PayloadSizeMismatch`]
    /// so the caller can reject the command without closing the connection.
    pub fn read_fixed<T: FixedPayload>(&self) -> Result<T, ProtocolError> {
        if self.body.len() != T::SIZE {
            return Err(ProtocolError::PayloadSizeMismatch {
                msg_type: self.msg_type as u8,
                expected: T::SIZE,
                actual: self.body.len(),
            });
        }
        T::decode_body(&self.body)
    }

    /// Re-encodes this packet with its header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.msg_type as u8, &self.body)
    }
}

/// A payload with a single, fixed byte size.
///
/// Implementors only see bodies whose length already equals `SIZE`; the
/// size check lives in [`Packet::read_fixed`].
pub trait FixedPayload: Sized {
    const SIZE: usize;

    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError>;
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Decodes a buffer holding exactly one framed packet.
pub fn decode(buf: &[u8]) -> Result<Packet, ProtocolError> {
    let Some((header, body)) = buf.split_first_chunk::<HEADER_LEN>() else {
        return Err(ProtocolError::FrameLengthMismatch {
            declared: HEADER_LEN,
            actual: buf.len(),
        });
    };
    let (body_len, msg_type) = Header::parse(header).validate()?;
    if body.len() != body_len {
        return Err(ProtocolError::FrameLengthMismatch {
            declared: body_len,
            actual: body.len(),
        });
    }
    Ok(Packet::new(msg_type, body))
}

/// Prepends a 3-byte header to `payload`.
///
/// Used for server-to-client packets too, which share the header layout
/// and the [`MAX_BODY_LEN`] limit.
pub fn encode(msg_type: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_BODY_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_BODY_LEN,
        });
    }
    // Fits: MAX_BODY_LEN + 1 < i16::MAX.
    let length = (payload.len() + 1) as i16;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&length.to_le_bytes());
    out.push(msg_type);
    out.extend_from_slice(payload);
    Ok(out)
}
