use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use thiserror::Error;

/// Size of the length prefix preceding every payload on the wire.
pub const FRAME_HEADER_LEN: usize = 2;
/// Largest payload a frame can carry (the length field is a u16).
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

pub const MAX_PLAYER_SPEED: f32 = 10.0;
pub const ARENA_WIDTH: f32 = 40.0;
pub const ARENA_HEIGHT: f32 = 30.0;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit")]
    PayloadTooLarge(usize),
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("frame read failed: {0}")]
    Io(#[from] io::Error),
}

/// Encodes a payload into a wire frame: u16 little-endian length, then the
/// payload bytes. Rejects oversized payloads before producing any output,
/// since a wrapped length field would corrupt the framing for the peer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decodes one frame from a byte stream, returning the payload. All or
/// nothing: a stream that ends before the announced payload arrives yields
/// `Truncated`, and no partial payload is ever exposed.
pub fn decode_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let got = read_full(reader, &mut header)?;
    if got < FRAME_HEADER_LEN {
        return Err(FrameError::Truncated {
            expected: FRAME_HEADER_LEN,
            actual: got,
        });
    }

    let length = u16::from_le_bytes(header) as usize;
    let mut payload = vec![0u8; length];
    let got = read_full(reader, &mut payload)?;
    if got < length {
        return Err(FrameError::Truncated {
            expected: length,
            actual: got,
        });
    }

    Ok(payload)
}

// Like read_exact, but reports how many bytes arrived before EOF so the
// caller can distinguish truncation from transport failure.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// World state pushed to every client each tick. The framing layer treats
/// the serialized form as an opaque payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub time: f32,
    pub entities: Vec<EntityState>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub id: u32,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
}

/// Movement intent sent by a client, one per inbound frame.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ClientInput {
    pub vel_x: f32,
    pub vel_y: f32,
}
