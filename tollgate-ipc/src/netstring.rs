//! Length-prefixed binary framing: `<decimal-length>:<bytes>,`.
//!
//! A frame's value may itself be a sequence of frames, which is how the
//! signed command envelope builds structured messages without a schema.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {reason}")]
    Malformed { reason: &'static str },
}

fn malformed(reason: &'static str) -> FrameError {
    FrameError::Malformed { reason }
}

pub fn encode(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 8);
    out.extend_from_slice(value.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(value);
    out.push(b',');
    out
}

/// If `buf` begins with a frame, returns its value and the remainder of
/// `buf` after the frame.
pub fn decode(buf: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    let colon = buf
        .iter()
        .position(|&b| b == b':')
        .ok_or(malformed("no length separator"))?;
    let digits = &buf[..colon];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed("length is not numeric"));
    }
    let length: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(malformed("length out of range"))?;
    let rest = &buf[colon + 1..];
    if rest.len() <= length {
        return Err(malformed("buffer shorter than frame"));
    }
    if rest[length] != b',' {
        return Err(malformed("frame not terminated with comma"));
    }
    Ok((&rest[..length], &rest[length + 1..]))
}

/// True iff `buf` is exactly one complete frame. The reactor uses this as
/// its request-completeness predicate, so no out-of-band length header is
/// needed.
pub fn is_complete(buf: &[u8]) -> bool {
    matches!(decode(buf), Ok((_, rest)) if rest.is_empty())
}
