//! The signed command envelope carried between the session authority and
//! the access daemon.
//!
//! Wire form: one outer frame whose value is a framed base64 HMAC-SHA256
//! signature immediately followed by three body frames (action, raw-hex
//! MAC, timestamp). Only the body is signed, keeping the signature
//! independent of transport framing. The embedded timestamp bounds replay
//! instead of a nonce store; the residual risk is the replay window.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tollgate_core::{InvalidAddressFormat, MacAddress};

use crate::netstring::{self, FrameError};

type HmacSha256 = Hmac<Sha256>;

/// UTC, second precision, no timezone suffix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_REPLAY_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Grant,
    Revoke,
}

impl Action {
    pub fn as_wire(&self) -> &'static [u8] {
        match self {
            Action::Grant => b"grant",
            Action::Revoke => b"revoke",
        }
    }

    fn from_wire(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"grant" => Some(Action::Grant),
            b"revoke" => Some(Action::Revoke),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Grant => f.write_str("grant"),
            Action::Revoke => f.write_str("revoke"),
        }
    }
}

/// A validated command: what to do, to which MAC, stamped when it was
/// signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub mac: MacAddress,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("signature is not valid base64")]
    BadSignatureEncoding,
    #[error("signature mismatch")]
    BadSignature,
    #[error("invalid action")]
    InvalidAction,
    #[error(transparent)]
    InvalidAddressFormat(#[from] InvalidAddressFormat),
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("timestamp outside replay window")]
    ReplayWindowExceeded,
}

/// Builds an envelope stamped with the current time.
pub fn build(key: &[u8], action: Action, mac: MacAddress) -> Vec<u8> {
    build_at(key, action, mac, Utc::now().naive_utc())
}

pub fn build_at(key: &[u8], action: Action, mac: MacAddress, timestamp: NaiveDateTime) -> Vec<u8> {
    let mut body = netstring::encode(action.as_wire());
    body.extend_from_slice(&netstring::encode(mac.raw_hex().as_bytes()));
    body.extend_from_slice(&netstring::encode(
        timestamp.format(TIMESTAMP_FORMAT).to_string().as_bytes(),
    ));
    let mut signer = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    signer.update(&body);
    let signature = STANDARD.encode(signer.finalize().into_bytes());
    let mut message = netstring::encode(signature.as_bytes());
    message.extend_from_slice(&body);
    netstring::encode(&message)
}

/// Validates an envelope against the current time.
pub fn validate(key: &[u8], message: &[u8], window_secs: i64) -> Result<Command, ProtocolError> {
    validate_at(key, message, window_secs, Utc::now().naive_utc())
}

/// Validation proceeds in order, each step a hard rejection: framing,
/// signature encoding, signature, action, MAC, timestamp format, replay
/// window. The window is inclusive: a skew of exactly `window_secs` is
/// accepted.
pub fn validate_at(
    key: &[u8],
    message: &[u8],
    window_secs: i64,
    now: NaiveDateTime,
) -> Result<Command, ProtocolError> {
    let (outer, rest) = netstring::decode(message)?;
    if !rest.is_empty() {
        return Err(FrameError::Malformed {
            reason: "trailing bytes after message",
        }
        .into());
    }
    let (signature_b64, body) = netstring::decode(outer)?;
    let signature = STANDARD
        .decode(signature_b64)
        .map_err(|_| ProtocolError::BadSignatureEncoding)?;
    let mut verifier = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    verifier.update(body);
    verifier
        .verify_slice(&signature)
        .map_err(|_| ProtocolError::BadSignature)?;

    let (action_bytes, after_action) = netstring::decode(body)?;
    let (mac_bytes, after_mac) = netstring::decode(after_action)?;
    let (timestamp_bytes, trailing) = netstring::decode(after_mac)?;
    if !trailing.is_empty() {
        return Err(FrameError::Malformed {
            reason: "trailing bytes after timestamp",
        }
        .into());
    }

    let action = Action::from_wire(action_bytes).ok_or(ProtocolError::InvalidAction)?;
    let mac: MacAddress = std::str::from_utf8(mac_bytes)
        .map_err(|_| InvalidAddressFormat::new(String::from_utf8_lossy(mac_bytes)))?
        .parse()?;
    let timestamp = std::str::from_utf8(timestamp_bytes)
        .ok()
        .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
        .ok_or(ProtocolError::InvalidTimestamp)?;
    let skew = (now - timestamp).num_seconds();
    if skew.abs() > window_secs {
        return Err(ProtocolError::ReplayWindowExceeded);
    }
    Ok(Command {
        action,
        mac,
        timestamp,
    })
}

/// Framed `OK` response.
pub fn ok_response() -> Vec<u8> {
    netstring::encode(b"OK")
}

/// Framed `ERROR <reason>` response.
pub fn error_response(reason: &str) -> Vec<u8> {
    netstring::encode(format!("ERROR {reason}").as_bytes())
}

/// Client-side view of a framed response: Ok for `OK`, the error text
/// otherwise.
pub fn decode_response(buf: &[u8]) -> Result<Result<(), String>, FrameError> {
    let (value, _) = netstring::decode(buf)?;
    if value == b"OK" {
        Ok(Ok(()))
    } else {
        Ok(Err(String::from_utf8_lossy(value).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn mac1() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 6)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    #[test]
    fn valid_envelope_round_trips() {
        let message = build_at(KEY, Action::Grant, mac1(), now());
        let command = validate_at(KEY, &message, 60, now()).unwrap();
        assert_eq!(command.action, Action::Grant);
        assert_eq!(command.mac, mac1());
        assert_eq!(command.timestamp, now());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let message = build_at(KEY, Action::Revoke, mac1(), now());
        let err = validate_at(b"another key entirely", &message, 60, now()).unwrap_err();
        assert_eq!(err, ProtocolError::BadSignature);
    }

    #[test]
    fn any_flipped_body_byte_is_rejected() {
        let message = build_at(KEY, Action::Grant, mac1(), now());
        // The body follows the signature frame inside the outer frame;
        // flip each byte of the signed region in turn.
        let (outer, _) = netstring::decode(&message).unwrap();
        let (_, body) = netstring::decode(outer).unwrap();
        let body_offset = message.len() - 1 - body.len();
        for i in body_offset..message.len() - 1 {
            let mut tampered = message.clone();
            tampered[i] ^= 0x01;
            assert!(
                validate_at(KEY, &tampered, 60, now()).is_err(),
                "flipping byte {i} was not detected"
            );
        }
    }

    #[test]
    fn garbage_signature_encoding_is_rejected() {
        let body = [
            netstring::encode(b"grant"),
            netstring::encode(mac1().raw_hex().as_bytes()),
            netstring::encode(now().format(TIMESTAMP_FORMAT).to_string().as_bytes()),
        ]
        .concat();
        let mut inner = netstring::encode(b"!!! not base64 !!!");
        inner.extend_from_slice(&body);
        let message = netstring::encode(&inner);
        let err = validate_at(KEY, &message, 60, now()).unwrap_err();
        assert_eq!(err, ProtocolError::BadSignatureEncoding);
    }

    fn build_with_body(body: &[u8]) -> Vec<u8> {
        let mut signer = HmacSha256::new_from_slice(KEY).unwrap();
        signer.update(body);
        let signature = STANDARD.encode(signer.finalize().into_bytes());
        let mut inner = netstring::encode(signature.as_bytes());
        inner.extend_from_slice(body);
        netstring::encode(&inner)
    }

    #[test]
    fn unknown_action_is_rejected() {
        let body = [
            netstring::encode(b"allow"),
            netstring::encode(mac1().raw_hex().as_bytes()),
            netstring::encode(now().format(TIMESTAMP_FORMAT).to_string().as_bytes()),
        ]
        .concat();
        let err = validate_at(KEY, &build_with_body(&body), 60, now()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidAction);
    }

    #[test]
    fn malformed_mac_is_rejected() {
        let body = [
            netstring::encode(b"grant"),
            netstring::encode(b"nonsense"),
            netstring::encode(now().format(TIMESTAMP_FORMAT).to_string().as_bytes()),
        ]
        .concat();
        let err = validate_at(KEY, &build_with_body(&body), 60, now()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidAddressFormat(_)));
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let body = [
            netstring::encode(b"grant"),
            netstring::encode(mac1().raw_hex().as_bytes()),
            netstring::encode(b"2026-08-06 15:30:00"),
        ]
        .concat();
        let err = validate_at(KEY, &build_with_body(&body), 60, now()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidTimestamp);
    }

    #[test]
    fn trailing_body_bytes_are_rejected() {
        let mut body = [
            netstring::encode(b"grant"),
            netstring::encode(mac1().raw_hex().as_bytes()),
            netstring::encode(now().format(TIMESTAMP_FORMAT).to_string().as_bytes()),
        ]
        .concat();
        body.extend_from_slice(&netstring::encode(b"extra"));
        let err = validate_at(KEY, &build_with_body(&body), 60, now()).unwrap_err();
        assert!(matches!(err, ProtocolError::Frame(_)));
    }

    #[test]
    fn replay_window_is_inclusive_at_the_boundary() {
        for (skew, accepted) in [(59, true), (60, true), (61, false)] {
            for direction in [-1, 1] {
                let stamp = now() + Duration::seconds(direction * skew);
                let message = build_at(KEY, Action::Grant, mac1(), stamp);
                let result = validate_at(KEY, &message, 60, now());
                assert_eq!(
                    result.is_ok(),
                    accepted,
                    "skew {} should be accepted={}",
                    direction * skew,
                    accepted
                );
                if !accepted {
                    assert_eq!(result.unwrap_err(), ProtocolError::ReplayWindowExceeded);
                }
            }
        }
    }

    #[test]
    fn responses_round_trip() {
        assert_eq!(decode_response(&ok_response()).unwrap(), Ok(()));
        assert_eq!(
            decode_response(&error_response("time out of sync")).unwrap(),
            Err("ERROR time out of sync".to_string())
        );
        assert!(decode_response(b"not a frame").is_err());
    }
}
