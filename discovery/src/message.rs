// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The JSON wire format of the discovery protocol.
//!
//! Messages ride in single UDP datagrams of at most [`MAX_DATAGRAM`] bytes.
//! There is no framing beyond the datagram boundary and no sequencing:
//! announcements are idempotent and last-writer-wins, each stack being the
//! sole source of truth about itself.

use net::{StackId, Vni};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Upper bound on the encoded size of any discovery datagram.
pub const MAX_DATAGRAM: usize = 1024;

/// The wire format revision this implementation speaks.
pub const WIRE_VERSION: u32 = 1;

/// A discovery datagram.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub version: u32,
    pub stack_id: StackId,
    pub host_ip: Ipv4Addr,
    pub vni: Vni,
    /// Sender wall-clock seconds since the epoch.  Informational only; peer
    /// liveness is always judged by the receiver's clock.
    pub timestamp: i64,
}

/// Discovery message kinds.
///
/// `Query` is accepted and answered for compatibility with other
/// implementations but never emitted by this daemon.  Kinds introduced by
/// newer implementations decode as [`MessageKind::Unknown`] and are dropped
/// without complaint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Announce,
    Query,
    Response,
    Unknown,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Announce => "ANNOUNCE",
            MessageKind::Query => "QUERY",
            MessageKind::Response => "RESPONSE",
            MessageKind::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "ANNOUNCE" => MessageKind::Announce,
            "QUERY" => MessageKind::Query,
            "RESPONSE" => MessageKind::Response,
            _ => MessageKind::Unknown,
        })
    }
}

impl Message {
    /// Serialize for transmission, enforcing the datagram cap.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Oversize`] if the encoding exceeds
    /// [`MAX_DATAGRAM`] bytes (only possible with a pathological stack id).
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let data = serde_json::to_vec(self)?;
        if data.len() > MAX_DATAGRAM {
            return Err(WireError::Oversize(data.len()));
        }
        Ok(data)
    }

    /// Parse a received datagram.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] when the payload is not a well-formed
    /// message.  A bad neighbor's datagrams are dropped one at a time; they
    /// cannot poison the peer table.
    pub fn decode(data: &[u8]) -> Result<Message, WireError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Wire encoding and decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("encoded message is {0} bytes (cap {MAX_DATAGRAM})")]
    Oversize(usize),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample(kind: MessageKind) -> Message {
        Message {
            kind,
            version: WIRE_VERSION,
            stack_id: StackId::try_from("stack-a").unwrap(),
            host_ip: Ipv4Addr::new(192, 168, 1, 10),
            vni: Vni::new_checked(100).unwrap(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        for kind in [
            MessageKind::Announce,
            MessageKind::Query,
            MessageKind::Response,
        ] {
            let message = sample(kind);
            let decoded = Message::decode(&message.encode().unwrap()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn kinds_use_uppercase_wire_names() {
        let data = sample(MessageKind::Announce).encode().unwrap();
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains("\"type\":\"ANNOUNCE\""));
    }

    #[test]
    fn unknown_kind_still_decodes() {
        let raw = br#"{"type":"GOODBYE","version":1,"stack_id":"b","host_ip":"10.0.0.2","vni":7,"timestamp":0}"#;
        let message = Message::decode(raw).unwrap();
        assert_eq!(message.kind, MessageKind::Unknown);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(Message::decode(b"{not json").is_err());
        assert!(Message::decode(br#"{"type":"ANNOUNCE"}"#).is_err());
        // vni 0 is out of range
        let raw = br#"{"type":"ANNOUNCE","version":1,"stack_id":"b","host_ip":"10.0.0.2","vni":0,"timestamp":0}"#;
        assert!(Message::decode(raw).is_err());
    }

    #[test]
    fn every_message_fits_in_one_datagram() {
        bolero::check!().with_type().for_each(
            |(stack_id, vni, octets, timestamp): &(StackId, Vni, [u8; 4], i64)| {
                let message = Message {
                    kind: MessageKind::Announce,
                    version: WIRE_VERSION,
                    stack_id: stack_id.clone(),
                    host_ip: Ipv4Addr::from(*octets),
                    vni: *vni,
                    timestamp: *timestamp,
                };
                let data = message.encode().unwrap();
                assert!(data.len() <= MAX_DATAGRAM);
            },
        );
    }

    #[test]
    fn worst_case_stack_id_still_fits() {
        // The datagram cap is guaranteed by the StackId length bound; the
        // worst case is well under the cap.
        let stack_id = StackId::try_from("x".repeat(StackId::MAX_LEN)).unwrap();
        let message = Message {
            stack_id,
            ..sample(MessageKind::Announce)
        };
        assert!(message.encode().unwrap().len() <= MAX_DATAGRAM);
    }
}
