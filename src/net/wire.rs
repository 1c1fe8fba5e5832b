//! Packed `(opcode, payload)` bodies carried inside a [`super::frame::FramedStream`].
//!
//! `BODY` is a self-describing msgpack encoding of a small, closed
//! opcode space: `JOIN`, `JOIN_OK`, `NEW_PEER` (the join protocol) and
//! `DATA` (application traffic). The router owns this opcode space;
//! nothing above it ever sees a raw opcode.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, ResultWrappedExt};
use crate::net::{PeerId, PeerRecord};

/// The small system/application opcode space preceding every payload
/// on the routing plane.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Opcode {
    Join,
    JoinOk,
    NewPeer,
    Data,
}

/// Payload of a `JOIN` frame: the joiner's own accept address.
#[derive(Clone, Serialize, Deserialize)]
pub struct JoinPayload {
    pub accept_host: String,
    pub accept_port: u16,
}

/// Payload of a `JOIN_OK` frame: the entry's current peer table, the
/// id it minted for the joiner, and the entry's own id.
#[derive(Clone, Serialize, Deserialize)]
pub struct JoinOkPayload {
    pub peers: Vec<PeerRecord>,
    pub assigned_id: PeerId,
    pub entry_id: PeerId,
}

/// Payload of a `NEW_PEER` frame.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewPeerPayload {
    pub id: PeerId,
    pub observed_host: String,
    pub observed_port: u16,
    pub advertised_host: String,
    pub advertised_port: u16,
}

/// Payload of a `DATA` frame: the sender's origin id and an opaque
/// application byte string.
#[derive(Clone, Serialize, Deserialize)]
pub struct DataPayload {
    pub origin: PeerId,
    pub bytes: Vec<u8>,
}

/// The decoded form of any frame body on the routing plane.
pub enum ControlFrame {
    Join(JoinPayload),
    JoinOk(JoinOkPayload),
    NewPeer(NewPeerPayload),
    Data(DataPayload),
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    opcode: Opcode,
    payload: Vec<u8>,
}

fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(payload).wrapped(ErrorKind::Protocol)
}

fn decode_payload<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).wrapped(ErrorKind::Protocol)
}

impl ControlFrame {
    /// Encodes this frame into the bytes that should be handed to
    /// `FramedStream::send`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let raw = match self {
            ControlFrame::Join(p) => RawFrame {
                opcode: Opcode::Join,
                payload: encode_payload(p)?,
            },
            ControlFrame::JoinOk(p) => RawFrame {
                opcode: Opcode::JoinOk,
                payload: encode_payload(p)?,
            },
            ControlFrame::NewPeer(p) => RawFrame {
                opcode: Opcode::NewPeer,
                payload: encode_payload(p)?,
            },
            ControlFrame::Data(p) => RawFrame {
                opcode: Opcode::Data,
                payload: encode_payload(p)?,
            },
        };
        encode_payload(&raw)
    }

    /// Decodes a `FramedStream::recv` result back into a
    /// `ControlFrame`. Unknown opcodes are represented by
    /// `rmp_serde`'s own deserialize failure, since `Opcode` is a
    /// closed enum; the router treats that the same as any other
    /// `ProtocolError` and drops the frame with a warning.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawFrame = decode_payload(bytes)?;
        Ok(match raw.opcode {
            Opcode::Join => ControlFrame::Join(decode_payload(&raw.payload)?),
            Opcode::JoinOk => ControlFrame::JoinOk(decode_payload(&raw.payload)?),
            Opcode::NewPeer => ControlFrame::NewPeer(decode_payload(&raw.payload)?),
            Opcode::Data => ControlFrame::Data(decode_payload(&raw.payload)?),
        })
    }
}

/// The application-level envelope the node façade places inside every
/// `DATA` frame's opaque bytes: an event name and its serialized
/// payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl EventEnvelope {
    pub fn encode(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        encode_payload(&EventEnvelope {
            name: name.to_owned(),
            bytes: bytes.to_owned(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_payload(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_round_trips() {
        let encoded = EventEnvelope::encode("ping", b"hello").unwrap();
        let decoded = EventEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded.name, "ping");
        assert_eq!(decoded.bytes, b"hello");
    }

    #[test]
    fn data_frame_round_trips() {
        let origin = PeerId::new();
        let frame = ControlFrame::Data(DataPayload {
            origin,
            bytes: b"x".to_vec(),
        });
        let encoded = frame.encode().unwrap();
        match ControlFrame::decode(&encoded).unwrap() {
            ControlFrame::Data(p) => {
                assert_eq!(p.origin, origin);
                assert_eq!(p.bytes, b"x");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn join_ok_round_trips_peer_table() {
        let entry = PeerId::new();
        let assigned = PeerId::new();
        let peer = PeerRecord::new(PeerId::new(), "127.0.0.1", 9000);
        let frame = ControlFrame::JoinOk(JoinOkPayload {
            peers: vec![peer.clone()],
            assigned_id: assigned,
            entry_id: entry,
        });
        let encoded = frame.encode().unwrap();
        match ControlFrame::decode(&encoded).unwrap() {
            ControlFrame::JoinOk(p) => {
                assert_eq!(p.assigned_id, assigned);
                assert_eq!(p.entry_id, entry);
                assert_eq!(p.peers, vec![peer]);
            }
            _ => panic!("wrong variant"),
        }
    }
}
