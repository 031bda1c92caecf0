//! The BitTorrent peer wire protocol codec: the handshake and the
//! length-prefixed typed messages exchanged after it.
//!
//! Two `tokio_util::codec` implementations are provided so a `Framed`
//! transport can be switched from one to the other mid-stream, the way
//! `PeerSession::connect` does: first `HandshakeCodec` for the fixed
//! 68-byte handshake, then `PeerCodec` for everything after.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{bitfield::Bitfield, BlockInfo, Error, PeerId, PieceIndex, Sha1Hash};

/// The conventional protocol string identifying BitTorrent version 1.
pub(crate) const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// A special message exchanged once at the start of a connection, before
/// any other peer message, to identify the swarm and the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub prot: Vec<u8>,
    pub reserved: [u8; 8],
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    /// Creates a handshake with the canonical protocol string and all-zero
    /// reserved bytes (extension negotiation is out of scope).
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        Self {
            prot: PROTOCOL_STRING.as_bytes().to_vec(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }
}

/// Encodes and decodes the fixed-format handshake.
///
/// ```text
/// [1]  pstrlen
/// [..] pstr                  (ASCII, conventionally 19 bytes long)
/// [8]  reserved (all zero on send; ignored on receive)
/// [20] info_hash
/// [20] peer_id
/// ```
#[derive(Clone, Copy, Debug)]
pub(crate) struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(&mut self, handshake: Handshake, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Handshake {
            prot,
            reserved,
            info_hash,
            peer_id,
        } = handshake;
        dst.reserve(49 + prot.len());
        dst.put_u8(prot.len() as u8);
        dst.extend_from_slice(&prot);
        dst.extend_from_slice(&reserved);
        dst.extend_from_slice(&info_hash);
        dst.extend_from_slice(&peer_id);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let pstr_len = src[0] as usize;
        if pstr_len == 0 {
            return Err(Error::Handshake("pstrlen must not be 0".into()));
        }
        let total_len = 1 + 48 + pstr_len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut buf = src.split_to(total_len);
        buf.advance(1);
        let prot = buf.split_to(pstr_len).to_vec();
        let mut reserved = [0; 8];
        reserved.copy_from_slice(&buf[..8]);
        buf.advance(8);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&buf[..20]);
        buf.advance(20);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&buf[..20]);

        Ok(Some(Handshake {
            prot,
            reserved,
            info_hash,
            peer_id,
        }))
    }
}

/// A parsed peer message, everything exchanged after the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: PieceIndex },
    Bitfield(Bitfield),
    Request(BlockInfo),
    Piece { piece_index: PieceIndex, offset: u32, data: Vec<u8> },
    Cancel(BlockInfo),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl Message {
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield(_) => Some(MessageId::Bitfield),
            Message::Request(_) => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel(_) => Some(MessageId::Cancel),
        }
    }
}

/// Encodes and decodes length-prefixed peer messages.
///
/// ```text
/// [4] length (big-endian u32)
/// if length == 0: keep-alive, no further bytes
/// else:
///   [1] id
///   [length-1] payload
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PeerCodec;

impl Encoder<Message> for PeerCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match msg {
            Message::KeepAlive => {
                dst.reserve(4);
                dst.extend_from_slice(&0u32.to_be_bytes());
            }
            Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {
                let id = msg.id().expect("non keep-alive message has an id");
                dst.reserve(5);
                dst.extend_from_slice(&1u32.to_be_bytes());
                dst.put_u8(id as u8);
            }
            Message::Have { piece_index } => {
                dst.reserve(9);
                dst.extend_from_slice(&5u32.to_be_bytes());
                dst.put_u8(MessageId::Have as u8);
                dst.extend_from_slice(&(piece_index as u32).to_be_bytes());
            }
            Message::Bitfield(bitfield) => {
                let payload = bitfield.into_wire_bytes();
                let len = 1 + payload.len();
                dst.reserve(4 + len);
                dst.extend_from_slice(&(len as u32).to_be_bytes());
                dst.put_u8(MessageId::Bitfield as u8);
                dst.extend_from_slice(&payload);
            }
            Message::Request(block) | Message::Cancel(block) => {
                let id = msg.id().expect("non keep-alive message has an id");
                dst.reserve(17);
                dst.extend_from_slice(&13u32.to_be_bytes());
                dst.put_u8(id as u8);
                dst.extend_from_slice(&(block.piece_index as u32).to_be_bytes());
                dst.extend_from_slice(&block.offset.to_be_bytes());
                dst.extend_from_slice(&block.len.to_be_bytes());
            }
            Message::Piece {
                piece_index,
                offset,
                data,
            } => {
                let len = 1 + 8 + data.len();
                dst.reserve(4 + len);
                dst.extend_from_slice(&(len as u32).to_be_bytes());
                dst.put_u8(MessageId::Piece as u8);
                dst.extend_from_slice(&(piece_index as u32).to_be_bytes());
                dst.extend_from_slice(&offset.to_be_bytes());
                dst.extend_from_slice(&data);
            }
        }
        Ok(())
    }
}

/// An upper bound on a single message's length, guarding against a
/// misbehaving or malicious peer asking us to allocate an unbounded
/// buffer.
const MAX_MESSAGE_LEN: usize = 1 << 20;

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len == 0 {
            src.advance(4);
            // a keep-alive is a distinguished no-op result, not an error;
            // there may be another frame right behind it in the buffer
            return Ok(Some(Message::KeepAlive));
        }

        if len > MAX_MESSAGE_LEN {
            return Err(Error::Framing(format!(
                "message length {} exceeds the {} byte limit",
                len, MAX_MESSAGE_LEN
            )));
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src[0];
        let mut payload = src.split_to(len).split_off(1);
        let msg = match id {
            0 => Message::Choke,
            1 => Message::Unchoke,
            2 => Message::Interested,
            3 => Message::NotInterested,
            4 => {
                if payload.len() != 4 {
                    return Err(Error::Framing(format!(
                        "have payload must be 4 bytes, got {}",
                        payload.len()
                    )));
                }
                let mut buf = [0; 4];
                buf.copy_from_slice(&payload);
                Message::Have {
                    piece_index: u32::from_be_bytes(buf) as PieceIndex,
                }
            }
            5 => Message::Bitfield(Bitfield::from_wire_bytes(&payload, payload.len() * 8)),
            6 | 8 => {
                if payload.len() != 12 {
                    return Err(Error::Framing(format!(
                        "request/cancel payload must be 12 bytes, got {}",
                        payload.len()
                    )));
                }
                let mut idx = [0; 4];
                idx.copy_from_slice(&payload[0..4]);
                let mut off = [0; 4];
                off.copy_from_slice(&payload[4..8]);
                let mut len = [0; 4];
                len.copy_from_slice(&payload[8..12]);
                let block = BlockInfo {
                    piece_index: u32::from_be_bytes(idx) as PieceIndex,
                    offset: u32::from_be_bytes(off),
                    len: u32::from_be_bytes(len),
                };
                if id == 6 {
                    Message::Request(block)
                } else {
                    Message::Cancel(block)
                }
            }
            7 => {
                if payload.len() < 8 {
                    return Err(Error::ProtocolViolation(format!(
                        "piece payload shorter than 8 bytes: {}",
                        payload.len()
                    )));
                }
                let mut idx = [0; 4];
                idx.copy_from_slice(&payload[0..4]);
                let mut off = [0; 4];
                off.copy_from_slice(&payload[4..8]);
                let data = payload.split_off(8).to_vec();
                Message::Piece {
                    piece_index: u32::from_be_bytes(idx) as PieceIndex,
                    offset: u32::from_be_bytes(off),
                    data,
                }
            }
            other => {
                return Err(Error::Framing(format!("unknown message id {}", other)));
            }
        };

        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn handshake_round_trip() {
        let mut info_hash = [0u8; 20];
        for (i, b) in info_hash.iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        let mut peer_id = [0u8; 20];
        for (i, b) in peer_id.iter_mut().enumerate() {
            *b = i as u8 + 0x15;
        }
        let handshake = Handshake::new(info_hash, peer_id);

        let mut buf = BytesMut::new();
        HandshakeCodec.encode(handshake.clone(), &mut buf).unwrap();

        assert_eq!(buf.len(), 68);
        assert_eq!(buf[0], 0x13);
        assert_eq!(&buf[1..20], PROTOCOL_STRING.as_bytes());
        assert_eq!(&buf[20..28], &[0u8; 8]);
        assert_eq!(&buf[28..48], &info_hash);
        assert_eq!(&buf[48..68], &peer_id);

        let decoded = HandshakeCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn handshake_rejects_zero_pstrlen() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0]);
        let err = HandshakeCodec.decode(&mut buf);
        assert!(err.is_err());
    }

    #[test]
    fn keep_alive_round_trip() {
        let mut buf = BytesMut::new();
        PeerCodec.encode(Message::KeepAlive, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
        let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::KeepAlive);
    }

    #[test]
    fn request_serialization() {
        let mut buf = BytesMut::new();
        let block = BlockInfo {
            piece_index: 5,
            offset: 32768,
            len: 16384,
        };
        PeerCodec.encode(Message::Request(block), &mut buf).unwrap();
        let expected: &[u8] = &[
            0, 0, 0, 13, 6, 0, 0, 0, 5, 0, 0, 0x80, 0x00, 0, 0, 0x40, 0x00,
        ];
        assert_eq!(&buf[..], expected);

        let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Request(block));
    }

    #[test]
    fn have_parses_piece_index() {
        let mut buf = BytesMut::new();
        PeerCodec
            .encode(Message::Have { piece_index: 7 }, &mut buf)
            .unwrap();
        let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Have { piece_index: 7 });
    }

    #[test]
    fn have_rejects_wrong_payload_len() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.put_u8(4);
        buf.extend_from_slice(&[0, 0, 0]); // only 3 bytes instead of 4
        assert!(PeerCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn piece_round_trip() {
        let mut buf = BytesMut::new();
        let msg = Message::Piece {
            piece_index: 2,
            offset: 16384,
            data: vec![1, 2, 3, 4],
        };
        PeerCodec.encode(msg.clone(), &mut buf).unwrap();
        let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn piece_rejects_short_payload() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&4u32.to_be_bytes()); // id + 3 bytes, too short for index+offset
        buf.put_u8(7);
        buf.extend_from_slice(&[0, 0, 0]);
        assert!(PeerCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn bitfield_round_trip() {
        let mut buf = BytesMut::new();
        let bitfield = Bitfield::from_wire_bytes(&[0b1010_0000], 8);
        PeerCodec
            .encode(Message::Bitfield(bitfield.clone()), &mut buf)
            .unwrap();
        let decoded = PeerCodec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Bitfield(got) => {
                assert!(got.has_piece(0));
                assert!(!got.has_piece(1));
                assert!(got.has_piece(2));
            }
            other => panic!("expected bitfield, got {:?}", other),
        }
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&9u32.to_be_bytes());
        buf.put_u8(4);
        buf.extend_from_slice(&[0, 0, 0]); // incomplete payload
        assert_eq!(PeerCodec.decode(&mut buf).unwrap(), None);
    }
}
