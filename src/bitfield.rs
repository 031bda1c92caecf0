//! The bitfield represents the piece availability of a peer.
//!
//! It is a compact bool vector from most significant bit to least
//! significant bit, that is, where the first highest bit represents the
//! first piece, the second highest bit the second piece, and so on (e.g.
//! `0b1100_0001` would mean that a peer has pieces 0, 1, and 7). A truthy
//! boolean value of a piece's position in this vector means that the peer
//! has the piece, while a falsy value means it doesn't.

use bitvec::prelude::{BitVec, Msb0};

use crate::PieceIndex;

/// A peer's piece availability, as sent once in the message right after
/// the handshake.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bitfield(BitVec<Msb0, u8>);

impl Bitfield {
    /// Creates an all-zero bitfield representing `piece_count` pieces.
    pub fn new(piece_count: usize) -> Self {
        let mut bitfield = BitVec::new();
        bitfield.resize(piece_count, false);
        Self(bitfield)
    }

    /// Builds a bitfield from the raw bytes sent over the wire, truncated
    /// (or zero-padded) to exactly `piece_count` bits.
    ///
    /// The raw bitfield on the wire may be padded with extra bits at the
    /// end if the piece count isn't a multiple of 8; those trailing bits
    /// are dropped here so `len()` always matches the torrent's piece
    /// count.
    pub fn from_wire_bytes(bytes: &[u8], piece_count: usize) -> Self {
        let mut bitfield = BitVec::from_vec(bytes.to_vec());
        bitfield.resize(piece_count, false);
        Self(bitfield)
    }

    /// Returns the raw bytes of the bitfield, MSB-first, suitable for
    /// sending in a Bitfield message.
    pub fn into_wire_bytes(self) -> Vec<u8> {
        self.0.into_vec()
    }

    /// Returns whether the peer claims to have the piece at `index`.
    ///
    /// Returns `false` for an out-of-range index rather than panicking:
    /// a peer that never announced a piece (or whose bitfield was
    /// shorter than the torrent's piece count) simply doesn't have it.
    pub fn has_piece(&self, index: PieceIndex) -> bool {
        self.0.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Records that the peer has the piece at `index`.
    ///
    /// Indices beyond the bitfield's current length are silently ignored.
    /// The bitfield's length is fixed at construction (handshake time);
    /// a `Have` message for a piece the peer didn't originally announce
    /// availability for is protocol-legal but this implementation chooses
    /// not to grow the bitfield to accommodate it (see design notes on
    /// bitfield growth).
    pub fn set_piece(&mut self, index: PieceIndex) {
        if index < self.0.len() {
            self.0.set(index, true);
        }
    }

    /// Returns true if every bit up to `piece_count` is set, i.e. the peer
    /// is a seed with the entire torrent.
    pub fn has_all(&self, piece_count: usize) -> bool {
        (0..piece_count).all(|i| self.has_piece(i))
    }

    /// The number of pieces this bitfield can address.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_piece_reports_msb_first() {
        // 0b1010_0000 -> piece 0 and piece 2 present
        let bitfield = Bitfield::from_wire_bytes(&[0b1010_0000], 8);
        let expected = [true, false, true, false, false, false, false, false];
        for (i, expect) in expected.iter().enumerate() {
            assert_eq!(bitfield.has_piece(i), *expect, "piece {}", i);
        }
    }

    #[test]
    fn has_piece_out_of_range_is_false() {
        let bitfield = Bitfield::from_wire_bytes(&[0xff], 8);
        assert!(!bitfield.has_piece(100));
    }

    #[test]
    fn set_piece_out_of_range_is_ignored() {
        let mut bitfield = Bitfield::new(4);
        bitfield.set_piece(100);
        assert_eq!(bitfield.len(), 4);
        assert!(!bitfield.has_piece(100));
    }

    #[test]
    fn set_piece_then_has_piece() {
        let mut bitfield = Bitfield::new(8);
        assert!(!bitfield.has_piece(3));
        bitfield.set_piece(3);
        assert!(bitfield.has_piece(3));
    }

    #[test]
    fn has_all_detects_seed() {
        let bitfield = Bitfield::from_wire_bytes(&[0xff], 8);
        assert!(bitfield.has_all(8));
        let mut partial = Bitfield::new(8);
        partial.set_piece(0);
        assert!(!partial.has_all(8));
    }
}
