//! The torrent descriptor (`TorrentInfo`) and the units of work and result
//! that flow through the piece scheduler.
//!
//! `TorrentInfo` is the in-memory shape of the descriptor produced by an
//! external `.torrent`/metainfo parser (out of scope for this crate, see
//! [`crate::metainfo`] for the test-only bencode-backed helper that builds
//! one). It is immutable once constructed and is the only input
//! [`crate::download`] needs besides a set of peer addresses.

use crate::{error::Result, Error, PeerId, PieceIndex, Sha1Hash};

/// An immutable, validated description of a torrent: what to download, how
/// it's split into pieces, and the identifiers needed for the handshake.
#[derive(Clone, Debug)]
pub struct TorrentInfo {
    /// SHA-1 of the bencoded `info` dictionary; identifies the swarm.
    pub info_hash: Sha1Hash,
    /// This client's 20 byte peer id, sent in the handshake.
    pub peer_id: PeerId,
    /// The expected SHA-1 hash of each piece, in order.
    piece_hashes: Vec<Sha1Hash>,
    /// The nominal length of a piece; the last piece may be shorter.
    piece_len: u32,
    /// The sum of the lengths of all pieces, i.e. the size of the
    /// reassembled file.
    total_len: u64,
    /// A human readable name for the torrent (from the metainfo `name`
    /// field), used only for logging.
    pub name: String,
}

impl TorrentInfo {
    /// Builds a descriptor, validating the invariant that relates piece
    /// count, piece length and total length:
    /// `(P-1)*piece_len < total_len <= P*piece_len`.
    pub fn new(
        info_hash: Sha1Hash,
        peer_id: PeerId,
        piece_hashes: Vec<Sha1Hash>,
        piece_len: u32,
        total_len: u64,
        name: String,
    ) -> Result<Self> {
        if piece_hashes.is_empty() {
            return Err(Error::InvalidDescriptor(
                "torrent must have at least one piece".into(),
            ));
        }
        if piece_len == 0 {
            return Err(Error::InvalidDescriptor("piece_len must be positive".into()));
        }
        let piece_count = piece_hashes.len() as u64;
        let lower_bound = (piece_count - 1) * piece_len as u64;
        let upper_bound = piece_count * piece_len as u64;
        if !(lower_bound < total_len && total_len <= upper_bound) {
            return Err(Error::InvalidDescriptor(format!(
                "total_len {} is inconsistent with {} pieces of length {}",
                total_len, piece_count, piece_len
            )));
        }

        Ok(Self {
            info_hash,
            peer_id,
            piece_hashes,
            piece_len,
            total_len,
            name,
        })
    }

    /// The number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// The total size of the reassembled download, in bytes.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// The nominal piece length; the last piece may be shorter, see
    /// [`TorrentInfo::piece_len`].
    pub fn nominal_piece_len(&self) -> u32 {
        self.piece_len
    }

    /// The expected hash of the piece at `index`.
    pub fn piece_hash(&self, index: PieceIndex) -> Result<Sha1Hash> {
        self.piece_hashes
            .get(index)
            .copied()
            .ok_or(Error::InvalidPieceIndex(index))
    }

    /// The byte offset of piece `index` within the reassembled file.
    pub fn piece_offset(&self, index: PieceIndex) -> u64 {
        index as u64 * self.piece_len as u64
    }

    /// The length, in bytes, of the piece at `index`: `piece_len` for
    /// every piece except possibly the last, which may be shorter.
    pub fn piece_len(&self, index: PieceIndex) -> Result<u32> {
        let piece_count = self.piece_count();
        if index >= piece_count {
            return Err(Error::InvalidPieceIndex(index));
        }
        if index == piece_count - 1 {
            let len = self.total_len - self.piece_offset(index);
            Ok(len as u32)
        } else {
            Ok(self.piece_len)
        }
    }

    /// Builds the full set of work items for this torrent, in piece-index
    /// order, ready to pre-fill the scheduler's work queue.
    pub fn all_pieces(&self) -> Result<Vec<PieceWork>> {
        (0..self.piece_count())
            .map(|index| {
                Ok(PieceWork {
                    index,
                    hash: self.piece_hash(index)?,
                    len: self.piece_len(index)?,
                })
            })
            .collect()
    }
}

/// A unit of work handed out by the piece scheduler: download the piece at
/// `index`, which must hash to `hash` and is exactly `len` bytes long.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub hash: Sha1Hash,
    pub len: u32,
}

/// The verified result of downloading a piece, ready for placement into
/// the output buffer.
#[derive(Clone, Debug)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub buf: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hashes(n: usize) -> Vec<Sha1Hash> {
        (0..n).map(|i| [i as u8; 20]).collect()
    }

    #[test]
    fn rejects_inconsistent_total_len() {
        // 4 pieces of 16 KiB should total at most 64 KiB and more than 48 KiB
        let err = TorrentInfo::new(
            [0; 20],
            [0; 20],
            hashes(4),
            16384,
            48 * 1024, // exactly the lower bound, which is excluded
            "x".into(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn accepts_last_piece_shorter_than_nominal() {
        let info = TorrentInfo::new(
            [0; 20],
            [0; 20],
            hashes(4),
            16384,
            3 * 16384 + 100,
            "x".into(),
        )
        .unwrap();
        assert_eq!(info.piece_len(0).unwrap(), 16384);
        assert_eq!(info.piece_len(3).unwrap(), 100);
        assert_eq!(info.piece_offset(3), 3 * 16384);
    }

    #[test]
    fn all_pieces_are_in_order() {
        let info = TorrentInfo::new([0; 20], [0; 20], hashes(3), 10, 25, "x".into()).unwrap();
        let work = info.all_pieces().unwrap();
        assert_eq!(work.len(), 3);
        assert_eq!(work[0].index, 0);
        assert_eq!(work[0].len, 10);
        assert_eq!(work[2].len, 5);
    }

    #[test]
    fn rejects_empty_piece_hashes() {
        assert!(TorrentInfo::new([0; 20], [0; 20], vec![], 10, 10, "x".into()).is_err());
    }
}
