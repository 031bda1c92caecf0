#[macro_use]
extern crate serde_derive;

mod assemble;
mod bitfield;
mod codec;
pub mod conf;
pub mod error;
pub mod info;
pub mod metainfo;
mod peer;
pub mod reporter;
mod scheduler;

use std::net::SocketAddr;

pub use bitfield::Bitfield;
pub use conf::Conf;
pub use error::{Error, Result};
pub use info::{PieceResult, PieceWork, TorrentInfo};
pub use reporter::{LogReporter, NullReporter, PieceProgress, Reporter};

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in
/// the source code we use `usize` to be consistent with other index types
/// in Rust.
pub type PieceIndex = usize;

/// Each torrent's peer ID is an arbitrary 20 byte string.
///
/// Guidelines for choosing a peer ID: http://bittorrent.org/beps/bep_0020.html.
pub type PeerId = [u8; 20];

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// This is the only block length we're dealing with (except for possibly
/// the last block in a piece). It is the widely used and accepted 16 KiB.
pub const MAX_BLOCK_SIZE: u32 = 0x4000;

/// The maximum number of unfulfilled block requests a single peer session
/// keeps outstanding at once.
pub const MAX_BACKLOG: usize = 5;

/// A block is a fixed size chunk of a piece, which in turn is a fixed size
/// chunk of a torrent. Downloading torrents happens at this block level
/// granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockInfo {
    /// The index of the piece of which this is a block.
    pub piece_index: PieceIndex,
    /// The zero-based byte offset into the piece.
    pub offset: u32,
    /// The block's length in bytes. Always 16 KiB (`MAX_BLOCK_SIZE`),
    /// except possibly for the last block in a piece.
    pub len: u32,
}

/// Returns the length of the block at the index in piece.
///
/// If the piece is not a multiple of the default block length, the
/// returned value is smaller.
///
/// # Panics
///
/// Panics if the index multiplied by the default block length would exceed
/// the piece length.
pub(crate) fn block_len(piece_len: u32, index: usize) -> u32 {
    let index = index as u32;
    let block_offset = index * MAX_BLOCK_SIZE;
    assert!(piece_len > block_offset);
    std::cmp::min(piece_len - block_offset, MAX_BLOCK_SIZE)
}

/// Returns the number of blocks in a piece of the given length.
pub(crate) fn block_count(piece_len: u32) -> usize {
    // all but the last piece are a multiple of the block length, but the
    // last piece may be shorter so we need to account for this by rounding
    // up before dividing to get the number of blocks in piece
    (piece_len as usize + (MAX_BLOCK_SIZE as usize - 1)) / MAX_BLOCK_SIZE as usize
}

/// Downloads a torrent described by `info` from the given peer endpoints.
///
/// This is the only entry point the rest of the engine (tracker client,
/// metainfo parser, CLI/daemon front end) needs: it spawns one session per
/// peer, runs the piece scheduler to completion and returns the assembled
/// file content, exactly `info.total_len` bytes long.
pub async fn download(
    info: &TorrentInfo,
    peers: &[SocketAddr],
    conf: &Conf,
    reporter: &(impl Reporter + Sync),
) -> Result<Vec<u8>> {
    scheduler::run(info, peers, conf, reporter).await
}

#[cfg(test)]
mod tests {
    use super::*;

    // An arbitrary piece length that is an exact multiple of the canonical
    // block length (16 KiB).
    const BLOCK_LEN_MULTIPLE_PIECE_LEN: u32 = 2 * MAX_BLOCK_SIZE;

    // An arbitrary piece length that is _not_ a multiple of the canonical
    // block length and the amount with which it overlaps the nearest exact
    // multiple value.
    const OVERLAP: u32 = 234;
    const UNEVEN_PIECE_LEN: u32 = 2 * MAX_BLOCK_SIZE + OVERLAP;

    #[test]
    fn test_block_len() {
        assert_eq!(block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, 0), MAX_BLOCK_SIZE);
        assert_eq!(block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, 1), MAX_BLOCK_SIZE);

        assert_eq!(block_len(UNEVEN_PIECE_LEN, 0), MAX_BLOCK_SIZE);
        assert_eq!(block_len(UNEVEN_PIECE_LEN, 1), MAX_BLOCK_SIZE);
        assert_eq!(block_len(UNEVEN_PIECE_LEN, 2), OVERLAP);
    }

    #[test]
    #[should_panic]
    fn test_block_len_invalid_index_panic() {
        block_len(BLOCK_LEN_MULTIPLE_PIECE_LEN, 2);
    }

    #[test]
    fn test_block_count() {
        assert_eq!(block_count(BLOCK_LEN_MULTIPLE_PIECE_LEN), 2);
        assert_eq!(block_count(UNEVEN_PIECE_LEN), 3);
    }
}
