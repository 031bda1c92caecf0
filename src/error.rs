//! The crate-wide error type and the `Result` alias used throughout.
//!
//! Variants map one-to-one onto the error taxonomy of the peer wire
//! protocol and piece scheduler: connection setup failures
//! (`Connect`/`Handshake`/`BitfieldMissing`), wire-level framing failures
//! (`Framing`/`ProtocolViolation`), content failures (`Integrity`), and the
//! per-piece deadline (`Timeout`).

use crate::PieceIndex;

/// The crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a peer session or the piece scheduler can fail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// TCP connect to the peer failed or timed out.
    #[error("connecting to peer failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The handshake was malformed, too short, or the peer's info hash
    /// didn't match ours.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// The first message a peer sent after the handshake was not a
    /// Bitfield.
    #[error("peer's first message after handshake was not a bitfield")]
    BitfieldMissing,

    /// A length-prefixed message could not be parsed: a short read, an
    /// impossible length, or a malformed payload.
    #[error("malformed message frame: {0}")]
    Framing(String),

    /// A peer violated the wire protocol in a way that isn't a framing
    /// error: wrong piece index in a `Piece` message, a payload shorter
    /// than its required header, or an offset outside the piece buffer.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The SHA-1 hash of an assembled piece didn't match the expected
    /// hash.
    #[error("piece {index} failed its integrity check")]
    Integrity {
        /// The piece that failed verification.
        index: PieceIndex,
    },

    /// The per-piece deadline elapsed before the piece finished
    /// downloading.
    #[error("timed out waiting for piece {index}")]
    Timeout {
        /// The piece whose deadline elapsed.
        index: PieceIndex,
    },

    /// The descriptor `T` violated its own invariants (e.g. piece lengths
    /// that don't add up to the total length).
    #[error("invalid torrent descriptor: {0}")]
    InvalidDescriptor(String),

    /// `download()` was called with no peer endpoints to connect to.
    #[error("no peers to download from")]
    NoPeers,

    /// Every peer session ended before all pieces were downloaded; the
    /// swarm cannot complete this download as given.
    #[error("swarm exhausted: only {done}/{total} pieces downloaded")]
    Exhausted {
        /// Pieces successfully downloaded before every session exited.
        done: usize,
        /// The total number of pieces in the torrent.
        total: usize,
    },

    /// An index into the torrent's pieces was out of range.
    #[error("piece index {0} out of range")]
    InvalidPieceIndex(PieceIndex),

    /// A generic I/O failure not otherwise classified above.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An internal channel was closed while the scheduler or a session
    /// still expected to use it. This only happens if a task panicked.
    #[error("an internal channel closed unexpectedly")]
    ChannelClosed,

    /// A `.torrent`/bencode buffer could not be decoded. Only reachable
    /// through the test-only `metainfo` helper; `download()` itself never
    /// parses raw `.torrent` bytes.
    #[error("bencode decode error: {0}")]
    Bencode(#[from] serde_bencode::Error),
}
