//! This module defines types used to configure the engine and its parts.

use std::time::Duration;

use crate::{PeerId, MAX_BACKLOG, MAX_BLOCK_SIZE};

/// The default client id used when none is supplied by the caller.
pub const DEFAULT_CLIENT_ID: &PeerId = b"-LC0001-000000000000";

/// The global configuration for a download.
#[derive(Clone, Debug)]
pub struct Conf {
    pub engine: EngineConf,
    pub torrent: TorrentConf,
}

impl Conf {
    /// Returns a configuration with reasonable defaults and the default
    /// client id, [`DEFAULT_CLIENT_ID`].
    pub fn new() -> Self {
        Self {
            engine: EngineConf {
                client_id: *DEFAULT_CLIENT_ID,
            },
            torrent: TorrentConf::new(),
        }
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration related to the engine itself.
#[derive(Clone, Copy, Debug)]
pub struct EngineConf {
    /// The ID of the client to announce to peers during the handshake.
    pub client_id: PeerId,
}

/// Configuration for a single download.
#[derive(Clone, Copy, Debug)]
pub struct TorrentConf {
    /// How long to wait for a TCP connect and the subsequent handshake
    /// round trip before giving up on a peer.
    pub connect_timeout: Duration,

    /// How long a peer session may go without completing a piece before
    /// it is considered stalled; the session requeues its current piece
    /// and tears down the connection.
    pub piece_deadline: Duration,

    /// The maximum number of unfulfilled block requests a session keeps
    /// outstanding to a single peer at once.
    pub max_backlog: usize,

    /// The block size requested from peers. Always 16 KiB in practice;
    /// configurable mainly for tests that want small pieces made up of a
    /// handful of blocks without huge buffers.
    pub block_len: u32,
}

impl TorrentConf {
    /// Returns the torrent configuration with the spec-mandated defaults:
    /// a 5 second connect timeout, a 30 second per-piece deadline, a
    /// backlog of 5 outstanding requests, and the canonical 16 KiB block
    /// size.
    pub fn new() -> Self {
        Self {
            // generous enough for most swarms without leaving a dead peer
            // occupying a worker slot for too long
            connect_timeout: Duration::from_secs(5),
            // per spec: a stalled peer must be abandoned within tens of
            // seconds, not indefinitely
            piece_deadline: Duration::from_secs(30),
            max_backlog: MAX_BACKLOG,
            block_len: MAX_BLOCK_SIZE,
        }
    }
}

impl Default for TorrentConf {
    fn default() -> Self {
        Self::new()
    }
}
