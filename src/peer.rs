//! A single outbound connection to a peer: handshake, bitfield exchange,
//! and the request/response loop that turns [`PieceWork`] into
//! [`PieceResult`].
//!
//! Unlike a full client, a session here only ever pulls from a shared work
//! queue and pushes to a shared results queue; it has no notion of serving
//! other peers or of a persistent swarm-wide state, since this crate only
//! leeches.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, FramedParts};

use crate::assemble::verify_piece;
use crate::codec::{Handshake, HandshakeCodec, Message, PeerCodec, PROTOCOL_STRING};
use crate::info::{PieceResult, PieceWork, TorrentInfo};
use crate::{bitfield::Bitfield, conf::TorrentConf, BlockInfo, Error, PeerId, Result};

/// Work queue shared by every session of the same download. Both ends are
/// `async_channel` handles: cheap to clone, contention-free (no mutex
/// guarding a single-owner receiver), and closeable from either side so the
/// driver can wake every idle worker out of `recv()` once every piece is
/// accounted for.
pub(crate) type WorkTx = async_channel::Sender<PieceWork>;
pub(crate) type WorkRx = async_channel::Receiver<PieceWork>;
pub(crate) type ResultTx = mpsc::UnboundedSender<PieceResult>;

/// A single outbound connection to one peer.
pub(crate) struct PeerSession {
    addr: SocketAddr,
    info: Arc<TorrentInfo>,
    conf: Arc<TorrentConf>,
    client_id: PeerId,
    /// Whether the peer currently permits us to request blocks.
    is_choked: bool,
}

impl PeerSession {
    pub(crate) fn new(
        addr: SocketAddr,
        info: Arc<TorrentInfo>,
        conf: Arc<TorrentConf>,
        client_id: PeerId,
    ) -> Self {
        Self {
            addr,
            info,
            conf,
            client_id,
            is_choked: true,
        }
    }

    /// Connects to the peer and completes the handshake: opens the TCP
    /// stream under the connect timeout, exchanges `Handshake`s, and
    /// checks the peer's `info_hash` against ours before swapping the
    /// connection's codec from [`HandshakeCodec`] to [`PeerCodec`] for
    /// everything that follows. The peer's bitfield is read separately by
    /// [`Self::expect_bitfield`] once this returns; a peer may claim any
    /// subset of pieces, since a piece it lacks is simply requeued for
    /// another session to pick up (see [`Self::run`]).
    async fn connect(
        &self,
    ) -> Result<(
        futures::stream::SplitSink<Framed<TcpStream, PeerCodec>, Message>,
        futures::stream::SplitStream<Framed<TcpStream, PeerCodec>>,
    )> {
        log::info!("connecting to peer {}", self.addr);
        let socket = tokio::time::timeout(
            self.conf.connect_timeout,
            TcpStream::connect(self.addr),
        )
        .await
        .map_err(|_| Error::Connect(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(Error::Connect)?;

        let mut socket = Framed::new(socket, HandshakeCodec);

        let handshake = Handshake::new(self.info.info_hash, self.client_id);
        log::debug!("sending handshake to {}", self.addr);
        socket.send(handshake).await?;

        let peer_handshake = socket
            .next()
            .await
            .ok_or_else(|| Error::Handshake("peer closed connection before handshaking".into()))??;
        log::debug!("received handshake from {}", self.addr);

        if peer_handshake.prot != PROTOCOL_STRING.as_bytes() {
            return Err(Error::Handshake(format!(
                "unexpected protocol string: {:?}",
                peer_handshake.prot
            )));
        }
        if peer_handshake.info_hash != self.info.info_hash {
            return Err(Error::Handshake("info hash mismatch".into()));
        }

        // switch codecs, carrying over any bytes the peer already sent
        // right after its handshake
        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, PeerCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let socket = Framed::from_parts(new_parts);

        Ok(socket.split())
    }

    /// Waits for the peer's bitfield, which must be the very first message
    /// after the handshake. The peer may claim any subset of pieces (or
    /// none); a peer missing a piece we need is simply skipped by the
    /// session loop, which requeues that work for another peer.
    async fn expect_bitfield(
        &self,
        stream: &mut futures::stream::SplitStream<Framed<TcpStream, PeerCodec>>,
    ) -> Result<Bitfield> {
        let msg = stream
            .next()
            .await
            .ok_or(Error::BitfieldMissing)??;
        match msg {
            Message::Bitfield(bitfield) => Ok(bitfield),
            _ => Err(Error::BitfieldMissing),
        }
    }

    /// Runs the session until the shared work queue is drained: connects,
    /// exchanges availability, then repeatedly pulls a [`PieceWork`] item,
    /// downloads it and pushes the verified result, until the work queue is
    /// closed or an unrecoverable error occurs.
    ///
    /// A piece whose download fails outright (a framing error, a stalled
    /// deadline, a dropped connection) is requeued and the session exits;
    /// a piece that downloads but fails its integrity check is requeued and
    /// the session keeps going, trying the next piece.
    pub(crate) async fn run(
        mut self,
        work_tx: WorkTx,
        work_rx: WorkRx,
        results_tx: ResultTx,
    ) -> Result<()> {
        let (mut sink, mut stream) = self.connect().await?;
        let mut bitfield = self.expect_bitfield(&mut stream).await?;
        log::info!("peer {} announced its bitfield, starting download loop", self.addr);

        sink.send(Message::Unchoke).await?;
        sink.send(Message::Interested).await?;

        loop {
            // `work_rx` is a cheaply cloneable `async_channel::Receiver`,
            // not a mutex-guarded single-owner receiver: no lock is held
            // across this await, so the driver can close the channel and
            // wake every idle session the moment all pieces are accounted
            // for, even one parked here with an empty, still-open queue.
            let work = match work_rx.recv().await {
                Ok(work) => work,
                Err(_) => break,
            };

            if !bitfield.has_piece(work.index) {
                // this peer can't serve this piece; another session might
                let _ = work_tx.send(work).await;
                continue;
            }

            match self
                .download_piece(&mut sink, &mut stream, &work, &mut bitfield)
                .await
            {
                Ok(buf) => {
                    if verify_piece(&work, &buf) {
                        sink.send(Message::Have {
                            piece_index: work.index,
                        })
                        .await?;
                        let index = work.index;
                        results_tx
                            .send(PieceResult { index, buf })
                            .map_err(|_| Error::ChannelClosed)?;
                    } else {
                        log::warn!(
                            "piece {} from peer {} failed its integrity check",
                            work.index,
                            self.addr
                        );
                        let _ = work_tx.send(work).await;
                    }
                }
                Err(err) => {
                    log::warn!(
                        "peer {} failed to deliver piece {}: {}",
                        self.addr,
                        work.index,
                        err
                    );
                    let _ = work_tx.send(work).await;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Downloads a single piece, pipelining up to `conf.max_backlog` block
    /// requests at a time, subject to the overall per-piece deadline.
    async fn download_piece(
        &mut self,
        sink: &mut futures::stream::SplitSink<Framed<TcpStream, PeerCodec>, Message>,
        stream: &mut futures::stream::SplitStream<Framed<TcpStream, PeerCodec>>,
        work: &PieceWork,
        bitfield: &mut Bitfield,
    ) -> Result<Vec<u8>> {
        let index = work.index;
        let deadline = self.conf.piece_deadline;
        tokio::time::timeout(
            deadline,
            self.download_piece_inner(sink, stream, work, bitfield),
        )
        .await
        .map_err(|_| Error::Timeout { index })?
    }

    async fn download_piece_inner(
        &mut self,
        sink: &mut futures::stream::SplitSink<Framed<TcpStream, PeerCodec>, Message>,
        stream: &mut futures::stream::SplitStream<Framed<TcpStream, PeerCodec>>,
        work: &PieceWork,
        bitfield: &mut Bitfield,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; work.len as usize];
        let mut requested = 0u32;
        let mut downloaded = 0u32;
        let mut backlog = 0usize;
        let started_at = Instant::now();

        while downloaded < work.len {
            while !self.is_choked && backlog < self.conf.max_backlog && requested < work.len {
                let block_len = std::cmp::min(self.conf.block_len, work.len - requested);
                sink.send(Message::Request(BlockInfo {
                    piece_index: work.index,
                    offset: requested,
                    len: block_len,
                }))
                .await?;
                backlog += 1;
                requested += block_len;
            }

            let msg = stream
                .next()
                .await
                .ok_or_else(|| Error::Framing("connection closed mid-piece".into()))??;

            match msg {
                Message::KeepAlive => {}
                Message::Choke => {
                    self.is_choked = true;
                }
                Message::Unchoke => {
                    self.is_choked = false;
                }
                Message::Have { piece_index } => {
                    bitfield.set_piece(piece_index);
                }
                Message::Piece {
                    piece_index,
                    offset,
                    data,
                } => {
                    if piece_index != work.index {
                        return Err(Error::ProtocolViolation(format!(
                            "peer sent piece {} while we were downloading piece {}",
                            piece_index, work.index
                        )));
                    }
                    let start = offset as usize;
                    if start >= buf.len() {
                        return Err(Error::ProtocolViolation(format!(
                            "block offset {} out of bounds for piece {} of length {}",
                            start,
                            work.index,
                            buf.len()
                        )));
                    }
                    let end = start + data.len();
                    if end > buf.len() {
                        return Err(Error::ProtocolViolation(format!(
                            "block [{}, {}) out of bounds for piece {} of length {}",
                            start,
                            end,
                            work.index,
                            buf.len()
                        )));
                    }
                    buf[start..end].copy_from_slice(&data);
                    downloaded += data.len() as u32;
                    backlog = backlog.saturating_sub(1);
                }
                Message::Bitfield(_) => {
                    return Err(Error::ProtocolViolation(
                        "bitfield sent outside availability exchange".into(),
                    ));
                }
                Message::Request(_) | Message::Cancel(_) => {
                    // we never seed, so these have nothing to act on
                }
            }
        }

        log::debug!(
            "piece {} downloaded from {} in {:?}",
            work.index,
            self.addr,
            started_at.elapsed()
        );
        Ok(buf)
    }
}

