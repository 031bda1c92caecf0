//! The piece scheduler: hands out [`PieceWork`] to one session per peer,
//! collects verified [`PieceResult`]s, and assembles them into the final
//! buffer.
//!
//! The work queue is pre-filled with every piece up front (there is no
//! rarest-first selection or endgame mode); a session that can't make
//! progress on a piece puts it back and either tries another or gives up
//! entirely, letting the remaining sessions pick up the slack.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::assemble::place_piece;
use crate::conf::Conf;
use crate::info::{PieceResult, TorrentInfo};
use crate::peer::PeerSession;
use crate::reporter::{PieceProgress, Reporter};
use crate::{Error, Result};

pub(crate) async fn run(
    info: &TorrentInfo,
    peers: &[SocketAddr],
    conf: &Conf,
    reporter: &(impl Reporter + Sync),
) -> Result<Vec<u8>> {
    if peers.is_empty() {
        return Err(Error::NoPeers);
    }

    let info = Arc::new(info.clone());
    let torrent_conf = Arc::new(conf.torrent);
    let piece_count = info.piece_count();

    let all_pieces = info.all_pieces()?;
    let (work_tx, work_rx) = async_channel::bounded(piece_count);
    for piece in all_pieces {
        // never blocks: the channel's capacity is exactly `piece_count`
        work_tx
            .send(piece)
            .await
            .map_err(|_| Error::ChannelClosed)?;
    }

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();

    let mut sessions = Vec::with_capacity(peers.len());
    for &addr in peers {
        let session = PeerSession::new(
            addr,
            Arc::clone(&info),
            Arc::clone(&torrent_conf),
            conf.engine.client_id,
        );
        // both ends of `async_channel` are cheap, lock-free clones: every
        // session gets its own handle, and none of them ever blocks the
        // others out of the queue the way a mutex-guarded receiver would.
        let work_tx = work_tx.clone();
        let work_rx = work_rx.clone();
        let results_tx = results_tx.clone();
        sessions.push(tokio::spawn(async move {
            if let Err(e) = session.run(work_tx, work_rx, results_tx).await {
                log::warn!("peer {} session ended: {}", addr, e);
            }
        }));
    }
    // drop our own handles so the channels close once every session task
    // has dropped theirs
    drop(work_tx);
    drop(results_tx);

    let mut buf = vec![0u8; info.total_len() as usize];
    let mut done_pieces = 0usize;

    while done_pieces < piece_count {
        let PieceResult { index, buf: piece_buf } = match results_rx.recv().await {
            Some(result) => result,
            None => {
                return Err(Error::Exhausted {
                    done: done_pieces,
                    total: piece_count,
                });
            }
        };

        let offset = info.piece_offset(index) as usize;
        place_piece(&mut buf, offset, &piece_buf);
        done_pieces += 1;

        let percent = done_pieces as f64 / piece_count as f64 * 100.0;
        reporter.on_piece(PieceProgress {
            index,
            done_pieces,
            piece_count,
            percent,
        });
    }

    // every piece is accounted for: close the work queue so sessions
    // parked in `recv()` on an empty, still-open queue wake with `Err` and
    // exit; a session mid-piece finishes or times out before it next
    // checks the queue. Closing needs no lock: every session holds its own
    // clone of the same channel.
    work_rx.close();
    for session in sessions {
        let _ = session.await;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;

    #[tokio::test]
    async fn rejects_empty_peer_list() {
        let info = crate::info::TorrentInfo::new([0; 20], [0; 20], vec![[1; 20]], 10, 10, "x".into())
            .unwrap();
        let err = run(&info, &[], &Conf::default(), &NullReporter).await;
        assert!(err.is_err());
    }
}
