//! Progress reporting: an injected observer the scheduler calls once per
//! completed piece, so the caller can drive a progress bar, a metrics
//! counter, or nothing at all without the scheduler knowing or caring.

use crate::PieceIndex;

/// A snapshot of download progress, reported once a piece has been
/// verified and placed into the output buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PieceProgress {
    /// The piece that just completed.
    pub index: PieceIndex,
    /// How many pieces have completed so far, including this one.
    pub done_pieces: usize,
    /// The total number of pieces in the torrent.
    pub piece_count: usize,
    /// `done_pieces / piece_count * 100`, precomputed for convenience.
    pub percent: f64,
}

/// Receives progress notifications from [`crate::download`].
///
/// Implementations are called synchronously from the scheduler's result
/// loop; a reporter that blocks stalls the whole download, so keep
/// `on_piece` cheap (log, update a counter, send on a channel) rather than
/// doing I/O inline.
pub trait Reporter {
    fn on_piece(&self, progress: PieceProgress);
}

/// A reporter that does nothing, for callers that don't need progress
/// feedback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_piece(&self, _progress: PieceProgress) {}
}

/// A reporter that logs one line per completed piece at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_piece(&self, progress: PieceProgress) {
        log::info!(
            "downloaded piece {} ({}/{}, {:.2}%)",
            progress.index,
            progress.done_pieces,
            progress.piece_count,
            progress.percent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn null_reporter_is_a_no_op() {
        let reporter = NullReporter;
        reporter.on_piece(PieceProgress {
            index: 0,
            done_pieces: 1,
            piece_count: 1,
            percent: 100.0,
        });
    }

    #[test]
    fn reporter_trait_object_is_callable() {
        struct Counting(AtomicUsize);
        impl Reporter for Counting {
            fn on_piece(&self, _progress: PieceProgress) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let reporter = Counting(AtomicUsize::new(0));
        reporter.on_piece(PieceProgress {
            index: 0,
            done_pieces: 1,
            piece_count: 2,
            percent: 50.0,
        });
        assert_eq!(reporter.0.load(Ordering::SeqCst), 1);
    }
}
