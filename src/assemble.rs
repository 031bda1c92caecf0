//! Integrity verification and placement of downloaded pieces into the
//! final output buffer.

use sha1::{Digest, Sha1};

use crate::info::PieceWork;

/// Verifies a downloaded piece's contents against its expected SHA-1 hash.
pub(crate) fn verify_piece(work: &PieceWork, buf: &[u8]) -> bool {
    let digest = Sha1::digest(buf);
    digest.as_slice() == work.hash
}

/// Copies a verified piece into its slot in the output buffer.
pub(crate) fn place_piece(buf: &mut [u8], offset: usize, piece: &[u8]) {
    buf[offset..offset + piece.len()].copy_from_slice(piece);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_piece_detects_mismatch() {
        let work = PieceWork {
            index: 0,
            hash: [0; 20],
            len: 4,
        };
        assert!(!verify_piece(&work, b"abcd"));
    }

    #[test]
    fn verify_piece_accepts_matching_hash() {
        let data = b"hello world!".to_vec();
        let hash: [u8; 20] = Sha1::digest(&data).into();
        let work = PieceWork {
            index: 0,
            hash,
            len: data.len() as u32,
        };
        assert!(verify_piece(&work, &data));
    }

    #[test]
    fn place_piece_copies_at_offset() {
        let mut buf = vec![0u8; 8];
        place_piece(&mut buf, 3, &[9, 9]);
        assert_eq!(buf, vec![0, 0, 0, 9, 9, 0, 0, 0]);
    }
}
