//! A bencode-backed `.torrent` descriptor, used only by tests to build a
//! [`crate::info::TorrentInfo`] from raw metainfo bytes. `download()` itself
//! never parses bencode; a full client would do that upstream of this
//! crate and hand `TorrentInfo` in directly.

use crate::{error::Result as CrateResult, info::TorrentInfo, PeerId, Sha1Hash};
use serde_bencode::Error;
use sha1::{Digest, Sha1};

#[derive(Debug, Deserialize)]
pub struct Metainfo {
    pub info: Info,
}

impl Metainfo {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        serde_bencode::from_bytes(buf)
    }

    pub fn create_info_hash(&self) -> Result<Sha1Hash, Error> {
        let info = serde_bencode::to_bytes(&self.info)?;
        let digest = Sha1::digest(&info);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&digest);
        Ok(info_hash)
    }

    /// Builds a [`TorrentInfo`] for a single-file torrent. Multi-file
    /// torrents (`info.files`) are out of scope and rejected.
    pub fn to_torrent_info(&self, peer_id: PeerId) -> CrateResult<TorrentInfo> {
        if self.info.files.is_some() {
            return Err(crate::Error::InvalidDescriptor(
                "multi-file torrents are not supported".into(),
            ));
        }
        let info_hash = self.create_info_hash()?;
        let piece_hashes = self
            .info
            .pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        let total_len = self.info.length.unwrap_or(0) as u64;
        TorrentInfo::new(
            info_hash,
            peer_id,
            piece_hashes,
            self.info.piece_length as u32,
            total_len,
            self.info.name.clone(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,
    #[serde(rename = "piece length")]
    pub piece_length: u64,
    pub length: Option<u64>,
    pub files: Option<Vec<File>>,
    pub private: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct File {
    pub path: Vec<String>,
    pub length: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file_metainfo() -> Metainfo {
        Metainfo {
            info: Info {
                name: "test.bin".into(),
                pieces: vec![7u8; 40], // two arbitrary 20 byte hashes
                piece_length: 16384,
                length: Some(16384 + 100),
                files: None,
                private: None,
            },
        }
    }

    #[test]
    fn to_torrent_info_builds_a_valid_descriptor() {
        let metainfo = single_file_metainfo();
        let info = metainfo.to_torrent_info([1; 20]).unwrap();
        assert_eq!(info.piece_count(), 2);
        assert_eq!(info.total_len(), 16384 + 100);
        assert_eq!(info.name, "test.bin");
    }

    #[test]
    fn to_torrent_info_rejects_multi_file() {
        let mut metainfo = single_file_metainfo();
        metainfo.info.files = Some(vec![File {
            path: vec!["a".into()],
            length: 10,
        }]);
        assert!(metainfo.to_torrent_info([1; 20]).is_err());
    }
}