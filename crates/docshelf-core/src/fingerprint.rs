//! Content fingerprints and path-derived document ids.
//!
//! A fingerprint is the blake3 digest of the raw file bytes, independent
//! of the path; it drives change detection and rename/dedup resolution.
//! A document id is derived from the canonical path string at first
//! sight and stays stable afterwards.

use crate::types::DocId;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Fingerprint of an in-memory byte slice.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fingerprint of a file's contents, read in 1 MiB chunks.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Derive the stable id for a path: the first 8 bytes of the blake3
/// digest of the path string, big-endian.
pub fn doc_id_for_path(path: &Path) -> DocId {
    let digest = blake3::hash(path.to_string_lossy().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    DocId(u64::from_be_bytes(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn same_bytes_same_fingerprint() {
        assert_eq!(fingerprint_bytes(b"invoice march"), fingerprint_bytes(b"invoice march"));
        assert_ne!(fingerprint_bytes(b"invoice march"), fingerprint_bytes(b"invoice april"));
    }

    #[test]
    fn file_fingerprint_matches_byte_fingerprint() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("doc.txt");
        fs::write(&path, b"vacation photo").expect("write");
        assert_eq!(
            fingerprint_file(&path).expect("fingerprint"),
            fingerprint_bytes(b"vacation photo")
        );
    }

    #[test]
    fn path_ids_are_stable_and_distinct() {
        let a = doc_id_for_path(Path::new("/lib/a.pdf"));
        assert_eq!(a, doc_id_for_path(Path::new("/lib/a.pdf")));
        assert_ne!(a, doc_id_for_path(Path::new("/lib/b.pdf")));
    }
}
