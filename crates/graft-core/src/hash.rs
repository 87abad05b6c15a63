use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

/// Streaming SHA-256 over a file's bytes, hex-encoded.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

/// Like [`hash_file`] but absent/unreadable files yield `None`.
///
/// The classifier treats a missing destination as "nothing on disk",
/// not as an error.
pub fn try_hash_file(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    hash_file(path).ok()
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(&hasher.finalize())
}

pub fn hash_string(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_string_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hash_string("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_and_bytes_digests_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.md");
        std::fs::write(&path, b"artifact body\n").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"artifact body\n"));
    }

    #[test]
    fn try_hash_file_returns_none_for_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_hash_file(&dir.path().join("absent")).is_none());
    }
}
