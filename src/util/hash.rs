//! Hashing utilities for snapshots and settings fingerprints.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Incremental hasher over several named components.
///
/// Every component is terminated by a NUL separator so that
/// `["ab", "c"]` and `["a", "bc"]` produce different fingerprints.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add a path component (lossy on non-UTF-8 paths).
    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.update_str(&path.to_string_lossy())
    }

    /// Add a boolean component.
    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Add every item of a list, prefixed with its length.
    pub fn update_list<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.update_str(&items.len().to_string());
        for item in items {
            self.update_str(item);
        }
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_file_matches_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.c");
        std::fs::write(&path, "int main(void) { return 0; }").unwrap();

        let from_file = sha256_file(&path).unwrap();
        let from_bytes = sha256_bytes(b"int main(void) { return 0; }");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_sha256_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = sha256_file(&tmp.path().join("gone.c")).unwrap_err();
        assert!(err.to_string().contains("failed to open file for hashing"));
    }

    #[test]
    fn test_list_components_are_separated() {
        let a = {
            let mut fp = Fingerprint::new();
            fp.update_list(["ab", "c"]);
            fp.finish()
        };
        let b = {
            let mut fp = Fingerprint::new();
            fp.update_list(["a", "bc"]);
            fp.finish()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_fingerprint_is_prefix() {
        let mut long = Fingerprint::new();
        long.update_str("Debug").update_bool(true);
        let mut short = Fingerprint::new();
        short.update_str("Debug").update_bool(true);

        let long = long.finish();
        let short = short.finish_short();
        assert_eq!(short.len(), 16);
        assert!(long.starts_with(&short));
    }
}
