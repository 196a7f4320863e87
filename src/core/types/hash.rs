use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of a build artifact. Two builds are identical exactly when their hashes are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn digest(input: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input);
        let mut array = [0u8; 32];
        array.copy_from_slice(&hasher.finalize());
        Hash(array)
    }

    /// Hash the full contents of a file, e.g. a freshly linked binary.
    pub async fn of_file(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::digest(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_contents_give_equal_hashes() {
        let program = b"int main(void) { return 0; }";
        assert_eq!(Hash::digest(program), Hash::digest(program));
        assert_ne!(Hash::digest(program), Hash::digest(b"int main(void) { return 1; }"));
    }

    #[tokio::test]
    async fn file_hash_matches_digest_of_its_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.out");
        std::fs::write(&path, b"\x7fELF binary").unwrap();
        assert_eq!(Hash::of_file(&path).await.unwrap(), Hash::digest(b"\x7fELF binary"));
        assert!(Hash::of_file(&dir.path().join("missing")).await.is_err());
    }
}
