//! # Content Verification
//!
//! Incremental hashing over a cached file and comparison against the digest
//! the origin advertised.

use std::fmt;
use std::io::SeekFrom;

use crc::{CRC_64_XZ, Crc};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;

const VERIFY_CHUNK_SIZE: usize = 8 * 1024;

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Digest algorithms a validator header can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Crc32,
    Crc64,
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Size of the digest in bytes
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Crc32 => 4,
            HashAlgorithm::Crc64 => 8,
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    /// The algorithm whose digest has exactly `len` bytes
    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            4 => Some(HashAlgorithm::Crc32),
            8 => Some(HashAlgorithm::Crc64),
            16 => Some(HashAlgorithm::Md5),
            20 => Some(HashAlgorithm::Sha1),
            32 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn hasher(self) -> Box<dyn ContentHasher> {
        match self {
            HashAlgorithm::Crc32 => Box::new(Crc32Hasher(crc32fast::Hasher::new())),
            HashAlgorithm::Crc64 => Box::new(Crc64Hasher(CRC64.digest())),
            HashAlgorithm::Md5 => Box::new(DigestHasher(Md5::new())),
            HashAlgorithm::Sha1 => Box::new(DigestHasher(Sha1::new())),
            HashAlgorithm::Sha256 => Box::new(DigestHasher(Sha256::new())),
        }
    }

    /// One-shot digest of `data`
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize_reset()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Crc32 => "crc32",
            HashAlgorithm::Crc64 => "crc64",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        };
        f.write_str(name)
    }
}

/// Incremental hash state
pub trait ContentHasher: Send {
    fn update(&mut self, data: &[u8]);

    /// Produce the digest and return to the initial state
    fn finalize_reset(&mut self) -> Vec<u8>;

    fn reset(&mut self);
}

struct Crc32Hasher(crc32fast::Hasher);

impl ContentHasher for Crc32Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let hasher = std::mem::take(&mut self.0);
        hasher.finalize().to_be_bytes().to_vec()
    }

    fn reset(&mut self) {
        self.0.reset();
    }
}

struct Crc64Hasher(crc::Digest<'static, u64>);

impl ContentHasher for Crc64Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let digest = std::mem::replace(&mut self.0, CRC64.digest());
        digest.finalize().to_be_bytes().to_vec()
    }

    fn reset(&mut self) {
        self.0 = CRC64.digest();
    }
}

struct DigestHasher<D>(D);

impl<D: Digest + Send> ContentHasher for DigestHasher<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let digest = std::mem::replace(&mut self.0, D::new());
        digest.finalize().to_vec()
    }

    fn reset(&mut self) {
        self.0 = D::new();
    }
}

/// Hash `reader` from its start and compare against `expected`.
///
/// A digest that matches only after byte reversal also counts, since some
/// origins publish integer checksums in the opposite byte order. The reader
/// is rewound to the start before returning, whatever the outcome. I/O
/// errors and a wrong-sized `expected` yield `false`.
pub async fn verify_stream<R>(reader: &mut R, algorithm: HashAlgorithm, expected: &[u8]) -> bool
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    if expected.len() != algorithm.digest_len() {
        return false;
    }

    let result = hash_from_start(reader, algorithm).await;

    if let Err(e) = reader.seek(SeekFrom::Start(0)).await {
        debug!(error = %e, "Failed to rewind verified stream");
        return false;
    }

    match result {
        Ok(actual) => {
            actual == expected || actual.iter().rev().eq(expected.iter())
        }
        Err(e) => {
            debug!(%algorithm, error = %e, "Failed to hash cached content");
            false
        }
    }
}

async fn hash_from_start<R>(reader: &mut R, algorithm: HashAlgorithm) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    reader.seek(SeekFrom::Start(0)).await?;

    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; VERIFY_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_reset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_digest_len_table() {
        for algorithm in [
            HashAlgorithm::Crc32,
            HashAlgorithm::Crc64,
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
        ] {
            assert_eq!(
                HashAlgorithm::from_digest_len(algorithm.digest_len()),
                Some(algorithm)
            );
            assert_eq!(algorithm.digest(b"abc").len(), algorithm.digest_len());
        }
        assert_eq!(HashAlgorithm::from_digest_len(12), None);
        assert_eq!(HashAlgorithm::from_digest_len(0), None);
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hex::encode(HashAlgorithm::Md5.digest(b"")),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex::encode(HashAlgorithm::Sha1.digest(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex::encode(HashAlgorithm::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(HashAlgorithm::Crc32.digest(b"123456789")),
            "cbf43926"
        );
        assert_eq!(
            hex::encode(HashAlgorithm::Crc64.digest(b"123456789")),
            "995dc9bbdf1939fa"
        );
    }

    #[test]
    fn test_hasher_reset() {
        let mut hasher = HashAlgorithm::Sha256.hasher();
        hasher.update(b"garbage");
        hasher.reset();
        hasher.update(b"abc");
        assert_eq!(hasher.finalize_reset(), HashAlgorithm::Sha256.digest(b"abc"));

        // finalize_reset leaves a fresh state behind
        hasher.update(b"abc");
        assert_eq!(hasher.finalize_reset(), HashAlgorithm::Sha256.digest(b"abc"));
    }

    #[tokio::test]
    async fn test_verify_matches_and_rewinds() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = HashAlgorithm::Sha1.digest(&data);
        let mut cursor = Cursor::new(data.clone());

        assert!(verify_stream(&mut cursor, HashAlgorithm::Sha1, &expected).await);
        assert_eq!(cursor.position(), 0);

        let mut reread = Vec::new();
        cursor.read_to_end(&mut reread).await.unwrap();
        assert_eq!(reread, data);
    }

    #[tokio::test]
    async fn test_verify_accepts_reversed_digest() {
        let data = b"123456789".to_vec();
        let mut reversed = HashAlgorithm::Crc32.digest(&data);
        reversed.reverse();
        let mut cursor = Cursor::new(data);
        assert!(verify_stream(&mut cursor, HashAlgorithm::Crc32, &reversed).await);
    }

    #[tokio::test]
    async fn test_verify_mismatch_and_wrong_length() {
        let data = b"payload".to_vec();
        let mut cursor = Cursor::new(data.clone());
        let other = HashAlgorithm::Md5.digest(b"other payload");
        assert!(!verify_stream(&mut cursor, HashAlgorithm::Md5, &other).await);
        assert_eq!(cursor.position(), 0);

        let md5 = HashAlgorithm::Md5.digest(&data);
        assert!(!verify_stream(&mut cursor, HashAlgorithm::Sha256, &md5).await);
    }

    #[tokio::test]
    async fn test_verify_starts_from_beginning() {
        let data = b"seek me back".to_vec();
        let expected = HashAlgorithm::Sha256.digest(&data);
        let mut cursor = Cursor::new(data);
        cursor.set_position(5);
        assert!(verify_stream(&mut cursor, HashAlgorithm::Sha256, &expected).await);
    }
}
