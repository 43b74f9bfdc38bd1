//! Package checksum policy.
//!
//! Journals declare a checksum for every deposit they send, and the staging
//! server computes a second one over the package it builds. Both go through
//! the same policy:
//!
//! - the algorithm label must be known and in the accepted set
//!   (SHA-1 and MD5 unless configured otherwise)
//! - the value must be hex of the algorithm's digest length
//! - values are compared and stored upper-cased

use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Read buffer for file digests.
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    #[serde(rename = "SHA-1")]
    Sha1,
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "SHA-1",
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Length of a digest in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha1 => 40,
            ChecksumAlgorithm::Md5 => 32,
            ChecksumAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    /// Accepts `sha1`, `SHA-1`, `sha-1`, `md5`, `MD5`, `sha256`, `SHA-256`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            _ => Err(ChecksumError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Checksum policy errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("Unknown checksum algorithm: {0:?}")]
    UnknownAlgorithm(String),

    #[error("Checksum algorithm {0} is not accepted")]
    NotAccepted(ChecksumAlgorithm),

    #[error("Malformed {algorithm} checksum: {value:?}")]
    Malformed {
        algorithm: ChecksumAlgorithm,
        value: String,
    },

    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("Size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Io(String),
}

/// Accepted algorithms and validation rules for source and package checksums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumPolicy {
    accepted: BTreeSet<ChecksumAlgorithm>,
}

impl Default for ChecksumPolicy {
    fn default() -> Self {
        Self::new([ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5])
    }
}

impl ChecksumPolicy {
    /// Create a policy accepting the given algorithms.
    pub fn new(accepted: impl IntoIterator<Item = ChecksumAlgorithm>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
        }
    }

    /// Build a policy from configured labels.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, ChecksumError> {
        let accepted = labels
            .iter()
            .map(|label| label.as_ref().parse())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { accepted })
    }

    /// Whether the algorithm is in the accepted set.
    pub fn accepts(&self, algorithm: ChecksumAlgorithm) -> bool {
        self.accepted.contains(&algorithm)
    }

    /// Accepted algorithms, in stable order.
    pub fn accepted(&self) -> impl Iterator<Item = ChecksumAlgorithm> + '_ {
        self.accepted.iter().copied()
    }

    /// Resolve a declared algorithm label against the accepted set.
    pub fn resolve(&self, label: &str) -> Result<ChecksumAlgorithm, ChecksumError> {
        let algorithm: ChecksumAlgorithm = label.parse()?;
        if !self.accepts(algorithm) {
            return Err(ChecksumError::NotAccepted(algorithm));
        }
        Ok(algorithm)
    }

    /// Validate a declared checksum, returning the algorithm and the
    /// canonical (upper-case) value.
    pub fn validate(&self, label: &str, value: &str) -> Result<(ChecksumAlgorithm, String), ChecksumError> {
        let algorithm = self.resolve(label)?;
        let value = value.trim();

        let well_formed =
            value.len() == algorithm.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(ChecksumError::Malformed {
                algorithm,
                value: value.to_string(),
            });
        }

        Ok((algorithm, value.to_ascii_uppercase()))
    }

    /// Compute the digest of a file. Returns the upper-case hex digest and
    /// the number of bytes read.
    pub fn digest_file(
        &self,
        algorithm: ChecksumAlgorithm,
        path: &Path,
    ) -> Result<(String, u64), ChecksumError> {
        if !self.accepts(algorithm) {
            return Err(ChecksumError::NotAccepted(algorithm));
        }

        let file = File::open(path)
            .map_err(|e| ChecksumError::Io(format!("{}: {}", path.display(), e)))?;
        let reader = BufReader::new(file);

        match algorithm {
            ChecksumAlgorithm::Sha1 => hash_reader::<sha1::Sha1, _>(reader),
            ChecksumAlgorithm::Md5 => hash_reader::<md5::Md5, _>(reader),
            ChecksumAlgorithm::Sha256 => hash_reader::<sha2::Sha256, _>(reader),
        }
        .map_err(|e| ChecksumError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Verify a file against a declared checksum (and optionally a declared
    /// size). Returns the file size on success.
    pub fn verify_file(
        &self,
        label: &str,
        expected: &str,
        expected_size: Option<u64>,
        path: &Path,
    ) -> Result<u64, ChecksumError> {
        let (algorithm, expected) = self.validate(label, expected)?;
        let (actual, size) = self.digest_file(algorithm, path)?;

        if let Some(expected_size) = expected_size {
            if expected_size != size {
                return Err(ChecksumError::SizeMismatch {
                    expected: expected_size,
                    actual: size,
                });
            }
        }

        if actual != expected {
            return Err(ChecksumError::Mismatch { expected, actual });
        }

        Ok(size)
    }
}

fn hash_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<(String, u64)> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; DIGEST_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((hex::encode_upper(hasher.finalize()), total))
}
