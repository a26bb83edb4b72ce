//! Streaming content digests.
//!
//! # Overview
//!
//! [`Hasher`] computes two kinds of digest:
//! - a cheap *partial* digest (XxHash64 over a small window) used only to
//!   split same-size buckets, and
//! - a *full* digest (BLAKE3 over the whole content) that confirms duplicates.
//!
//! Two files with equal full digests are treated as identical content.

use std::fs::File;
use std::hash::Hasher as _;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use super::HashError;
use crate::signal::CancelToken;

/// A full-content BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default partial digest window in bytes.
pub const DEFAULT_PARTIAL_WINDOW: usize = 4096;

/// Chunk size for streaming full-content reads.
const READ_CHUNK: usize = 64 * 1024;

/// Files at least this large get a tail sample under [`PartialStrategy::Spread`].
const SPREAD_TAIL_THRESHOLD: u64 = 1024 * 1024;

/// Files at least this large also get a middle sample under [`PartialStrategy::Spread`].
const SPREAD_MIDDLE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Which bytes feed the partial digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialStrategy {
    /// Only the first `window` bytes.
    #[default]
    Prefix,
    /// The first window, plus the last window for files >= 1 MiB, plus a
    /// middle window for files >= 10 MiB.
    Spread,
}

/// Digest calculator shared by all hashing workers of a job.
#[derive(Debug, Clone)]
pub struct Hasher {
    window: usize,
    strategy: PartialStrategy,
    cancel: Option<CancelToken>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with a 4 KiB prefix window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: DEFAULT_PARTIAL_WINDOW,
            strategy: PartialStrategy::Prefix,
            cancel: None,
        }
    }

    /// Set the partial digest window. Zero is raised to one byte.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Set the partial sampling strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: PartialStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Abort full-content reads between chunks once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configured partial window in bytes.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Compute the partial digest of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn partial_digest(&self, path: &Path) -> Result<u64, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut digest = XxHash64::with_seed(0);
        let mut buffer = vec![0u8; self.window];

        let n = read_window(&mut file, &mut buffer).map_err(|e| HashError::from_io(path, e))?;
        digest.write(&buffer[..n]);

        if self.strategy == PartialStrategy::Spread {
            let size = file
                .metadata()
                .map_err(|e| HashError::from_io(path, e))?
                .len();
            let window = self.window as u64;

            if size >= SPREAD_MIDDLE_THRESHOLD {
                let offset = (size / 2).saturating_sub(window / 2);
                self.sample_at(&mut file, path, offset, &mut buffer, &mut digest)?;
            }
            if size >= SPREAD_TAIL_THRESHOLD && size > window {
                self.sample_at(&mut file, path, size - window, &mut buffer, &mut digest)?;
            }
        }

        Ok(digest.finish())
    }

    fn sample_at(
        &self,
        file: &mut File,
        path: &Path,
        offset: u64,
        buffer: &mut [u8],
        digest: &mut XxHash64,
    ) -> Result<(), HashError> {
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| HashError::from_io(path, e))?;
        let n = read_window(file, buffer).map_err(|e| HashError::from_io(path, e))?;
        digest.write(&buffer[..n]);
        Ok(())
    }

    /// Compute the BLAKE3 digest of the entire content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Interrupted`] if the cancel token trips between
    /// chunks, or another [`HashError`] if the file cannot be read.
    pub fn full_digest(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut digest = blake3::Hasher::new();
        let mut buffer = vec![0u8; READ_CHUNK];

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            digest.update(&buffer[..n]);
        }

        Ok(*digest.finalize().as_bytes())
    }
}

/// Fill `buffer` as far as the file allows; returns the byte count.
fn read_window(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Hash as lowercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}
