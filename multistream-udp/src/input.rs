//! Input loading for the client side.
//!
//! Reads one file and divides it into per-stream payloads.  Every stream gets
//! `len / n` bytes; the last stream also takes the remainder.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be opened or read.
    #[error("input file {path} could not be read: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read the whole file at `path`.
pub fn read_payload(path: impl AsRef<Path>) -> Result<Vec<u8>, InputError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| InputError::Missing {
        path: path.to_path_buf(),
        source,
    })
}

/// Split `data` into `n` consecutive parts.
///
/// Returns an empty list when `n` is zero.  When `data` is shorter than `n`,
/// the leading parts are empty.
pub fn split_even(data: &[u8], n: usize) -> Vec<Vec<u8>> {
    if n == 0 {
        return Vec::new();
    }
    let chunk = data.len() / n;
    (0..n)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 < n { start + chunk } else { data.len() };
            data[start..end].to_vec()
        })
        .collect()
}

/// Read `path` and return `(stream_id, payload)` pairs for streams `1..=n`.
pub fn load_streams(path: impl AsRef<Path>, n: usize) -> Result<Vec<(u32, Vec<u8>)>, InputError> {
    let data = read_payload(path)?;
    Ok(split_even(&data, n)
        .into_iter()
        .zip(1u32..)
        .map(|(part, id)| (id, part))
        .collect())
}
