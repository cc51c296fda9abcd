//! Size-bounded streaming body reader.
//!
//! # Design Decisions
//! - Declared `Content-Length` above the limit fails before the first chunk
//! - The buffer never grows past the limit: a chunk that would overflow it
//!   fails the read instead of being copied
//! - A stream error (client gone, reset) aborts the read immediately

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;

/// Why a body could not be read in full.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("request body of {declared} bytes exceeds limit of {limit} bytes")]
    DeclaredTooLarge { declared: u64, limit: usize },

    #[error("request body exceeds limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body stream aborted: {0}")]
    Aborted(String),
}

/// Read a body stream into memory, failing once more than `limit` bytes arrive.
pub async fn read_limited<S, E>(
    mut stream: S,
    declared_length: Option<u64>,
    limit: usize,
) -> Result<Bytes, ReadError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    if let Some(declared) = declared_length {
        if declared > limit as u64 {
            return Err(ReadError::DeclaredTooLarge { declared, limit });
        }
    }

    let initial = declared_length
        .map(|len| len as usize)
        .unwrap_or(0)
        .min(limit);
    let mut buf: Vec<u8> = Vec::with_capacity(initial);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ReadError::Aborted(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(ReadError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buf))
}
