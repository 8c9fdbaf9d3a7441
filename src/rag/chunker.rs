//! Overlapping fixed-size window chunker.
//!
//! Windows are measured in Unicode scalar values and advance by
//! `chunk_size - overlap` per step, so the same input and configuration
//! always produce the same boundaries. Re-ingesting a source therefore
//! regenerates the same chunk ids.

use sha2::{Digest, Sha256};

use super::store::Chunk;
use crate::errors::BotError;

/// Split `text` into overlapping windows. The final window may be shorter
/// than `chunk_size`; whitespace-only windows are dropped.
pub fn chunk_text(
    text: &str,
    source_ref: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, BotError> {
    if chunk_size == 0 {
        return Err(BotError::InvalidConfig(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(BotError::InvalidConfig(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        let window: String = chars[start..end].iter().collect();

        if !window.trim().is_empty() {
            chunks.push(Chunk {
                id: chunk_id(source_ref, start),
                text: window,
                source_ref: source_ref.to_string(),
                sequence_index: chunks.len(),
                start_offset: start,
                embedding: None,
            });
        }

        start += step;
    }

    Ok(chunks)
}

/// Stable id: hex SHA-256 over source and window offset.
fn chunk_id(source_ref: &str, start_offset: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_ref.as_bytes());
    hasher.update(b":");
    hasher.update(start_offset.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
