//! Chunking policy for oversized binary payloads.
//!
//! Payloads at or below [`MIN_SIZE_FOR_CHUNKS`] travel inline; anything
//! larger is split into [`CHUNK_SIZE`] pieces and moved through the
//! three-phase init/upload/finalize protocol.

pub const CHUNK_SIZE: usize = 100 * 1024;

pub const MIN_SIZE_FOR_CHUNKS: usize = 1024 * 1024;

pub fn should_use_chunks(size: usize) -> bool {
    size > MIN_SIZE_FOR_CHUNKS
}

pub fn chunk_count(size: usize, chunk_size: usize) -> usize {
    size.div_ceil(chunk_size)
}

/// Splits `data` into `chunk_size` pieces in index order; the last chunk
/// may be shorter. Exact inverse of [`merge_chunks`].
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

pub fn merge_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    for chunk in chunks {
        merged.extend_from_slice(chunk);
    }
    merged
}
