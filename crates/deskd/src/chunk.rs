//! Batch chunking utility.
//!
//! Fleet batch APIs accept at most 50 instance IDs per call, so session
//! lists are processed in bounded chunks.

/// Default chunk size. Keep this at or below the fleet API batch limit.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Split `items` into batches of at most `size` elements, preserving order.
/// A zero `size` is treated as 1.
pub fn chunked<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}
