//! Key-to-path transforms
//!
//! A transform maps a key to the directory segments the record lives
//! under, spreading records across the filesystem.

use std::sync::Arc;

/// Caller-supplied mapping from key to directory segments
pub type KeyTransform = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Directory used for keys too short to shard
pub const SMALL_BUCKET: &str = "__small";

const BLOCKS: usize = 2;
const BLOCK_WIDTH: usize = 2;

/// Two levels of two-character directories taken from the key
///
/// Only the part after the last `:` is used, so a shared namespace prefix
/// does not collapse every record into one directory. Sources shorter than
/// four characters go to [`SMALL_BUCKET`] at every level.
pub fn block_transform(key: &str) -> Vec<String> {
    let source = key.rsplit(':').next().unwrap_or(key);
    let chars: Vec<char> = source.chars().collect();

    if chars.len() < BLOCKS * BLOCK_WIDTH {
        return vec![SMALL_BUCKET.to_string(); BLOCKS];
    }

    chars
        .chunks(BLOCK_WIDTH)
        .take(BLOCKS)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
