//! Cache key identifying one memoizable unit of work.

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

/// `(model, text, canonical params)` triple. Equality is exact on all three.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model: String,
    pub text: String,
    pub params: String,
}

impl CacheKey {
    /// Build a key from its parts; `params` must already be canonicalized
    pub fn new(model: impl Into<String>, text: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: text.into(),
            params: params.into(),
        }
    }

    /// Stable 64-bit digest used for shard routing
    pub fn digest(&self) -> u64 {
        let mut buf = String::with_capacity(self.model.len() + self.text.len() + self.params.len() + 2);
        buf.push_str(&self.model);
        buf.push('\0');
        buf.push_str(&self.text);
        buf.push('\0');
        buf.push_str(&self.params);
        xxh3_64(buf.as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?}, {:?})", self.model, self.text, self.params)
    }
}
