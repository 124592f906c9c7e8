//! Deferred-value cache policy (spec §3 "Caching policies", §4.I).

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Populate the cache once, reuse it on every later access.
    #[default]
    Values,
    /// Never cache; every access recomputes (useful to observe side effects
    /// in host functions).
    Nothing,
    /// Populate the cache, but also recompute on every later access and
    /// assert the two results are equal.
    Debug,
}

/// The cache slot embedded in every deferred cell. Starts `Empty` (the
/// sentinel-shaped "not yet computed" marker of spec §3) and is populated on
/// first successful resolution, per `policy`.
#[derive(Debug, Clone, Default)]
pub enum CacheSlot {
    #[default]
    Empty,
    Populated(Value),
}

impl CacheSlot {
    pub fn get(&self) -> Option<&Value> {
        match self {
            Self::Empty => None,
            Self::Populated(v) => Some(v),
        }
    }
}
