//! # Gap Range
//!
//! Bounds of the random pause the stress driver takes between one
//! acknowledged transaction and the next purchase.
//!
//! ```text
//!   ok ──► [ sleep uniform(min_ms ..= max_ms) ] ──► next purchase
//! ```
//!
//! Sampling needs a random source, so it lives in the harness; this type
//! only guards the invariant `0 < min_ms <= max_ms`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::{DEFAULT_MAX_GAP_MS, DEFAULT_MIN_GAP_MS};

/// Inclusive millisecond bounds for the inter-transaction gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRange {
    min_ms: u64,
    max_ms: u64,
}

impl Default for GapRange {
    fn default() -> Self {
        GapRange {
            min_ms: DEFAULT_MIN_GAP_MS,
            max_ms: DEFAULT_MAX_GAP_MS,
        }
    }
}

impl GapRange {
    /// Creates a range, rejecting zero or inverted bounds.
    pub fn new(min_ms: u64, max_ms: u64) -> CoreResult<Self> {
        if min_ms == 0 || max_ms == 0 || min_ms > max_ms {
            return Err(CoreError::InvalidGapRange { min_ms, max_ms });
        }
        Ok(GapRange { min_ms, max_ms })
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    /// Returns a copy with a new lower bound.
    ///
    /// Fails (leaving `self` untouched) when the new bound would exceed the
    /// current upper bound.
    pub fn with_min_ms(&self, min_ms: u64) -> CoreResult<Self> {
        GapRange::new(min_ms, self.max_ms)
    }

    /// Returns a copy with a new upper bound.
    pub fn with_max_ms(&self, max_ms: u64) -> CoreResult<Self> {
        GapRange::new(self.min_ms, max_ms)
    }

    /// True when the range collapses to a single value.
    pub fn is_fixed(&self) -> bool {
        self.min_ms == self.max_ms
    }
}
