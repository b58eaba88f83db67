//! Result of transforming two concurrent operation sequences.

use serde::{Deserialize, Serialize};

/// Which side wins when a pair of operations cannot be transformed cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictResolution {
    Left,
    Right,
}

impl ConflictResolution {
    #[inline]
    #[must_use]
    pub fn mirrored(self) -> Self {
        match self {
            ConflictResolution::Left => ConflictResolution::Right,
            ConflictResolution::Right => ConflictResolution::Left,
        }
    }
}

/// Residuals of a transform.
///
/// `left_ops` is what the left branch applies to converge, `right_ops` what
/// the right branch applies. With a conflict set, exactly one side carries
/// the resolution and the other is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult<O> {
    pub conflict_resolution: Option<ConflictResolution>,
    pub left_ops: Vec<O>,
    pub right_ops: Vec<O>,
}

impl<O> TransformResult<O> {
    pub fn new(
        conflict_resolution: Option<ConflictResolution>,
        left_ops: Vec<O>,
        right_ops: Vec<O>,
    ) -> Self {
        Self {
            conflict_resolution,
            left_ops,
            right_ops,
        }
    }

    pub fn of(left_ops: Vec<O>, right_ops: Vec<O>) -> Self {
        Self::new(None, left_ops, right_ops)
    }

    pub fn left(left_ops: Vec<O>) -> Self {
        Self::new(None, left_ops, Vec::new())
    }

    pub fn right(right_ops: Vec<O>) -> Self {
        Self::new(None, Vec::new(), right_ops)
    }

    pub fn empty() -> Self {
        Self::new(None, Vec::new(), Vec::new())
    }

    /// A transformer declaring that the pair cannot be merged; the system
    /// replaces the losing side's effect.
    pub fn conflict(resolution: ConflictResolution) -> Self {
        Self::new(Some(resolution), Vec::new(), Vec::new())
    }

    #[inline]
    #[must_use]
    pub fn has_conflict(&self) -> bool {
        self.conflict_resolution.is_some()
    }

    /// Exchange the two sides, mirroring a declared conflict.
    #[must_use]
    pub fn swapped(self) -> Self {
        Self {
            conflict_resolution: self.conflict_resolution.map(ConflictResolution::mirrored),
            left_ops: self.right_ops,
            right_ops: self.left_ops,
        }
    }
}
