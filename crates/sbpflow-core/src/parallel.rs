use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Position of one worker among the workers that share a parallel operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelContext {
    pub parallel_id: usize,
    pub parallel_num: usize,
}

impl ParallelContext {
    pub fn new(parallel_id: usize, parallel_num: usize) -> Self {
        Self {
            parallel_id,
            parallel_num,
        }
    }

    pub fn single() -> Self {
        Self::new(0, 1)
    }
}

impl Default for ParallelContext {
    fn default() -> Self {
        Self::single()
    }
}

/// Splits `total` items into `parts` contiguous ranges whose sizes differ by at most one.
///
/// The first `total % parts` ranges receive the extra item.
#[derive(Clone, Copy, Debug)]
pub struct BalancedSplitter {
    total: usize,
    parts: usize,
}

impl BalancedSplitter {
    pub fn new(total: usize, parts: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(parts > 0, "cannot split {total} items into zero parts");
        Ok(Self { total, parts })
    }

    pub fn range(&self, idx: usize) -> Range<usize> {
        let base = self.total / self.parts;
        let rem = self.total % self.parts;
        let start = idx * base + idx.min(rem);
        let len = base + usize::from(idx < rem);
        start..start + len
    }
}
