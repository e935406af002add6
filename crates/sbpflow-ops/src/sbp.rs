//! SBP signatures: how each operand of an operator is laid out across parallel workers.
//!
//! An operand is either split along one axis ([`SbpParallel::Split`]), replicated on
//! every worker ([`SbpParallel::Broadcast`]), or held as per-worker partial values
//! whose element-wise sum is the logical tensor ([`SbpParallel::PartialSum`]).
//!
//! Signatures are built once with [`SbpSignatureBuilder`] and are read-only after
//! that; [`check_sbp_signature`] validates one against the operator's logical blob
//! descriptors.

use std::collections::BTreeMap;
use std::fmt;

use sbpflow_core::{BalancedSplitter, BlobDesc, ParallelContext};
use serde::{Deserialize, Serialize};

use crate::error::{OpError, Result};
use crate::BlobDescMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SbpParallel {
    Split(usize),
    Broadcast,
    PartialSum,
}

impl fmt::Display for SbpParallel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SbpParallel::Split(axis) => write!(f, "S({axis})"),
            SbpParallel::Broadcast => write!(f, "B"),
            SbpParallel::PartialSum => write!(f, "P"),
        }
    }
}

/// One legal layout assignment for every input and output of an operator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SbpSignature {
    bn2sbp: BTreeMap<String, SbpParallel>,
}

impl SbpSignature {
    pub fn get(&self, bn: &str) -> Option<SbpParallel> {
        self.bn2sbp.get(bn).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SbpParallel)> {
        self.bn2sbp.iter().map(|(bn, sbp)| (bn.as_str(), *sbp))
    }

    pub fn len(&self) -> usize {
        self.bn2sbp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bn2sbp.is_empty()
    }

    /// Descs of the shards the worker at `parallel_ctx` holds under this signature.
    ///
    /// Split operands get their balanced share of the split axis and must have a
    /// logical desc. Broadcast and partial-sum operands keep the logical shape and
    /// are left out when their desc is unknown.
    pub fn shard_descs(
        &self,
        logical: &BlobDescMap,
        parallel_ctx: &ParallelContext,
    ) -> Result<BlobDescMap> {
        let mut shards = BlobDescMap::with_capacity(self.len());
        for (bn, sbp) in self.iter() {
            let desc = match (logical.get(bn), sbp) {
                (Some(desc), _) => desc,
                (None, SbpParallel::Split(_)) => {
                    return Err(OpError::MissingBlob(bn.to_string()));
                }
                (None, _) => continue,
            };
            let mut shard = desc.clone();
            if let SbpParallel::Split(axis) = sbp {
                let extent = desc.shape.at(axis).ok_or_else(|| OpError::InvalidAxis {
                    bn: bn.to_string(),
                    axis,
                    rank: desc.shape.rank(),
                })?;
                let splitter = BalancedSplitter::new(extent, parallel_ctx.parallel_num)
                    .map_err(|e| OpError::InvalidSignature(e.to_string()))?;
                shard.shape.0[axis] = splitter.range(parallel_ctx.parallel_id).len();
            }
            shards.insert(bn.to_string(), shard);
        }
        Ok(shards)
    }
}

impl fmt::Display for SbpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (bn, sbp)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{bn}: {sbp}")?;
        }
        write!(f, "}}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SbpSignatureList {
    signatures: Vec<SbpSignature>,
}

impl SbpSignatureList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signature: SbpSignature) {
        self.signatures.push(signature);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SbpSignature> {
        self.signatures.iter()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl<'a> IntoIterator for &'a SbpSignatureList {
    type Item = &'a SbpSignature;
    type IntoIter = std::slice::Iter<'a, SbpSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}

impl FromIterator<SbpSignature> for SbpSignatureList {
    fn from_iter<I: IntoIterator<Item = SbpSignature>>(iter: I) -> Self {
        Self {
            signatures: iter.into_iter().collect(),
        }
    }
}

/// A builder for an [`SbpSignature`].
///
/// Later calls overwrite earlier ones for the same operand, so the usual pattern is
/// to broadcast whole operand groups first and then carve out the split operands:
///
/// ```
/// use sbpflow_ops::{SbpParallel, SbpSignatureBuilder};
///
/// let sig = SbpSignatureBuilder::new()
///     .broadcast(["in", "gamma"])
///     .broadcast(["out"])
///     .split("in", 0)
///     .split("out", 0)
///     .build();
/// assert_eq!(sig.get("gamma"), Some(SbpParallel::Broadcast));
/// assert_eq!(sig.get("in"), Some(SbpParallel::Split(0)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SbpSignatureBuilder {
    bn2sbp: BTreeMap<String, SbpParallel>,
}

impl SbpSignatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn split(mut self, bn: impl Into<String>, axis: usize) -> Self {
        self.bn2sbp.insert(bn.into(), SbpParallel::Split(axis));
        self
    }

    pub fn broadcast<I, S>(self, bns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assign(bns, SbpParallel::Broadcast)
    }

    pub fn partial_sum<I, S>(self, bns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assign(bns, SbpParallel::PartialSum)
    }

    pub fn build(self) -> SbpSignature {
        SbpSignature {
            bn2sbp: self.bn2sbp,
        }
    }

    fn assign<I, S>(mut self, bns: I, sbp: SbpParallel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for bn in bns {
            self.bn2sbp.insert(bn.into(), sbp);
        }
        self
    }
}

/// Validates one signature of an operator whose inputs and outputs are `bns`.
///
/// The signature must cover exactly `bns`, every split axis must be within the
/// operand's rank, the split extents must be large enough for `parallel_num`
/// workers to each get a non-empty shard, and all split operands must agree on the
/// extent of their split axis so that shard `i` of one operand lines up with shard
/// `i` of every other.
pub fn check_sbp_signature(
    signature: &SbpSignature,
    bns: &[&str],
    logical: &BlobDescMap,
    parallel_num: usize,
) -> Result<()> {
    if parallel_num == 0 {
        return Err(OpError::InvalidSignature(
            "parallel_num must be positive".to_string(),
        ));
    }
    for bn in bns {
        if signature.get(bn).is_none() {
            return Err(OpError::InvalidSignature(format!(
                "`{bn}` missing from {signature}"
            )));
        }
    }
    if let Some((extra, _)) = signature.iter().find(|(bn, _)| !bns.contains(bn)) {
        return Err(OpError::InvalidSignature(format!(
            "`{extra}` is not an input or output"
        )));
    }

    let mut split_extent: Option<(&str, usize)> = None;
    for (bn, sbp) in signature.iter() {
        let SbpParallel::Split(axis) = sbp else {
            continue;
        };
        let desc = logical_desc(logical, bn)?;
        let extent = desc.shape.at(axis).ok_or_else(|| OpError::InvalidAxis {
            bn: bn.to_string(),
            axis,
            rank: desc.shape.rank(),
        })?;
        if extent < parallel_num {
            return Err(OpError::InvalidSignature(format!(
                "`{bn}` has extent {extent} on axis {axis}, fewer than {parallel_num} workers"
            )));
        }
        match split_extent {
            None => split_extent = Some((bn, extent)),
            Some((first, first_extent)) if first_extent != extent => {
                return Err(OpError::InvalidSignature(format!(
                    "split extents disagree: `{first}` has {first_extent}, `{bn}` has {extent}"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn logical_desc<'a>(logical: &'a BlobDescMap, bn: &str) -> Result<&'a BlobDesc> {
    logical
        .get(bn)
        .ok_or_else(|| OpError::MissingBlob(bn.to_string()))
}
