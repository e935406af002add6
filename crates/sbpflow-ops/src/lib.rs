//! Operator contract: operand declaration, blob-desc inference, batch-dim inference
//! and SBP signature enumeration.

use std::collections::HashMap;

use sbpflow_core::BlobDesc;

pub mod conf;
pub mod error;
pub mod matmul;
pub mod normalization;
pub mod operator;
pub mod registry;
pub mod sbp;

pub use conf::*;
pub use error::{OpError, Result};
pub use matmul::MatmulOp;
pub use normalization::{NormalizationOp, ParamAction, ParamState};
pub use operator::{OpBindings, Operator};
pub use registry::{construct_op, OpCtor, OpRegistry};
pub use sbp::*;

/// Blob descs keyed by operand name.
pub type BlobDescMap = HashMap<String, BlobDesc>;

/// Batch-dimension flags keyed by operand name.
pub type HasBatchDimMap = HashMap<String, bool>;
