//! Batch-normalization style operator.
//!
//! The primary input `in` and output `out` share a descriptor. The parameter
//! operands (`moving_mean`, `moving_variance`, `gamma`, `beta`) and, in training,
//! the statistic outputs (`mean`, `inv_variance`) all have shape
//! `[in.shape[axis]]`. Parameters supplied by the configuration are checked
//! against that shape; the others are set to it.

use sbpflow_core::{BlobDesc, OperandRole, ParallelContext, Shape};
use tracing::debug;

use crate::conf::{NormalizationConf, OpTypeConf, OperatorConf, CUDNN_BN_MIN_EPSILON};
use crate::error::{OpError, Result};
use crate::operator::{required_desc, required_flag, OpBindings, Operator};
use crate::sbp::{SbpSignatureBuilder, SbpSignatureList};
use crate::{BlobDescMap, HasBatchDimMap};

/// Axis along which `in` and `out` may be split.
const BATCH_AXIS: usize = 0;

const STAT_BNS: [&str; 2] = ["mean", "inv_variance"];

/// Where a parameter operand comes from, decided once at initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamState {
    /// Provided by the configuration as an input.
    Supplied,
    /// Not provided; the operator owns it and initializes its descriptor.
    ToInitialize,
}

/// What inference does with a parameter operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamAction {
    Check,
    Set,
}

impl From<ParamState> for ParamAction {
    fn from(state: ParamState) -> Self {
        match state {
            ParamState::Supplied => ParamAction::Check,
            ParamState::ToInitialize => ParamAction::Set,
        }
    }
}

#[derive(Debug)]
pub struct NormalizationOp {
    op_conf: OperatorConf,
    conf: NormalizationConf,
    bindings: OpBindings,
    param_actions: Vec<(&'static str, ParamAction)>,
}

impl NormalizationOp {
    pub fn init_from_op_conf(op_conf: OperatorConf) -> Result<Self> {
        let OpTypeConf::Normalization(conf) = &op_conf.op_type else {
            return Err(OpError::InvalidConfig(format!(
                "`{}` is not a normalization conf",
                op_conf.name
            )));
        };
        let conf = conf.clone();
        let uses_cudnn = op_conf.dev_is_gpu_and_enable_cudnn();

        if uses_cudnn && conf.epsilon < CUDNN_BN_MIN_EPSILON {
            return Err(OpError::InvalidConfig(format!(
                "epsilon {} is below the cuDNN minimum {CUDNN_BN_MIN_EPSILON}",
                conf.epsilon
            )));
        }
        // Written so that NaN fails too.
        if !(0.0..=1.0).contains(&conf.momentum) {
            return Err(OpError::InvalidConfig(format!(
                "momentum {} must lie in [0, 1]",
                conf.momentum
            )));
        }

        let mut bindings = OpBindings::new();
        bindings.enroll_input("in")?;
        bindings.enroll_output("out", true)?;

        let mut param_actions = Vec::with_capacity(4);
        for (bn, supplied) in [
            ("moving_mean", conf.moving_mean.is_some()),
            ("moving_variance", conf.moving_variance.is_some()),
        ] {
            let state = if supplied {
                let binding = bindings.enroll_input(bn)?;
                if conf.is_training {
                    binding.role = OperandRole::Mutable;
                }
                ParamState::Supplied
            } else {
                bindings.enroll_tmp(bn)?;
                ParamState::ToInitialize
            };
            param_actions.push((bn, state.into()));
        }
        for (bn, supplied) in [("gamma", conf.gamma.is_some()), ("beta", conf.beta.is_some())] {
            let state = if supplied {
                bindings.enroll_input(bn)?.role = OperandRole::Mutable;
                ParamState::Supplied
            } else if uses_cudnn {
                bindings.enroll_const_buf(bn)?;
                ParamState::ToInitialize
            } else {
                return Err(OpError::Unimplemented(format!(
                    "`{bn}` must be supplied unless running on GPU with cuDNN"
                )));
            };
            param_actions.push((bn, state.into()));
        }
        if conf.is_training {
            for bn in STAT_BNS {
                bindings.enroll_output(bn, false)?;
            }
        }

        debug!(
            op = %op_conf.name,
            uses_cudnn,
            is_training = conf.is_training,
            "normalization initialized"
        );
        Ok(Self {
            op_conf,
            conf,
            bindings,
            param_actions,
        })
    }

    pub fn conf(&self) -> &NormalizationConf {
        &self.conf
    }

    pub fn param_action(&self, bn: &str) -> Option<ParamAction> {
        self.param_actions
            .iter()
            .find(|(name, _)| *name == bn)
            .map(|(_, action)| *action)
    }

    fn apply_param_action(
        &self,
        bn: &str,
        action: ParamAction,
        expected: &BlobDesc,
        blob_descs: &mut BlobDescMap,
    ) -> Result<()> {
        match action {
            ParamAction::Check => {
                if let Some(actual) = blob_descs.get(bn) {
                    if actual != expected {
                        return Err(OpError::DescMismatch {
                            bn: bn.to_string(),
                            expected: expected.to_string(),
                            actual: actual.to_string(),
                        });
                    }
                }
            }
            ParamAction::Set => {
                if self.bindings.contains(bn) {
                    blob_descs.insert(bn.to_string(), expected.clone());
                }
            }
        }
        Ok(())
    }
}

impl Operator for NormalizationOp {
    fn op_conf(&self) -> &OperatorConf {
        &self.op_conf
    }

    fn bindings(&self) -> &OpBindings {
        &self.bindings
    }

    fn infer_blob_descs(
        &self,
        blob_descs: &mut BlobDescMap,
        _parallel_ctx: &ParallelContext,
    ) -> Result<()> {
        let input = required_desc(blob_descs, "in")?.clone();
        let extent = input
            .shape
            .at(self.conf.axis)
            .ok_or_else(|| OpError::InvalidAxis {
                bn: "in".to_string(),
                axis: self.conf.axis,
                rank: input.shape.rank(),
            })?;
        let param = BlobDesc::new(input.data_type, Shape::from_slice(&[extent]));
        blob_descs.insert("out".to_string(), input);

        for &(bn, action) in &self.param_actions {
            self.apply_param_action(bn, action, &param, blob_descs)?;
        }
        if self.conf.is_training {
            for bn in STAT_BNS {
                self.apply_param_action(bn, ParamAction::Set, &param, blob_descs)?;
            }
        }
        Ok(())
    }

    fn infer_has_batch_dim(&self, has_batch_dim: &mut HasBatchDimMap) -> Result<()> {
        let input = required_flag(has_batch_dim, "in")?;
        has_batch_dim.insert("out".to_string(), input);
        for bn in STAT_BNS {
            if self.bindings.contains(bn) {
                has_batch_dim.insert(bn.to_string(), false);
            }
        }
        Ok(())
    }

    fn get_sbp_signatures(&self, _logical: &BlobDescMap) -> Result<SbpSignatureList> {
        let signature = SbpSignatureBuilder::new()
            .broadcast(self.input_bns())
            .broadcast(self.output_bns())
            .split("in", BATCH_AXIS)
            .split("out", BATCH_AXIS)
            .build();
        Ok(SbpSignatureList::from_iter([signature]))
    }
}
