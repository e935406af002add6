use std::collections::HashMap;

use sbpflow_core::{BlobDesc, OperandBinding, OperandRole, ParallelContext};

use crate::error::{OpError, Result};
use crate::sbp::{check_sbp_signature, SbpSignatureList};
use crate::{BlobDescMap, HasBatchDimMap, OperatorConf};

/// Operands an operator declared during initialization, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct OpBindings {
    bindings: Vec<OperandBinding>,
    index: HashMap<String, usize>,
}

impl OpBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll_input(&mut self, bn: &str) -> Result<&mut OperandBinding> {
        self.enroll(OperandBinding::new(bn, OperandRole::Input))
    }

    pub fn enroll_output(&mut self, bn: &str, has_diff: bool) -> Result<&mut OperandBinding> {
        let mut binding = OperandBinding::new(bn, OperandRole::Output);
        binding.has_diff = has_diff;
        self.enroll(binding)
    }

    pub fn enroll_const_buf(&mut self, bn: &str) -> Result<&mut OperandBinding> {
        let mut binding = OperandBinding::new(bn, OperandRole::ConstBuf);
        binding.has_diff = false;
        self.enroll(binding)
    }

    pub fn enroll_tmp(&mut self, bn: &str) -> Result<&mut OperandBinding> {
        let mut binding = OperandBinding::new(bn, OperandRole::Tmp);
        binding.has_diff = false;
        self.enroll(binding)
    }

    fn enroll(&mut self, binding: OperandBinding) -> Result<&mut OperandBinding> {
        if self.index.contains_key(&binding.name) {
            return Err(OpError::DuplicateOperand(binding.name));
        }
        let idx = self.bindings.len();
        self.index.insert(binding.name.clone(), idx);
        self.bindings.push(binding);
        Ok(&mut self.bindings[idx])
    }

    pub fn get(&self, bn: &str) -> Option<&OperandBinding> {
        self.index.get(bn).map(|&idx| &self.bindings[idx])
    }

    pub fn contains(&self, bn: &str) -> bool {
        self.index.contains_key(bn)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OperandBinding> {
        self.bindings.iter()
    }

    /// Inputs, including the ones written in place.
    pub fn input_bns(&self) -> Vec<&str> {
        self.names_where(|role| role.is_input())
    }

    pub fn output_bns(&self) -> Vec<&str> {
        self.names_where(|role| role == OperandRole::Output)
    }

    pub fn const_buf_bns(&self) -> Vec<&str> {
        self.names_where(|role| role == OperandRole::ConstBuf)
    }

    pub fn tmp_bns(&self) -> Vec<&str> {
        self.names_where(|role| role == OperandRole::Tmp)
    }

    fn names_where(&self, pred: impl Fn(OperandRole) -> bool) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| pred(b.role))
            .map(|b| b.name.as_str())
            .collect()
    }
}

/// The contract every operator kind implements.
///
/// Construction validates the configuration and declares the operand bindings; the
/// remaining methods are pure functions of the bindings, the configuration and the
/// maps handed in.
pub trait Operator: Send + Sync {
    fn op_conf(&self) -> &OperatorConf;

    fn bindings(&self) -> &OpBindings;

    /// Fills in output and temporary blob descs from the input blob descs in `blob_descs`.
    ///
    /// Optional operands that are absent from the map are skipped.
    fn infer_blob_descs(
        &self,
        blob_descs: &mut BlobDescMap,
        parallel_ctx: &ParallelContext,
    ) -> Result<()>;

    fn infer_has_batch_dim(&self, has_batch_dim: &mut HasBatchDimMap) -> Result<()>;

    fn get_sbp_signatures(&self, logical: &BlobDescMap) -> Result<SbpSignatureList>;

    fn input_bns(&self) -> Vec<&str> {
        self.bindings().input_bns()
    }

    fn output_bns(&self) -> Vec<&str> {
        self.bindings().output_bns()
    }

    /// Runs [`Operator::get_sbp_signatures`] and validates every emitted signature
    /// against the logical blob descs for `parallel_num` workers.
    fn sbp_signatures_checked(
        &self,
        logical: &BlobDescMap,
        parallel_num: usize,
    ) -> Result<SbpSignatureList> {
        let list = self.get_sbp_signatures(logical)?;
        if list.is_empty() {
            return Err(OpError::InvalidSignature(format!(
                "operator `{}` emitted no signature",
                self.op_conf().name
            )));
        }
        let mut bns = self.input_bns();
        bns.extend(self.output_bns());
        for signature in &list {
            check_sbp_signature(signature, &bns, logical, parallel_num)?;
        }
        Ok(list)
    }
}

pub(crate) fn required_desc<'a>(blob_descs: &'a BlobDescMap, bn: &str) -> Result<&'a BlobDesc> {
    blob_descs
        .get(bn)
        .ok_or_else(|| OpError::MissingBlob(bn.to_string()))
}

pub(crate) fn required_flag(has_batch_dim: &HasBatchDimMap, bn: &str) -> Result<bool> {
    has_batch_dim
        .get(bn)
        .copied()
        .ok_or_else(|| OpError::MissingBlob(bn.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrolling_the_same_name_twice_fails() {
        let mut bindings = OpBindings::new();
        bindings.enroll_input("in").unwrap();
        assert_eq!(
            bindings.enroll_tmp("in").unwrap_err(),
            OpError::DuplicateOperand("in".to_string())
        );
    }

    #[test]
    fn mutable_inputs_count_as_inputs() {
        let mut bindings = OpBindings::new();
        bindings.enroll_input("in").unwrap();
        bindings.enroll_input("gamma").unwrap().role = OperandRole::Mutable;
        bindings.enroll_output("out", true).unwrap();
        bindings.enroll_tmp("scratch").unwrap();
        assert_eq!(bindings.input_bns(), vec!["in", "gamma"]);
        assert_eq!(bindings.output_bns(), vec!["out"]);
        assert_eq!(bindings.tmp_bns(), vec!["scratch"]);
    }
}
