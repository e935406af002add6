use std::collections::HashMap;

use crate::conf::{OpKind, OperatorConf};
use crate::error::{OpError, Result};
use crate::matmul::MatmulOp;
use crate::normalization::NormalizationOp;
use crate::operator::Operator;

pub type OpCtor = fn(OperatorConf) -> Result<Box<dyn Operator>>;

/// Operator constructors keyed by kind.
pub struct OpRegistry {
    ctors: HashMap<OpKind, OpCtor>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Registry holding every operator kind this crate implements.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.ctors.insert(OpKind::Normalization, new_normalization);
        reg.ctors.insert(OpKind::Matmul, new_matmul);
        reg
    }

    pub fn register(&mut self, kind: OpKind, ctor: OpCtor) -> Result<()> {
        if self.ctors.contains_key(&kind) {
            return Err(OpError::DuplicateRegistration(kind.to_string()));
        }
        self.ctors.insert(kind, ctor);
        Ok(())
    }

    pub fn construct(&self, conf: OperatorConf) -> Result<Box<dyn Operator>> {
        let kind = conf.kind();
        let ctor = self
            .ctors
            .get(&kind)
            .ok_or_else(|| OpError::UnregisteredOp(kind.to_string()))?;
        ctor(conf)
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn new_normalization(conf: OperatorConf) -> Result<Box<dyn Operator>> {
    Ok(Box::new(NormalizationOp::init_from_op_conf(conf)?))
}

fn new_matmul(conf: OperatorConf) -> Result<Box<dyn Operator>> {
    Ok(Box::new(MatmulOp::init_from_op_conf(conf)?))
}

/// Builds an operator through the built-in registry.
pub fn construct_op(conf: OperatorConf) -> Result<Box<dyn Operator>> {
    OpRegistry::with_builtin().construct(conf)
}
