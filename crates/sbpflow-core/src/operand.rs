use serde::{Deserialize, Serialize};

/// How an operator touches one of its operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandRole {
    /// Read-only input.
    Input,
    /// Input that the kernel updates in place.
    Mutable,
    Output,
    /// Operator-owned constant buffer, filled by the execution path itself.
    ConstBuf,
    /// Scratch blob that lives for one invocation.
    Tmp,
}

impl OperandRole {
    pub fn is_input(self) -> bool {
        matches!(self, OperandRole::Input | OperandRole::Mutable)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandBinding {
    pub name: String,
    pub role: OperandRole,
    /// Whether the operand takes part in back-propagation.
    pub has_diff: bool,
}

impl OperandBinding {
    pub fn new(name: impl Into<String>, role: OperandRole) -> Self {
        Self {
            name: name.into(),
            role,
            has_diff: true,
        }
    }
}
