use anyhow::{ensure, Result};
use sbpflow_core::{Kernel, KernelCtx, Tensor};

use crate::ActorWork;

/// Work of a compute actor: run the kernel on each incoming tensor.
pub struct ComputeWork {
    kernel: Box<dyn Kernel>,
}

impl ComputeWork {
    pub fn new(kernel: Box<dyn Kernel>) -> Self {
        Self { kernel }
    }
}

impl ActorWork for ComputeWork {
    fn name(&self) -> &'static str {
        self.kernel.name()
    }

    fn act(&mut self, ctx: &KernelCtx, input: Tensor) -> Result<Vec<Tensor>> {
        self.kernel.forward(ctx, vec![input])
    }
}

/// Forwards its inputs untouched.
#[derive(Default)]
pub struct IdentityKernel;

impl Kernel for IdentityKernel {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn forward(&mut self, _ctx: &KernelCtx, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        ensure!(!inputs.is_empty(), "identity kernel needs at least one input");
        Ok(inputs)
    }
}
