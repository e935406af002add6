use std::sync::Arc;

use anyhow::Result;
use sbpflow_core::{KernelCtx, Tensor};

use crate::{ActorWork, CommNet};

/// Work of a copy-comm-net actor: relocate the payload to this actor's machine.
/// No kernel runs and the device context is never consulted.
pub struct CopyCommNetWork {
    comm_net: Arc<dyn CommNet>,
    src_machine: u32,
    dst_machine: u32,
}

impl CopyCommNetWork {
    pub fn new(comm_net: Arc<dyn CommNet>, src_machine: u32, dst_machine: u32) -> Self {
        Self {
            comm_net,
            src_machine,
            dst_machine,
        }
    }
}

impl ActorWork for CopyCommNetWork {
    fn name(&self) -> &'static str {
        "copy_comm_net"
    }

    fn needs_device_ctx(&self) -> bool {
        false
    }

    fn act(&mut self, _ctx: &KernelCtx, input: Tensor) -> Result<Vec<Tensor>> {
        let moved = self
            .comm_net
            .transfer(self.src_machine, self.dst_machine, &input)?;
        Ok(vec![moved])
    }
}
