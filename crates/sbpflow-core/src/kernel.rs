use anyhow::Result;

use crate::{Device, Tensor};

/// Device stream an actor's thread is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCtx {
    pub device: Device,
    pub stream_id: u32,
}

/// Execution context handed to a unit of work.
///
/// A context without a device is what actors with no device affinity run under; the
/// processing pipeline is otherwise the same.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelCtx {
    device_ctx: Option<DeviceCtx>,
}

impl KernelCtx {
    /// Context with no device affinity.
    pub fn cpu() -> Self {
        Self { device_ctx: None }
    }

    pub fn with_device(device_ctx: DeviceCtx) -> Self {
        Self {
            device_ctx: Some(device_ctx),
        }
    }

    pub fn device_ctx(&self) -> Option<&DeviceCtx> {
        self.device_ctx.as_ref()
    }
}

/// Object-safe kernel interface. The numeric work lives behind it.
pub trait Kernel: Send + 'static {
    fn name(&self) -> &'static str;

    fn forward(&mut self, ctx: &KernelCtx, inputs: Vec<Tensor>) -> Result<Vec<Tensor>>;
}
