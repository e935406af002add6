use anyhow::Result;
use sbpflow_core::{KernelCtx, Tensor};

/// One actor's unit of work, run once per data message.
/// Keep it synchronous; the actor task calls it directly.
pub trait ActorWork: Send {
    fn name(&self) -> &'static str;

    /// Whether the work runs against the thread's device context. Work that
    /// answers `false` always gets a context without a device.
    fn needs_device_ctx(&self) -> bool {
        true
    }

    fn act(&mut self, ctx: &KernelCtx, input: Tensor) -> Result<Vec<Tensor>>;
}
