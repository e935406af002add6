use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{ensure, Result};
use bytes::Bytes;
use sbpflow_core::Tensor;
use serde::Serialize;
use tracing::debug;

/// Reliable, ordered point-to-point transport between machines.
pub trait CommNet: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Moves `tensor` from `src_machine` into host memory on `dst_machine` and
    /// returns the tensor as seen by the receiver.
    fn transfer(&self, src_machine: u32, dst_machine: u32, tensor: &Tensor) -> Result<Tensor>;
}

/// Traffic carried over one directed link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub transfers: u64,
    pub bytes: u64,
}

/// In-process network: every transfer copies the payload into a fresh host buffer.
#[derive(Default)]
pub struct LocalCommNet {
    links: Mutex<HashMap<(u32, u32), LinkStats>>,
}

impl LocalCommNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_stats(&self, src_machine: u32, dst_machine: u32) -> LinkStats {
        let links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links
            .get(&(src_machine, dst_machine))
            .copied()
            .unwrap_or_default()
    }
}

impl CommNet for LocalCommNet {
    fn name(&self) -> &'static str {
        "local"
    }

    fn transfer(&self, src_machine: u32, dst_machine: u32, tensor: &Tensor) -> Result<Tensor> {
        ensure!(
            tensor.is_consistent(),
            "payload holds {} bytes but {} declares {}",
            tensor.byte_len(),
            tensor.desc,
            tensor.desc.byte_len()
        );
        let bytes = Bytes::copy_from_slice(tensor.bytes());
        {
            let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
            let stats = links.entry((src_machine, dst_machine)).or_default();
            stats.transfers += 1;
            stats.bytes += bytes.len() as u64;
        }
        debug!(src_machine, dst_machine, bytes = bytes.len(), "comm net transfer");
        Ok(Tensor::from_cpu_bytes(
            tensor.desc.data_type,
            tensor.desc.shape.clone(),
            bytes,
        ))
    }
}
