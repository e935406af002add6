use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use sbpflow_core::{DType, Device, Shape, Tensor};
use sbpflow_runtime::{
    ActorEnv, ActorId, ActorMsg, ActorRegistry, CommNet, LinkStats, LocalCommNet, MsgKind,
    Router, RuntimeConfig, TaskBinding, TaskProto, TaskType,
};
use serde::Serialize;
use tracing::info;

const DRIVER: ActorId = ActorId(0);
const COMPUTE: ActorId = ActorId(1);
const SEND_SIDE: ActorId = ActorId(2);
const RECV_SIDE: ActorId = ActorId(3);
const SINK: ActorId = ActorId(4);

const HOME_MACHINE: u32 = 0;
const REMOTE_MACHINE: u32 = 1;

/// Elements in every injected payload.
const PAYLOAD_LEN: usize = 16;

#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    pub delivered: u32,
    pub bytes: u64,
    pub outbound: LinkStats,
    pub inbound: LinkStats,
}

/// The actors of one run: compute on the home machine, a copy-comm-net actor that
/// pulls onto the remote machine and one that pulls back home.
fn tasks(device: Device) -> Vec<TaskProto> {
    vec![
        TaskProto {
            actor_id: COMPUTE,
            task_type: TaskType::NormalForward,
            binding: TaskBinding {
                machine_id: HOME_MACHINE,
                thrd_id: 0,
                device,
            },
            needs_device_ctx: true,
            consumers: vec![SEND_SIDE],
            producers: 1,
            src_machine: None,
            kernel: Some("identity".to_string()),
        },
        TaskProto {
            actor_id: SEND_SIDE,
            task_type: TaskType::CopyCommNet,
            binding: TaskBinding::cpu(REMOTE_MACHINE, 0),
            needs_device_ctx: false,
            consumers: vec![RECV_SIDE],
            producers: 1,
            src_machine: Some(HOME_MACHINE),
            kernel: None,
        },
        TaskProto {
            actor_id: RECV_SIDE,
            task_type: TaskType::CopyCommNet,
            binding: TaskBinding::cpu(HOME_MACHINE, 1),
            needs_device_ctx: true,
            consumers: vec![SINK],
            producers: 1,
            src_machine: Some(REMOTE_MACHINE),
            kernel: None,
        },
    ]
}

/// Every element carries the sequence number as little-endian bits.
fn payload(seq: u32) -> Tensor {
    let data: Vec<u8> = (0..PAYLOAD_LEN).flat_map(|_| seq.to_le_bytes()).collect();
    Tensor::from_cpu_bytes(DType::I32, Shape::from_slice(&[PAYLOAD_LEN]), Bytes::from(data))
}

fn payload_seq(tensor: &Tensor) -> Result<u32> {
    let head: [u8; 4] = tensor
        .bytes()
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .context("payload shorter than one element")?;
    Ok(u32::from_le_bytes(head))
}

pub async fn run_pipeline(messages: u32, capacity: usize, device: Device) -> Result<PipelineReport> {
    let comm_net = Arc::new(LocalCommNet::new());
    let (delivered, bytes) = drive(comm_net.clone(), messages, capacity, device).await?;
    Ok(PipelineReport {
        delivered,
        bytes,
        outbound: comm_net.link_stats(HOME_MACHINE, REMOTE_MACHINE),
        inbound: comm_net.link_stats(REMOTE_MACHINE, HOME_MACHINE),
    })
}

/// Runs the actors to completion and returns the payload count and bytes the sink
/// received. A failed actor closes its consumers, so the sink always sees
/// end-of-stream and the failure surfaces from the actor's handle.
async fn drive(
    comm_net: Arc<dyn CommNet>,
    messages: u32,
    capacity: usize,
    device: Device,
) -> Result<(u32, u64)> {
    let env = ActorEnv::new(
        Router::new(),
        comm_net,
        RuntimeConfig {
            inbox_capacity: capacity,
        },
    );
    let registry = ActorRegistry::with_builtin();
    let mut sink = env.router.register(SINK, capacity)?;

    let mut handles = Vec::new();
    for task in tasks(device) {
        let actor_id = task.actor_id;
        let actor = registry.new_actor(task, &env)?;
        handles.push((actor_id, tokio::spawn(actor.run())));
    }

    let router = env.router.clone();
    let driver = tokio::spawn(async move {
        for seq in 0..messages {
            router.send(ActorMsg::regst(DRIVER, COMPUTE, payload(seq))).await?;
        }
        router.send(ActorMsg::eos(DRIVER, COMPUTE)).await?;
        anyhow::Ok(())
    });

    let mut delivered = 0u32;
    let mut bytes = 0u64;
    while let Some(msg) = sink.recv().await {
        match msg.kind {
            MsgKind::Regst(tensor) => {
                let seq = payload_seq(&tensor)?;
                ensure!(seq == delivered, "payload {seq} arrived out of order");
                delivered += 1;
                bytes += tensor.byte_len() as u64;
            }
            MsgKind::EndOfStream => break,
            MsgKind::Cmd(cmd) => bail!("sink got unexpected command {cmd:?}"),
        }
    }
    env.router.deregister(SINK);

    for (actor_id, handle) in handles {
        let report = handle
            .await?
            .with_context(|| format!("{actor_id} failed"))?;
        info!(
            actor_id = actor_id.0,
            regsts = report.regsts_processed,
            sent = report.msgs_sent,
            "actor report"
        );
    }
    driver.await?.context("driver failed")?;
    ensure!(
        delivered == messages,
        "delivered {delivered} of {messages} payloads"
    );
    Ok((delivered, bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn every_payload_makes_the_round_trip_in_order() {
        let report = run_pipeline(40, 2, Device::Cpu).await.unwrap();
        assert_eq!(report.delivered, 40);
        assert_eq!(report.bytes, 40 * 64);
        assert_eq!(report.outbound.transfers, 40);
        assert_eq!(report.inbound.bytes, 40 * 64);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gpu_compute_binding_runs_the_same_pipeline() {
        let report = run_pipeline(3, 8, Device::Cuda { device_id: 0 }).await.unwrap();
        assert_eq!(report.delivered, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_run_only_carries_end_of_stream() {
        let report = run_pipeline(0, 1, Device::Cpu).await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.outbound, LinkStats::default());
    }

    #[test]
    fn payload_sequence_survives_encoding() {
        for seq in [0, 17, 16_777_217, u32::MAX] {
            assert_eq!(payload_seq(&payload(seq)).unwrap(), seq);
        }
        assert!(payload(0).is_consistent());
        assert_eq!(payload(0).byte_len(), PAYLOAD_LEN * 4);
    }

    /// Fails every transfer after the first `budget`.
    struct FlakyCommNet {
        inner: LocalCommNet,
        budget: AtomicU32,
    }

    impl CommNet for FlakyCommNet {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn transfer(&self, src_machine: u32, dst_machine: u32, tensor: &Tensor) -> Result<Tensor> {
            let spent = self
                .budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
            ensure!(spent.is_ok(), "link {src_machine}->{dst_machine} down");
            self.inner.transfer(src_machine, dst_machine, tensor)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_transfer_ends_the_run_with_an_error() {
        let comm_net = Arc::new(FlakyCommNet {
            inner: LocalCommNet::new(),
            budget: AtomicU32::new(3),
        });
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            drive(comm_net, 10, 2, Device::Cpu),
        )
        .await
        .expect("run must not hang after an actor fails");
        let err = outcome.unwrap_err();
        assert!(err.to_string().starts_with("actor#"), "{err:#}");
    }
}
