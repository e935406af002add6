use std::collections::HashSet;

use anyhow::{Context, Result};
use sbpflow_core::{DeviceCtx, KernelCtx};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{ActorCmd, ActorId, ActorMsg, ActorWork, MsgKind, Router, TaskBinding};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorState {
    Idle,
    Processing,
    AwaitingDownstream,
}

/// Context of the thread an actor runs on.
#[derive(Clone, Debug, Default)]
pub struct ThreadCtx {
    pub thrd_id: u32,
    pub device_ctx: Option<DeviceCtx>,
}

impl ThreadCtx {
    /// Thread context for `binding`; GPU bindings get a device context on stream 0.
    pub fn for_binding(binding: &TaskBinding) -> Self {
        let device_ctx = binding.device.is_gpu().then(|| DeviceCtx {
            device: binding.device.clone(),
            stream_id: 0,
        });
        Self {
            thrd_id: binding.thrd_id,
            device_ctx,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Summary an actor returns when its region completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActorReport {
    pub regsts_processed: u64,
    pub msgs_sent: u64,
}

pub struct Actor {
    id: ActorId,
    binding: TaskBinding,
    state: ActorState,
    inbox: mpsc::Receiver<ActorMsg>,
    consumers: Vec<ActorId>,
    router: Router,
    work: Box<dyn ActorWork>,
    /// Upstream actors whose end-of-stream must arrive before this actor finishes.
    producers: usize,
    finished_producers: HashSet<ActorId>,
    report: ActorReport,
}

impl Actor {
    pub fn new(
        id: ActorId,
        binding: TaskBinding,
        inbox: mpsc::Receiver<ActorMsg>,
        consumers: Vec<ActorId>,
        router: Router,
        work: Box<dyn ActorWork>,
    ) -> Self {
        Self {
            id,
            binding,
            state: ActorState::Idle,
            inbox,
            consumers,
            router,
            work,
            producers: 1,
            finished_producers: HashSet::new(),
            report: ActorReport::default(),
        }
    }

    /// Sets how many distinct producers feed this actor. At least one is assumed.
    pub fn with_producers(mut self, producers: usize) -> Self {
        self.producers = producers.max(1);
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub fn binding(&self) -> &TaskBinding {
        &self.binding
    }

    /// Drains the inbox until every producer has sent end-of-stream or a stop command
    /// arrives. On failure the consumers still get end-of-stream so they can finish.
    pub async fn run(mut self) -> Result<ActorReport> {
        let thread_ctx = ThreadCtx::for_binding(&self.binding);
        info!(
            actor_id = self.id.0,
            work = self.work.name(),
            machine_id = self.binding.machine_id,
            producers = self.producers,
            "actor started"
        );
        let outcome = self.drain(&thread_ctx).await;
        self.router.deregister(self.id);
        match outcome {
            Ok(()) => {
                info!(
                    actor_id = self.id.0,
                    processed = self.report.regsts_processed,
                    "actor finished"
                );
                Ok(self.report)
            }
            Err(err) => {
                error!(actor_id = self.id.0, error = ?err, "actor failed");
                close_downstream(&self.router, self.id, &self.consumers).await;
                Err(err)
            }
        }
    }

    async fn drain(&mut self, thread_ctx: &ThreadCtx) -> Result<()> {
        while let Some(msg) = self.inbox.recv().await {
            if self.process_msg(msg, thread_ctx).await? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Entry point for one message. Work that does not need a device context, or a
    /// thread that has none, runs under a device-less kernel context; both go through
    /// [`Actor::process_msg_with_kernel_ctx`].
    pub async fn process_msg(&mut self, msg: ActorMsg, thread_ctx: &ThreadCtx) -> Result<Flow> {
        let kernel_ctx = match (&thread_ctx.device_ctx, self.work.needs_device_ctx()) {
            (Some(device_ctx), true) => KernelCtx::with_device(device_ctx.clone()),
            _ => KernelCtx::cpu(),
        };
        self.process_msg_with_kernel_ctx(msg, &kernel_ctx).await
    }

    pub async fn process_msg_with_kernel_ctx(
        &mut self,
        msg: ActorMsg,
        kernel_ctx: &KernelCtx,
    ) -> Result<Flow> {
        match msg.kind {
            MsgKind::Regst(tensor) => {
                self.state = ActorState::Processing;
                let outputs = self
                    .work
                    .act(kernel_ctx, tensor)
                    .with_context(|| format!("{} failed on regst from {}", self.id, msg.src))?;
                self.report.regsts_processed += 1;

                self.state = ActorState::AwaitingDownstream;
                for output in outputs {
                    for &consumer in &self.consumers {
                        self.router
                            .send(ActorMsg::regst(self.id, consumer, output.clone()))
                            .await?;
                        self.report.msgs_sent += 1;
                    }
                }
                self.state = ActorState::Idle;
                Ok(Flow::Continue)
            }
            MsgKind::EndOfStream => {
                self.finished_producers.insert(msg.src);
                debug!(
                    actor_id = self.id.0,
                    src = msg.src.0,
                    finished = self.finished_producers.len(),
                    producers = self.producers,
                    "end of stream"
                );
                if self.finished_producers.len() < self.producers {
                    return Ok(Flow::Continue);
                }
                for &consumer in &self.consumers {
                    self.router.send(ActorMsg::eos(self.id, consumer)).await?;
                }
                Ok(Flow::Exit)
            }
            MsgKind::Cmd(ActorCmd::Start) => Ok(Flow::Continue),
            MsgKind::Cmd(ActorCmd::Stop) => Ok(Flow::Exit),
        }
    }
}

/// Best-effort end-of-stream to every consumer of a failed actor.
async fn close_downstream(router: &Router, id: ActorId, consumers: &[ActorId]) {
    for &consumer in consumers {
        if let Err(err) = router.send(ActorMsg::eos(id, consumer)).await {
            warn!(
                actor_id = id.0,
                consumer = consumer.0,
                error = %err,
                "could not close consumer"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use sbpflow_core::{DType, Shape, Tensor};

    use super::*;
    use crate::{ComputeWork, IdentityKernel};

    fn regst(tag: u8) -> ActorMsg {
        let tensor =
            Tensor::from_cpu_bytes(DType::U8, Shape::from_slice(&[1]), Bytes::from(vec![tag]));
        ActorMsg::regst(ActorId(0), ActorId(1), tensor)
    }

    #[tokio::test]
    async fn state_follows_downstream_pressure() {
        let router = Router::new();
        let inbox = router.register(ActorId(1), 4).unwrap();
        let mut sink = router.register(ActorId(2), 1).unwrap();
        let mut actor = Actor::new(
            ActorId(1),
            TaskBinding::cpu(0, 0),
            inbox,
            vec![ActorId(2)],
            router.clone(),
            Box::new(ComputeWork::new(Box::new(IdentityKernel))),
        );
        let ctx = KernelCtx::cpu();
        assert_eq!(actor.state(), ActorState::Idle);

        let flow = actor.process_msg_with_kernel_ctx(regst(1), &ctx).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(actor.state(), ActorState::Idle);

        // The sink holds one undelivered message, so the next output cannot be placed.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            actor.process_msg_with_kernel_ctx(regst(2), &ctx),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(actor.state(), ActorState::AwaitingDownstream);
        assert_eq!(actor.report.regsts_processed, 2);
        assert_eq!(actor.report.msgs_sent, 1);

        assert!(matches!(sink.recv().await.unwrap().kind, MsgKind::Regst(_)));
        let flow = actor.process_msg_with_kernel_ctx(regst(3), &ctx).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(actor.state(), ActorState::Idle);
    }

    #[tokio::test]
    async fn end_of_stream_waits_for_every_producer() {
        let router = Router::new();
        let inbox = router.register(ActorId(1), 4).unwrap();
        let _sink = router.register(ActorId(9), 4).unwrap();
        let mut actor = Actor::new(
            ActorId(1),
            TaskBinding::cpu(0, 0),
            inbox,
            vec![ActorId(9)],
            router.clone(),
            Box::new(ComputeWork::new(Box::new(IdentityKernel))),
        )
        .with_producers(2);
        let ctx = KernelCtx::cpu();

        let mut flows = Vec::new();
        // The repeated end-of-stream from producer 5 does not count twice.
        for src in [5, 5, 6] {
            let msg = ActorMsg::eos(ActorId(src), ActorId(1));
            flows.push(actor.process_msg_with_kernel_ctx(msg, &ctx).await.unwrap());
        }
        assert_eq!(flows, vec![Flow::Continue, Flow::Continue, Flow::Exit]);
    }
}
