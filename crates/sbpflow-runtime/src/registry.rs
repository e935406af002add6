use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sbpflow_core::Kernel;
use tracing::debug;

use crate::{
    Actor, ActorId, ActorWork, CommNet, ComputeWork, CopyCommNetWork, IdentityKernel, Router,
    RuntimeConfig, TaskBinding, TaskType,
};

/// Everything needed to materialize one actor.
#[derive(Clone, Debug)]
pub struct TaskProto {
    pub actor_id: ActorId,
    pub task_type: TaskType,
    pub binding: TaskBinding,
    /// Whether the actor is scheduled with its own device context.
    pub needs_device_ctx: bool,
    pub consumers: Vec<ActorId>,
    /// Number of distinct upstream actors feeding this one.
    pub producers: usize,
    /// Machine the payload comes from, for copy-comm-net tasks.
    pub src_machine: Option<u32>,
    /// Kernel to run, for compute tasks.
    pub kernel: Option<String>,
}

pub type KernelFactory = fn() -> Box<dyn Kernel>;

/// Shared collaborators handed to actor constructors.
pub struct ActorEnv {
    pub router: Router,
    pub comm_net: Arc<dyn CommNet>,
    pub config: RuntimeConfig,
    kernels: HashMap<String, KernelFactory>,
}

impl ActorEnv {
    pub fn new(router: Router, comm_net: Arc<dyn CommNet>, config: RuntimeConfig) -> Self {
        let mut kernels: HashMap<String, KernelFactory> = HashMap::new();
        kernels.insert("identity".to_string(), identity_kernel);
        Self {
            router,
            comm_net,
            config,
            kernels,
        }
    }

    pub fn register_kernel(&mut self, name: &str, factory: KernelFactory) {
        self.kernels.insert(name.to_string(), factory);
    }

    fn kernel(&self, name: &str) -> Result<Box<dyn Kernel>> {
        let factory = self
            .kernels
            .get(name)
            .with_context(|| format!("unknown kernel: {name}"))?;
        Ok(factory())
    }
}

pub type ActorWorkCtor = fn(&TaskProto, &ActorEnv) -> Result<Box<dyn ActorWork>>;

/// Actor constructors keyed by task type and whether the actor needs its own device
/// context.
#[derive(Default)]
pub struct ActorRegistry {
    ctors: HashMap<(TaskType, bool), ActorWorkCtor>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.ctors.insert((TaskType::NormalForward, true), new_compute);
        // A copy-comm-net task sits on either side of a network boundary; both
        // sides resolve to the same work.
        reg.ctors.insert((TaskType::CopyCommNet, true), new_copy_comm_net);
        reg.ctors.insert((TaskType::CopyCommNet, false), new_copy_comm_net);
        reg
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        needs_device_ctx: bool,
        ctor: ActorWorkCtor,
    ) -> Result<()> {
        if self.ctors.contains_key(&(task_type, needs_device_ctx)) {
            bail!("actor already registered for ({task_type:?}, {needs_device_ctx})");
        }
        self.ctors.insert((task_type, needs_device_ctx), ctor);
        Ok(())
    }

    pub fn resolve(&self, task_type: TaskType, needs_device_ctx: bool) -> Result<ActorWorkCtor> {
        self.ctors
            .get(&(task_type, needs_device_ctx))
            .copied()
            .with_context(|| {
                format!("no actor registered for ({task_type:?}, {needs_device_ctx})")
            })
    }

    /// Builds the actor for `task` and registers its inbox with the env's router.
    pub fn new_actor(&self, task: TaskProto, env: &ActorEnv) -> Result<Actor> {
        let ctor = self.resolve(task.task_type, task.needs_device_ctx)?;
        let work = ctor(&task, env)?;
        let inbox = env.router.register(task.actor_id, env.config.inbox_capacity)?;
        debug!(
            actor_id = task.actor_id.0,
            task_type = ?task.task_type,
            needs_device_ctx = task.needs_device_ctx,
            producers = task.producers,
            "actor materialized"
        );
        Ok(Actor::new(
            task.actor_id,
            task.binding,
            inbox,
            task.consumers,
            env.router.clone(),
            work,
        )
        .with_producers(task.producers))
    }
}

fn identity_kernel() -> Box<dyn Kernel> {
    Box::new(IdentityKernel)
}

fn new_compute(task: &TaskProto, env: &ActorEnv) -> Result<Box<dyn ActorWork>> {
    let name = task
        .kernel
        .as_deref()
        .with_context(|| format!("compute task {} has no kernel", task.actor_id))?;
    Ok(Box::new(ComputeWork::new(env.kernel(name)?)))
}

fn new_copy_comm_net(task: &TaskProto, env: &ActorEnv) -> Result<Box<dyn ActorWork>> {
    let src_machine = task
        .src_machine
        .with_context(|| format!("copy-comm-net task {} has no source machine", task.actor_id))?;
    Ok(Box::new(CopyCommNetWork::new(
        env.comm_net.clone(),
        src_machine,
        task.binding.machine_id,
    )))
}
