use std::fmt;

use sbpflow_core::{Device, Tensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskType {
    NormalForward,
    CopyCommNet,
}

/// Machine, thread and device an actor is materialized on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskBinding {
    pub machine_id: u32,
    pub thrd_id: u32,
    pub device: Device,
}

impl TaskBinding {
    pub fn cpu(machine_id: u32, thrd_id: u32) -> Self {
        Self {
            machine_id,
            thrd_id,
            device: Device::Cpu,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorCmd {
    Start,
    Stop,
}

#[derive(Debug)]
pub enum MsgKind {
    /// A produced register: one tensor for the consumer to work on.
    Regst(Tensor),
    EndOfStream,
    Cmd(ActorCmd),
}

/// A message between two actors. Consumed exactly once by `dst`.
#[derive(Debug)]
pub struct ActorMsg {
    pub src: ActorId,
    pub dst: ActorId,
    pub kind: MsgKind,
}

impl ActorMsg {
    pub fn regst(src: ActorId, dst: ActorId, tensor: Tensor) -> Self {
        Self {
            src,
            dst,
            kind: MsgKind::Regst(tensor),
        }
    }

    pub fn eos(src: ActorId, dst: ActorId) -> Self {
        Self {
            src,
            dst,
            kind: MsgKind::EndOfStream,
        }
    }

    pub fn cmd(src: ActorId, dst: ActorId, cmd: ActorCmd) -> Self {
        Self {
            src,
            dst,
            kind: MsgKind::Cmd(cmd),
        }
    }
}
