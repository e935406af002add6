use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{ActorId, ActorMsg};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("no inbox registered for {0}")]
    UnknownActor(ActorId),

    #[error("{0} inbox is full")]
    Backpressure(ActorId),

    #[error("{0} inbox is closed")]
    Closed(ActorId),

    #[error("{0} already has an inbox")]
    DuplicateActor(ActorId),
}

/// Delivers actor messages to bounded per-actor inboxes.
///
/// Each inbox is a FIFO channel, so messages from one sender to one receiver are
/// received in send order.
#[derive(Clone, Default)]
pub struct Router {
    inboxes: Arc<RwLock<HashMap<ActorId, mpsc::Sender<ActorMsg>>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the inbox of `id` holding at most `capacity` undelivered messages.
    pub fn register(
        &self,
        id: ActorId,
        capacity: usize,
    ) -> Result<mpsc::Receiver<ActorMsg>, RouteError> {
        let mut inboxes = self.inboxes.write().unwrap_or_else(|e| e.into_inner());
        if inboxes.contains_key(&id) {
            return Err(RouteError::DuplicateActor(id));
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        inboxes.insert(id, tx);
        Ok(rx)
    }

    pub fn deregister(&self, id: ActorId) {
        let mut inboxes = self.inboxes.write().unwrap_or_else(|e| e.into_inner());
        inboxes.remove(&id);
    }

    /// Sends `msg`, waiting for room in the destination inbox.
    pub async fn send(&self, msg: ActorMsg) -> Result<(), RouteError> {
        let dst = msg.dst;
        let tx = self.sender(dst)?;
        tx.send(msg).await.map_err(|_| RouteError::Closed(dst))
    }

    /// Sends `msg` only if the destination inbox has room.
    pub fn try_send(&self, msg: ActorMsg) -> Result<(), RouteError> {
        let dst = msg.dst;
        let tx = self.sender(dst)?;
        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => RouteError::Backpressure(dst),
            TrySendError::Closed(_) => RouteError::Closed(dst),
        })
    }

    fn sender(&self, id: ActorId) -> Result<mpsc::Sender<ActorMsg>, RouteError> {
        let inboxes = self.inboxes.read().unwrap_or_else(|e| e.into_inner());
        inboxes.get(&id).cloned().ok_or(RouteError::UnknownActor(id))
    }
}
