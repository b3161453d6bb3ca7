//! Ordered background writer for persisted state.
//!
//! Store mutations are applied to memory synchronously and handed to this
//! writer as [`PersistOp`]s. A single task drains the queue so operations
//! reach the persistence backend in the order they were issued. Failures are
//! logged; memory stays authoritative.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    oneshot,
};
use tracing::{debug, warn};
use trellis_util::{PersistenceError, ScopeKey, StatePersistence, root_key};

use super::scope::ScopeWrite;

#[derive(Debug)]
pub(crate) enum PersistOp {
    /// Store (or with `None`, drop) one root entry.
    Write { scope: ScopeKey, key: String, value: Option<Value> },
    /// Apply a mutation on top of whatever is persisted. Used for scopes not
    /// loaded into memory, whose root entries may hold siblings the store
    /// has not seen.
    Patch { scope: ScopeKey, write: ScopeWrite },
    Clear { scope: ScopeKey },
    /// Acknowledges once every earlier operation has been processed.
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle onto the writer queue. A disabled writer drops
/// everything it is given.
#[derive(Clone)]
pub(crate) struct PersistenceWriter {
    sender: Option<UnboundedSender<PersistOp>>,
}

impl PersistenceWriter {
    /// Spawns the writer task on the current Tokio runtime. Without a
    /// runtime the writer is disabled and a warning is logged.
    pub(crate) fn spawn(persistence: Arc<dyn StatePersistence>) -> Self {
        let Ok(handle) = Handle::try_current() else {
            warn!("no Tokio runtime available; state will not be persisted");
            return Self::disabled();
        };
        let (sender, receiver) = unbounded_channel();
        handle.spawn(drain_queue(persistence, receiver));
        Self { sender: Some(sender) }
    }

    pub(crate) fn disabled() -> Self {
        Self { sender: None }
    }

    pub(crate) fn enqueue(&self, op: PersistOp) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(op).is_err() {
            warn!("state writer stopped; dropping persistence operation");
        }
    }

    /// Waits until every operation queued so far has been processed.
    pub(crate) async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if sender.send(PersistOp::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn drain_queue(persistence: Arc<dyn StatePersistence>, mut receiver: UnboundedReceiver<PersistOp>) {
    while let Some(op) = receiver.recv().await {
        match op {
            PersistOp::Write { scope, key, value } => {
                let result = match &value {
                    Some(value) => persistence.set(&scope, &key, value).await,
                    None => persistence.remove(&scope, &key).await,
                };
                match result {
                    Ok(()) => debug!(scope = %scope, key = %key, "persisted state entry"),
                    Err(error) => warn!(scope = %scope, key = %key, error = %error, "failed to persist state entry"),
                }
            }
            PersistOp::Patch { scope, write } => {
                if let Err(error) = patch_scope(persistence.as_ref(), &scope, &write).await {
                    warn!(scope = %scope, error = %error, "failed to patch persisted state");
                }
            }
            PersistOp::Clear { scope } => match persistence.clear(&scope).await {
                Ok(()) => debug!(scope = %scope, "cleared persisted state"),
                Err(error) => warn!(scope = %scope, error = %error, "failed to clear persisted state"),
            },
            PersistOp::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn patch_scope(persistence: &dyn StatePersistence, scope: &ScopeKey, write: &ScopeWrite) -> Result<(), PersistenceError> {
    let path = match write {
        ScopeWrite::Clear => return persistence.clear(scope).await,
        ScopeWrite::Set { path, .. } | ScopeWrite::Remove { path } => path,
    };
    let Some(key) = root_key(path) else {
        return Ok(());
    };
    let mut entries = persistence.get_all(scope).await?;
    write.apply_to(&mut entries);
    match entries.get(&key) {
        Some(value) => persistence.set(scope, &key, value).await,
        None => persistence.remove(scope, &key).await,
    }
}
