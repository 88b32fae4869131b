//! Latest-wins command slot.
//!
//! Every client handler parses its packets and drops the result into one
//! shared slot.  The core consumes from the slot; if several packets arrive
//! before it gets round to it, only the newest survives.  This models a live
//! remote control, not a command log.

use std::sync::Arc;

use maxx_proto::error::ProtocolError;
use maxx_proto::protocol::{Inbound, RemoteCommand};
use tokio::sync::watch;

/// Producer side, shared by all connection handlers.
pub struct CommandChannel {
    tx: watch::Sender<Option<Inbound>>,
}

/// Consumer side, owned by the core.
pub struct CommandReceiver {
    rx: watch::Receiver<Option<Inbound>>,
}

impl CommandChannel {
    pub fn new() -> (Arc<Self>, CommandReceiver) {
        let (tx, rx) = watch::channel(None);
        (Arc::new(Self { tx }), CommandReceiver { rx })
    }

    /// Parse a raw packet and publish it.  A malformed packet is rejected and
    /// the pending slot is left as it was.
    pub fn submit(&self, client: usize, raw: &[u8]) -> Result<u64, ProtocolError> {
        let command = RemoteCommand::parse(raw)?;
        Ok(self.publish(client, command))
    }

    /// Publish an already-parsed command, overwriting any pending one.
    /// Returns its sequence marker.
    pub fn publish(&self, client: usize, command: RemoteCommand) -> u64 {
        let mut seq = 0;
        // Assigned under the slot's write lock: publish order == seq order.
        self.tx.send_modify(|slot| {
            seq = slot.as_ref().map_or(0, |prev| prev.seq) + 1;
            *slot = Some(Inbound {
                seq,
                client,
                command,
            });
        });
        seq
    }
}

impl CommandReceiver {
    /// Wait for the next unconsumed command.  `None` once every producer is
    /// gone.
    pub async fn next(&mut self) -> Option<Inbound> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(inbound) = self.rx.borrow_and_update().clone() {
                return Some(inbound);
            }
        }
    }

    /// Take the pending command without waiting.
    #[cfg(test)]
    pub fn try_take(&mut self) -> Option<Inbound> {
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }
}
