//! Broadcast protocol.
//!
//! Every outbound event names its audience explicitly. The hub encodes an
//! event once and pushes the bytes into each recipient's bounded queue with
//! `try_send`; a session whose queue is full loses that event instead of
//! stalling the sender. Events pushed by one task land in each queue in the
//! order they were pushed.

use std::collections::BTreeMap;

use broadside_shared::net::{encode_to_bytes, ConnectionId, ServerMsg};
use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Exactly one connection (the sender, or a specific target).
    Only(ConnectionId),
    /// Everyone except the given connection.
    AllExcept(ConnectionId),
    All,
}

impl Audience {
    pub fn includes(&self, id: ConnectionId) -> bool {
        match self {
            Audience::Only(only) => *only == id,
            Audience::AllExcept(skip) => *skip != id,
            Audience::All => true,
        }
    }
}

/// Registry of per-session outbound queues.
#[derive(Debug)]
pub struct Hub {
    sessions: RwLock<BTreeMap<ConnectionId, mpsc::Sender<Bytes>>>,
    capacity: usize,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Registers a session and returns the receiving end of its queue.
    pub async fn register(&self, id: ConnectionId) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.write().await.insert(id, tx);
        rx
    }

    /// Drops a session's queue. Its writer drains what is left, then stops.
    pub async fn unregister(&self, id: ConnectionId) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Delivers `msg` to `audience`. Returns how many queues accepted it.
    pub async fn send(&self, audience: Audience, msg: &ServerMsg) -> usize {
        let payload = match encode_to_bytes(msg) {
            Ok(p) => p,
            Err(e) => {
                warn!(event = msg.name(), error = %e, "Failed to encode event");
                return 0;
            }
        };

        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        let mut push = |id: &ConnectionId, tx: &mpsc::Sender<Bytes>| {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn = %id, event = msg.name(), "Outbound queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn = %id, event = msg.name(), "Outbound queue closed");
                }
            }
        };

        match audience {
            Audience::Only(id) => {
                if let Some(tx) = sessions.get(&id) {
                    push(&id, tx);
                }
            }
            _ => {
                for (id, tx) in sessions.iter() {
                    if audience.includes(*id) {
                        push(id, tx);
                    }
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_shared::net::decode_server_msg;

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(b) = rx.try_recv() {
            out.push(decode_server_msg(&b).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn audiences_select_recipients() {
        let hub = Hub::new(8);
        let a = ConnectionId::new_unique();
        let b = ConnectionId::new_unique();
        let c = ConnectionId::new_unique();
        let mut ra = hub.register(a).await;
        let mut rb = hub.register(b).await;
        let mut rc = hub.register(c).await;

        assert_eq!(hub.send(Audience::All, &ServerMsg::CannonsReloaded).await, 3);
        assert_eq!(hub.send(Audience::AllExcept(a), &ServerMsg::PlayerLeft(a)).await, 2);
        assert_eq!(hub.send(Audience::Only(c), &ServerMsg::PlayerLeft(c)).await, 1);

        assert_eq!(drain(&mut ra), vec![ServerMsg::CannonsReloaded]);
        assert_eq!(
            drain(&mut rb),
            vec![ServerMsg::CannonsReloaded, ServerMsg::PlayerLeft(a)]
        );
        assert_eq!(
            drain(&mut rc),
            vec![
                ServerMsg::CannonsReloaded,
                ServerMsg::PlayerLeft(a),
                ServerMsg::PlayerLeft(c)
            ]
        );
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking_others() {
        let hub = Hub::new(1);
        let slow = ConnectionId::new_unique();
        let fast = ConnectionId::new_unique();
        let _slow_rx = hub.register(slow).await;
        let mut fast_rx = hub.register(fast).await;

        assert_eq!(hub.send(Audience::All, &ServerMsg::CannonsReloaded).await, 2);
        drain(&mut fast_rx);
        // `slow` never drains; only `fast` accepts the second event.
        assert_eq!(hub.send(Audience::All, &ServerMsg::CannonsReloaded).await, 1);
        assert_eq!(drain(&mut fast_rx).len(), 1);
    }

    #[tokio::test]
    async fn unregistered_sessions_receive_nothing() {
        let hub = Hub::new(4);
        let a = ConnectionId::new_unique();
        let _rx = hub.register(a).await;
        hub.unregister(a).await;
        assert!(hub.is_empty().await);
        assert_eq!(hub.send(Audience::Only(a), &ServerMsg::CannonsReloaded).await, 0);
    }
}
