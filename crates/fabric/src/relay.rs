//! Gateway relay
//!
//! Last hop of the forwarding path: fans a `ForwardingEvent` out to the
//! realtime connections of its recipients. Recipients with no open
//! connection are skipped silently. Re-deliveries of a recently delivered
//! event id are ignored, so at-least-once forwarding reaches clients once.
//! An event that reached nobody is not remembered, so forwarding it again
//! after a recipient reconnects still gets through.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use taskwire_contracts::{CorrelationId, ForwardedPayload, ForwardingEvent, GatewayPattern};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::EventSink;

/// Frame pushed to a connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    pub event: GatewayPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub event_id: Uuid,
    pub payload: ForwardedPayload,
}

impl ClientMessage {
    fn from_event(event: &ForwardingEvent) -> Self {
        Self {
            event: event.pattern,
            correlation_id: event.correlation_id().cloned(),
            event_id: event.id,
            payload: event.payload.clone(),
        }
    }
}

/// What happened to one forwarding event at the relay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages handed to open connections
    pub delivered: usize,
    /// Recipients that had no open connection
    pub skipped: Vec<Uuid>,
    /// The event id was seen recently and nothing was sent
    pub duplicate: bool,
}

/// Receiving end of one client connection
#[derive(Debug)]
pub struct ClientSubscription {
    user_id: Uuid,
    connection_id: u64,
    rx: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ClientSubscription {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.rx.try_recv().ok()
    }
}

struct Connection {
    id: u64,
    tx: mpsc::UnboundedSender<ClientMessage>,
}

/// Bounded memory of recently relayed event ids
struct RecentIds {
    capacity: usize,
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    /// Returns false if `id` was already remembered
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

pub struct GatewayRelay {
    connections: RwLock<HashMap<Uuid, Vec<Connection>>>,
    recent: Mutex<RecentIds>,
    next_connection: AtomicU64,
}

impl Default for GatewayRelay {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl GatewayRelay {
    /// Relay remembering the last `dedup_capacity` event ids
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            recent: Mutex::new(RecentIds::new(dedup_capacity)),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Open a connection for `user_id`. A user may hold several.
    pub fn connect(&self, user_id: Uuid) -> ClientSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);

        self.connections
            .write()
            .entry(user_id)
            .or_default()
            .push(Connection {
                id: connection_id,
                tx,
            });
        debug!(%user_id, connection_id, "client connected");

        ClientSubscription {
            user_id,
            connection_id,
            rx,
        }
    }

    /// Close one connection
    pub fn disconnect(&self, subscription: ClientSubscription) {
        let mut connections = self.connections.write();
        if let Some(open) = connections.get_mut(&subscription.user_id) {
            open.retain(|c| c.id != subscription.connection_id);
            if open.is_empty() {
                connections.remove(&subscription.user_id);
            }
        }
        debug!(user_id = %subscription.user_id, connection_id = subscription.connection_id, "client disconnected");
    }

    pub fn is_connected(&self, user_id: &Uuid) -> bool {
        self.connections
            .read()
            .get(user_id)
            .is_some_and(|open| open.iter().any(|c| !c.tx.is_closed()))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().values().map(Vec::len).sum()
    }

    /// Push `event` to every open connection of its recipients
    pub fn relay(&self, event: &ForwardingEvent) -> DeliveryReport {
        if self.recent.lock().contains(&event.id) {
            debug!(event_id = %event.id, "duplicate event ignored");
            return DeliveryReport {
                duplicate: true,
                ..Default::default()
            };
        }

        let message = ClientMessage::from_event(event);
        let mut report = DeliveryReport::default();
        let mut stale = false;

        {
            let connections = self.connections.read();
            for recipient in event.recipients.iter() {
                let Some(open) = connections.get(recipient) else {
                    trace!(%recipient, "recipient not connected");
                    report.skipped.push(*recipient);
                    continue;
                };

                let mut reached = false;
                for connection in open {
                    if connection.tx.send(message.clone()).is_ok() {
                        report.delivered += 1;
                        reached = true;
                    } else {
                        stale = true;
                    }
                }
                if !reached {
                    report.skipped.push(*recipient);
                }
            }
        }

        if stale {
            self.prune();
        }

        if report.delivered > 0 {
            self.recent.lock().insert(event.id);
        }

        debug!(
            event_id = %event.id,
            event = %event.pattern,
            delivered = report.delivered,
            skipped = report.skipped.len(),
            "event relayed"
        );
        report
    }

    /// Drop connections whose client has gone away
    pub fn prune(&self) {
        let mut connections = self.connections.write();
        connections.retain(|_, open| {
            open.retain(|c| !c.tx.is_closed());
            !open.is_empty()
        });
    }
}

#[async_trait]
impl EventSink for GatewayRelay {
    async fn deliver(&self, event: &ForwardingEvent) -> Result<()> {
        self.relay(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "GatewayRelay"
    }
}
