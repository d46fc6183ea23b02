//! Exact-address message routing.
//!
//! Decouples protocol parsing from business logic: each subscriber gets
//! its own channel keyed by one address string. There is no wildcard or
//! prefix matching; callers needing related-but-distinct notifications
//! register one subscription per address.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use rosc::OscMessage;

/// Subscription handle for one address.
///
/// Dropping the handle ends the subscription; the dead channel is pruned
/// on the next matching delivery.
pub struct Route {
    id: u64,
    address: String,
    rx: Receiver<OscMessage>,
}

impl Route {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next queued message for this subscription, if any.
    pub fn try_recv(&self) -> Option<OscMessage> {
        self.rx.try_recv().ok()
    }
}

/// Routes inbound messages to subscribers by exact address.
pub struct OscRouter {
    routes: HashMap<String, Vec<(u64, Sender<OscMessage>)>>,
    next_id: u64,
}

impl OscRouter {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            next_id: 0,
        }
    }

    /// Subscribe to one exact address. All subscriptions for an address
    /// receive every matching message, in registration order.
    pub fn on(&mut self, address: &str) -> Route {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = mpsc::channel();
        self.routes
            .entry(address.to_string())
            .or_default()
            .push((id, tx));
        Route {
            id,
            address: address.to_string(),
            rx,
        }
    }

    /// Remove exactly one subscription. The last removal for an address
    /// frees the address entry.
    pub fn unsubscribe(&mut self, route: Route) {
        if let Some(entries) = self.routes.get_mut(&route.address) {
            entries.retain(|(id, _)| *id != route.id);
            if entries.is_empty() {
                self.routes.remove(&route.address);
            }
        }
    }

    /// Deliver a message to every subscriber of its address. Returns the
    /// number of subscriptions that received it.
    pub fn route(&mut self, msg: &OscMessage) -> usize {
        let Some(entries) = self.routes.get_mut(&msg.addr) else {
            return 0;
        };
        entries.retain(|(_, tx)| tx.send(msg.clone()).is_ok());
        let delivered = entries.len();
        if delivered == 0 {
            self.routes.remove(&msg.addr);
        }
        delivered
    }
}

impl Default for OscRouter {
    fn default() -> Self {
        Self::new()
    }
}
