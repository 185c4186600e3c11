//! The in-process connection: subscription set, query matcher, and the
//! outbound sequence counter for locally originated frames.

use super::subscription::{Delivery, Query, SubscriberHandle, SubscriberId, Subscription};
use crate::dialect::{Message, Target, UNKNOWN_MESSAGE};
use crate::protocol::Frame;

pub struct LocalConnection {
    pub system: u8,
    pub component: u8,
    sequence: u8,
    subscriptions: Vec<Subscription>,
}

impl LocalConnection {
    pub fn new(system: u8, component: u8) -> Self {
        Self {
            system,
            component,
            sequence: 0,
            subscriptions: Vec::new(),
        }
    }

    /// Next outbound sequence number. The counter is the full 8-bit wire
    /// field: 255 wraps to 0.
    pub fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    /// Add a subscription; identical `(query, handle)` pairs are kept once.
    /// Returns false if it was already present.
    pub fn subscribe(&mut self, query: Query, handle: SubscriberHandle) -> bool {
        let duplicate = self
            .subscriptions
            .iter()
            .any(|sub| sub.handle.id() == handle.id() && sub.query == query);
        if duplicate {
            return false;
        }
        self.subscriptions.push(Subscription { query, handle });
        true
    }

    /// Remove every subscription for a handle; returns true if any existed
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.handle.id() != id);
        self.subscriptions.len() != before
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Deliver a frame to every matching subscription. Subscribers found
    /// dead during delivery are pruned; their ids are returned so the
    /// router can drop monitors and rewrite the cache.
    pub fn deliver(&mut self, frame: &Frame) -> Vec<SubscriberId> {
        let mut dead = Vec::new();
        for sub in &self.subscriptions {
            if dead.contains(&sub.handle.id()) || !matches(&sub.query, frame) {
                continue;
            }
            let delivery = if sub.query.as_frame {
                Delivery::Frame(frame.clone())
            } else {
                Delivery::Message(
                    frame
                        .message
                        .clone()
                        .unwrap_or_else(|| Message::unknown(frame.message_id)),
                )
            };
            if sub.handle.deliver(delivery).is_err() {
                log::debug!("subscriber {} gone, pruning", sub.handle.id());
                dead.push(sub.handle.id());
            }
        }
        for id in &dead {
            self.unsubscribe(*id);
        }
        dead
    }
}

/// Query matcher. A frame is delivered iff every constraint holds; zero ids
/// and `None` message type are wildcards. Target constraints require the
/// frame to actually carry the corresponding target field.
fn matches(query: &Query, frame: &Frame) -> bool {
    if let Some(want) = query.message_type.as_deref() {
        let have = frame
            .message
            .as_ref()
            .map(|m| m.name)
            .unwrap_or(UNKNOWN_MESSAGE);
        if want != have {
            return false;
        }
    }
    if query.source_system != 0 && query.source_system != frame.source_system {
        return false;
    }
    if query.source_component != 0 && query.source_component != frame.source_component {
        return false;
    }
    if query.target_system != 0 {
        let ok = match frame.target {
            Target::System(system) | Target::Component(system, _) => system == query.target_system,
            Target::Broadcast => false,
        };
        if !ok {
            return false;
        }
    }
    if query.target_component != 0 {
        let ok = match frame.target {
            Target::Component(_, component) => component == query.target_component,
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    true
}
