//! Dialect abstraction - per-message wire knowledge supplied externally.
//!
//! The router itself is dialect-agnostic: everything it needs to know about
//! message ids (CRC_EXTRA bytes, declared payload lengths, field layouts,
//! target addressing) comes through the [`Dialect`] trait. Generated
//! dialects plug in here; [`common::CommonDialect`] provides a hand-written
//! subset of the MAVLink common set.

pub mod common;

use crate::error::Result;

/// Type-tag name used for frames whose message the dialect cannot decode
pub const UNKNOWN_MESSAGE: &str = "UNKNOWN";

/// Addressing mode of a message, derived from its target fields.
///
/// Messages without `target_system`/`target_component` fields are broadcast;
/// a zero in a target field means "any" and is resolved during routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Broadcast,
    System(u8),
    Component(u8, u8),
}

/// Typed field value of a decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// A decoded (or to-be-encoded) message: a type tag plus named fields in
/// wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub name: &'static str,
    pub fields: Vec<(&'static str, Value)>,
}

impl Message {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Sentinel for frames the dialect could not decode
    pub fn unknown(message_id: u32) -> Self {
        Message::new(UNKNOWN_MESSAGE).with("message_id", Value::U32(message_id))
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_MESSAGE
    }

    /// Builder-style field setter
    pub fn with(mut self, field: &'static str, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field (create or update in-place)
    pub fn set(&mut self, field: &'static str, value: Value) {
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
        } else {
            self.fields.push((field, value));
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    pub fn get_u8(&self, field: &str) -> Option<u8> {
        match self.get(field) {
            Some(Value::U8(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u16(&self, field: &str) -> Option<u16> {
        match self.get(field) {
            Some(Value::U16(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, field: &str) -> Option<u32> {
        match self.get(field) {
            Some(Value::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        match self.get(field) {
            Some(Value::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f32(&self, field: &str) -> Option<f32> {
        match self.get(field) {
            Some(Value::F32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.get(field) {
            Some(Value::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// A message encoded for transmission
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    pub message_id: u32,
    pub payload: Vec<u8>,
    pub crc_extra: u8,
    pub target: Target,
}

/// Bit-level knowledge of a MAVLink message set.
///
/// Implementations are shared across the router thread and callers of
/// `pack_and_send`, hence `Send + Sync`.
pub trait Dialect: Send + Sync {
    /// CRC_EXTRA byte for a message id; `None` means the id is unknown and
    /// frames carrying it cannot be validated.
    fn crc_extra(&self, message_id: u32) -> Option<u8>;

    /// Declared (untruncated) payload length for a message id
    fn payload_length(&self, message_id: u32) -> Option<u8>;

    /// Decode a zero-extended payload into a message. `None` when the id or
    /// layout is unknown; such frames still route as [`UNKNOWN_MESSAGE`].
    fn decode(&self, message_id: u32, payload: &[u8]) -> Option<Message>;

    /// Encode a message into id, payload, CRC_EXTRA and target
    fn encode(&self, message: &Message) -> Result<EncodedMessage>;

    /// Message id for a type name; used to validate subscription queries
    fn message_id(&self, name: &str) -> Option<u32>;

    /// Addressing mode of a decoded message, read from its target fields
    fn target_of(&self, message: &Message) -> Target {
        match (
            message.get_u8("target_system"),
            message.get_u8("target_component"),
        ) {
            (Some(system), Some(component)) => Target::Component(system, component),
            (Some(system), None) => Target::System(system),
            _ => Target::Broadcast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_set_updates_in_place() {
        let mut message = Message::new("HEARTBEAT").with("type", Value::U8(2));
        message.set("type", Value::U8(6));
        assert_eq!(message.get_u8("type"), Some(6));
        assert_eq!(message.fields.len(), 1);
    }

    #[test]
    fn unknown_sentinel_carries_id() {
        let message = Message::unknown(4242);
        assert!(message.is_unknown());
        assert_eq!(message.get_u32("message_id"), Some(4242));
    }
}
