//! Built-in subset of the MAVLink common message set.
//!
//! Table-driven: each message is a [`MessageDef`] listing its fields in
//! over-the-wire order (MAVLink sorts fields by size before serializing, so
//! the tables below are already in wire order, not XML order). The subset
//! covers what a ground-station proxy exchanges in practice; full generated
//! dialects implement the same [`Dialect`] trait.

use super::{Dialect, EncodedMessage, Message, Value};
use crate::error::{Error, Result};

/// Wire type of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    F32,
    /// Fixed-size char array, NUL-trimmed on decode and NUL-padded on encode
    Char(usize),
}

impl FieldKind {
    fn size(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Char(n) => n,
        }
    }
}

struct FieldDef {
    name: &'static str,
    kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind }
}

struct MessageDef {
    id: u32,
    name: &'static str,
    crc_extra: u8,
    fields: &'static [FieldDef],
}

impl MessageDef {
    fn payload_len(&self) -> usize {
        self.fields.iter().map(|f| f.kind.size()).sum()
    }
}

static DEFS: &[MessageDef] = &[
    MessageDef {
        id: 0,
        name: "HEARTBEAT",
        crc_extra: 50,
        fields: &[
            field("custom_mode", FieldKind::U32),
            field("type", FieldKind::U8),
            field("autopilot", FieldKind::U8),
            field("base_mode", FieldKind::U8),
            field("system_status", FieldKind::U8),
            field("mavlink_version", FieldKind::U8),
        ],
    },
    MessageDef {
        id: 1,
        name: "SYS_STATUS",
        crc_extra: 124,
        fields: &[
            field("onboard_control_sensors_present", FieldKind::U32),
            field("onboard_control_sensors_enabled", FieldKind::U32),
            field("onboard_control_sensors_health", FieldKind::U32),
            field("load", FieldKind::U16),
            field("voltage_battery", FieldKind::U16),
            field("current_battery", FieldKind::I16),
            field("drop_rate_comm", FieldKind::U16),
            field("errors_comm", FieldKind::U16),
            field("errors_count1", FieldKind::U16),
            field("errors_count2", FieldKind::U16),
            field("errors_count3", FieldKind::U16),
            field("errors_count4", FieldKind::U16),
            field("battery_remaining", FieldKind::I8),
        ],
    },
    MessageDef {
        id: 4,
        name: "PING",
        crc_extra: 237,
        fields: &[
            field("time_usec", FieldKind::U64),
            field("seq", FieldKind::U32),
            field("target_system", FieldKind::U8),
            field("target_component", FieldKind::U8),
        ],
    },
    MessageDef {
        id: 21,
        name: "PARAM_REQUEST_LIST",
        crc_extra: 159,
        fields: &[
            field("target_system", FieldKind::U8),
            field("target_component", FieldKind::U8),
        ],
    },
    MessageDef {
        id: 30,
        name: "ATTITUDE",
        crc_extra: 39,
        fields: &[
            field("time_boot_ms", FieldKind::U32),
            field("roll", FieldKind::F32),
            field("pitch", FieldKind::F32),
            field("yaw", FieldKind::F32),
            field("rollspeed", FieldKind::F32),
            field("pitchspeed", FieldKind::F32),
            field("yawspeed", FieldKind::F32),
        ],
    },
    MessageDef {
        id: 33,
        name: "GLOBAL_POSITION_INT",
        crc_extra: 104,
        fields: &[
            field("time_boot_ms", FieldKind::U32),
            field("lat", FieldKind::I32),
            field("lon", FieldKind::I32),
            field("alt", FieldKind::I32),
            field("relative_alt", FieldKind::I32),
            field("vx", FieldKind::I16),
            field("vy", FieldKind::I16),
            field("vz", FieldKind::I16),
            field("hdg", FieldKind::U16),
        ],
    },
    MessageDef {
        id: 76,
        name: "COMMAND_LONG",
        crc_extra: 152,
        fields: &[
            field("param1", FieldKind::F32),
            field("param2", FieldKind::F32),
            field("param3", FieldKind::F32),
            field("param4", FieldKind::F32),
            field("param5", FieldKind::F32),
            field("param6", FieldKind::F32),
            field("param7", FieldKind::F32),
            field("command", FieldKind::U16),
            field("target_system", FieldKind::U8),
            field("target_component", FieldKind::U8),
            field("confirmation", FieldKind::U8),
        ],
    },
    MessageDef {
        id: 77,
        name: "COMMAND_ACK",
        crc_extra: 143,
        fields: &[
            field("command", FieldKind::U16),
            field("result", FieldKind::U8),
        ],
    },
    MessageDef {
        id: 253,
        name: "STATUSTEXT",
        crc_extra: 83,
        fields: &[
            field("severity", FieldKind::U8),
            field("text", FieldKind::Char(50)),
        ],
    },
];

/// Hand-written subset of the MAVLink common dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonDialect;

impl CommonDialect {
    fn def_by_id(message_id: u32) -> Option<&'static MessageDef> {
        DEFS.iter().find(|def| def.id == message_id)
    }

    fn def_by_name(name: &str) -> Option<&'static MessageDef> {
        DEFS.iter().find(|def| def.name == name)
    }
}

impl Dialect for CommonDialect {
    fn crc_extra(&self, message_id: u32) -> Option<u8> {
        Self::def_by_id(message_id).map(|def| def.crc_extra)
    }

    fn payload_length(&self, message_id: u32) -> Option<u8> {
        Self::def_by_id(message_id).map(|def| def.payload_len() as u8)
    }

    fn decode(&self, message_id: u32, payload: &[u8]) -> Option<Message> {
        let def = Self::def_by_id(message_id)?;
        let mut message = Message::new(def.name);
        let mut offset = 0;
        for fd in def.fields {
            let size = fd.kind.size();
            let raw = payload.get(offset..offset + size)?;
            message.fields.push((fd.name, decode_value(fd.kind, raw)));
            offset += size;
        }
        Some(message)
    }

    fn encode(&self, message: &Message) -> Result<EncodedMessage> {
        let def = Self::def_by_name(message.name).ok_or_else(|| {
            Error::ProtocolUndefined(format!("unknown message type {}", message.name))
        })?;
        let mut payload = Vec::with_capacity(def.payload_len());
        for fd in def.fields {
            let value = message.get(fd.name).ok_or_else(|| {
                Error::ProtocolUndefined(format!("{} is missing field {}", def.name, fd.name))
            })?;
            encode_value(def.name, fd, value, &mut payload)?;
        }
        Ok(EncodedMessage {
            message_id: def.id,
            payload,
            crc_extra: def.crc_extra,
            target: self.target_of(message),
        })
    }

    fn message_id(&self, name: &str) -> Option<u32> {
        Self::def_by_name(name).map(|def| def.id)
    }
}

fn decode_value(kind: FieldKind, raw: &[u8]) -> Value {
    match kind {
        FieldKind::U8 => Value::U8(raw[0]),
        FieldKind::I8 => Value::I8(raw[0] as i8),
        FieldKind::U16 => Value::U16(u16::from_le_bytes([raw[0], raw[1]])),
        FieldKind::I16 => Value::I16(i16::from_le_bytes([raw[0], raw[1]])),
        FieldKind::U32 => Value::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        FieldKind::I32 => Value::I32(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        FieldKind::F32 => Value::F32(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        FieldKind::U64 => Value::U64(u64::from_le_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ])),
        FieldKind::Char(_) => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            Value::String(String::from_utf8_lossy(&raw[..end]).to_string())
        }
    }
}

fn encode_value(message: &str, fd: &FieldDef, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (fd.kind, value) {
        (FieldKind::U8, Value::U8(v)) => out.push(*v),
        (FieldKind::I8, Value::I8(v)) => out.push(*v as u8),
        (FieldKind::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::I16, Value::I16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::I32, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::F32, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Char(n), Value::String(v)) => {
            let bytes = v.as_bytes();
            let take = bytes.len().min(n);
            out.extend_from_slice(&bytes[..take]);
            out.resize(out.len() + (n - take), 0);
        }
        _ => {
            return Err(Error::ProtocolUndefined(format!(
                "{} field {} has the wrong type",
                message, fd.name
            )))
        }
    }
    Ok(())
}

/// Builders for the common-subset messages
pub mod messages {
    use super::super::{Message, Value};

    /// HEARTBEAT (id 0)
    pub fn heartbeat(
        mav_type: u8,
        autopilot: u8,
        base_mode: u8,
        custom_mode: u32,
        system_status: u8,
    ) -> Message {
        Message::new("HEARTBEAT")
            .with("custom_mode", Value::U32(custom_mode))
            .with("type", Value::U8(mav_type))
            .with("autopilot", Value::U8(autopilot))
            .with("base_mode", Value::U8(base_mode))
            .with("system_status", Value::U8(system_status))
            .with("mavlink_version", Value::U8(3))
    }

    /// PING (id 4)
    pub fn ping(time_usec: u64, seq: u32, target_system: u8, target_component: u8) -> Message {
        Message::new("PING")
            .with("time_usec", Value::U64(time_usec))
            .with("seq", Value::U32(seq))
            .with("target_system", Value::U8(target_system))
            .with("target_component", Value::U8(target_component))
    }

    /// PARAM_REQUEST_LIST (id 21)
    pub fn param_request_list(target_system: u8, target_component: u8) -> Message {
        Message::new("PARAM_REQUEST_LIST")
            .with("target_system", Value::U8(target_system))
            .with("target_component", Value::U8(target_component))
    }

    /// ATTITUDE (id 30), angles in radians, rates in rad/s
    pub fn attitude(
        time_boot_ms: u32,
        roll: f32,
        pitch: f32,
        yaw: f32,
        rates: [f32; 3],
    ) -> Message {
        Message::new("ATTITUDE")
            .with("time_boot_ms", Value::U32(time_boot_ms))
            .with("roll", Value::F32(roll))
            .with("pitch", Value::F32(pitch))
            .with("yaw", Value::F32(yaw))
            .with("rollspeed", Value::F32(rates[0]))
            .with("pitchspeed", Value::F32(rates[1]))
            .with("yawspeed", Value::F32(rates[2]))
    }

    /// COMMAND_LONG (id 76)
    pub fn command_long(
        target_system: u8,
        target_component: u8,
        command: u16,
        confirmation: u8,
        params: [f32; 7],
    ) -> Message {
        Message::new("COMMAND_LONG")
            .with("param1", Value::F32(params[0]))
            .with("param2", Value::F32(params[1]))
            .with("param3", Value::F32(params[2]))
            .with("param4", Value::F32(params[3]))
            .with("param5", Value::F32(params[4]))
            .with("param6", Value::F32(params[5]))
            .with("param7", Value::F32(params[6]))
            .with("command", Value::U16(command))
            .with("target_system", Value::U8(target_system))
            .with("target_component", Value::U8(target_component))
            .with("confirmation", Value::U8(confirmation))
    }

    /// COMMAND_ACK (id 77)
    pub fn command_ack(command: u16, result: u8) -> Message {
        Message::new("COMMAND_ACK")
            .with("command", Value::U16(command))
            .with("result", Value::U8(result))
    }

    /// STATUSTEXT (id 253); text longer than 50 bytes is truncated
    pub fn statustext(severity: u8, text: &str) -> Message {
        Message::new("STATUSTEXT")
            .with("severity", Value::U8(severity))
            .with("text", Value::String(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::Target;
    use super::*;

    #[test]
    fn declared_payload_lengths() {
        let dialect = CommonDialect;
        for (id, len) in [
            (0, 9),
            (1, 31),
            (4, 14),
            (21, 2),
            (30, 28),
            (33, 28),
            (76, 33),
            (77, 3),
            (253, 51),
        ] {
            assert_eq!(dialect.payload_length(id), Some(len), "message id {}", id);
        }
        assert_eq!(dialect.payload_length(9999), None);
    }

    #[test]
    fn heartbeat_roundtrip() {
        let dialect = CommonDialect;
        let message = messages::heartbeat(2, 3, 81, 12345, 4);
        let encoded = dialect.encode(&message).unwrap();
        assert_eq!(encoded.message_id, 0);
        assert_eq!(encoded.crc_extra, 50);
        assert_eq!(encoded.payload.len(), 9);
        assert_eq!(encoded.target, Target::Broadcast);

        let decoded = dialect.decode(0, &encoded.payload).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn command_long_targets_component() {
        let dialect = CommonDialect;
        let message = messages::command_long(1, 1, 400, 0, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let encoded = dialect.encode(&message).unwrap();
        assert_eq!(encoded.target, Target::Component(1, 1));
        assert_eq!(encoded.payload.len(), 33);
        // wire order puts the command word right after the seven params
        assert_eq!(
            u16::from_le_bytes([encoded.payload[28], encoded.payload[29]]),
            400
        );
    }

    #[test]
    fn statustext_trims_and_pads() {
        let dialect = CommonDialect;
        let encoded = dialect.encode(&messages::statustext(6, "arming")).unwrap();
        assert_eq!(encoded.payload.len(), 51);
        let decoded = dialect.decode(253, &encoded.payload).unwrap();
        assert_eq!(decoded.get_str("text"), Some("arming"));
        assert_eq!(decoded.get_u8("severity"), Some(6));
    }

    #[test]
    fn encode_rejects_missing_field() {
        let dialect = CommonDialect;
        let incomplete = Message::new("COMMAND_ACK").with("command", Value::U16(400));
        assert!(matches!(
            dialect.encode(&incomplete),
            Err(Error::ProtocolUndefined(_))
        ));
    }

    #[test]
    fn encode_rejects_unknown_type() {
        let dialect = CommonDialect;
        assert!(matches!(
            dialect.encode(&Message::new("NOT_A_MESSAGE")),
            Err(Error::ProtocolUndefined(_))
        ));
    }

    #[test]
    fn decode_short_payload_fails() {
        let dialect = CommonDialect;
        assert!(dialect.decode(0, &[0u8; 4]).is_none());
    }
}
