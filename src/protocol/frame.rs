//! MAVLink frame value type and serializer.

use crate::dialect::{EncodedMessage, Message, Target};
use crate::protocol::{crc, IFLAG_SIGNED, STX_V1, STX_V2};

/// Protocol version of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MavVersion {
    V1,
    V2,
}

/// A validated inbound frame or a to-be-serialized outbound frame.
///
/// Frames produced by the parser always carry a checksum that verified
/// against the dialect's CRC_EXTRA; frames that fail validation are dropped
/// before construction and never reach routing.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub version: MavVersion,
    /// v2 incompat flags; 0 on v1 frames
    pub incompat_flags: u8,
    /// v2 compat flags; 0 on v1 frames
    pub compat_flags: u8,
    pub sequence: u8,
    pub source_system: u8,
    pub source_component: u8,
    /// 24-bit on v2, 8-bit on v1
    pub message_id: u32,
    /// Payload zero-extended to the dialect's declared length
    pub payload: Vec<u8>,
    /// Per-message CRC_EXTRA byte supplied by the dialect
    pub crc_extra: u8,
    /// Checksum as transmitted (inbound) or as it will be transmitted
    pub checksum: u16,
    /// Addressing mode derived from the decoded message
    pub target: Target,
    /// Decoded message; `None` routes as an unknown message
    pub message: Option<Message>,
}

impl Frame {
    /// Build an outbound frame from an encoded message, stamping the header
    /// fields the local connection owns.
    pub fn from_encoded(
        version: MavVersion,
        sequence: u8,
        source_system: u8,
        source_component: u8,
        encoded: EncodedMessage,
        message: Message,
    ) -> Self {
        let mut frame = Frame {
            version,
            incompat_flags: 0,
            compat_flags: 0,
            sequence,
            source_system,
            source_component,
            message_id: encoded.message_id,
            payload: encoded.payload,
            crc_extra: encoded.crc_extra,
            checksum: 0,
            target: encoded.target,
            message: Some(message),
        };
        frame.checksum = frame.wire_checksum();
        frame
    }

    /// Serialize to wire bytes.
    ///
    /// v2 payloads have trailing zero bytes truncated (the first payload
    /// byte is never truncated). The signed incompat bit is masked out: the
    /// router never emits signatures, and forwarding the flag without the
    /// trailer would desynchronize receivers.
    pub fn pack(&self) -> Vec<u8> {
        match self.version {
            MavVersion::V1 => self.pack_v1(),
            MavVersion::V2 => self.pack_v2(),
        }
    }

    /// Checksum of this frame's serialized form
    pub fn wire_checksum(&self) -> u16 {
        let bytes = self.pack();
        u16::from_le_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]])
    }

    fn pack_v1(&self) -> Vec<u8> {
        debug_assert!(self.message_id <= u8::MAX as u32);
        let mut out = Vec::with_capacity(8 + self.payload.len());
        out.push(STX_V1);
        out.push(self.payload.len() as u8);
        out.push(self.sequence);
        out.push(self.source_system);
        out.push(self.source_component);
        out.push(self.message_id as u8);
        out.extend_from_slice(&self.payload);
        push_checksum(&mut out, self.crc_extra);
        out
    }

    fn pack_v2(&self) -> Vec<u8> {
        let payload = truncate_payload(&self.payload);
        let mut out = Vec::with_capacity(12 + payload.len());
        out.push(STX_V2);
        out.push(payload.len() as u8);
        out.push(self.incompat_flags & !IFLAG_SIGNED);
        out.push(self.compat_flags);
        out.push(self.sequence);
        out.push(self.source_system);
        out.push(self.source_component);
        let id = self.message_id.to_le_bytes();
        out.extend_from_slice(&id[..3]);
        out.extend_from_slice(payload);
        push_checksum(&mut out, self.crc_extra);
        out
    }
}

fn push_checksum(out: &mut Vec<u8>, crc_extra: u8) {
    let crc = crc::checksum_with_extra(&out[1..], crc_extra);
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Trailing-zero truncation for v2 payloads. At least one byte of a
/// non-empty payload is kept.
fn truncate_payload(payload: &[u8]) -> &[u8] {
    let mut len = payload.len();
    while len > 1 && payload[len - 1] == 0 {
        len -= 1;
    }
    &payload[..len]
}
