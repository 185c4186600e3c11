//! Byte-stream framing state machine.
//!
//! One `Parser` instance per inbound connection. Bytes are fed as they
//! arrive off the transport; the parser hunts for a start marker, collects
//! header, payload, checksum and (for signed v2 frames) the signature
//! trailer, and emits only frames whose checksum verified against the
//! dialect's CRC_EXTRA.
//!
//! Message ids the dialect does not know are dropped: without a CRC_EXTRA
//! the checksum cannot be checked, and unverified frames must never
//! propagate. On any validation failure the parser returns to hunting and
//! re-examines the offending byte as a potential start marker, so a single
//! corrupt frame cannot desynchronize the stream.

use crate::dialect::{Dialect, Target};
use crate::protocol::frame::{Frame, MavVersion};
use crate::protocol::{crc, IFLAG_SIGNED, SIGNATURE_LEN, STX_V1, STX_V2, V1_HEADER_LEN, V2_HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Hunting for a start marker
    Idle,
    /// Collecting the 5-byte v1 or 9-byte v2 header
    Header,
    /// Collecting `len` payload bytes
    Payload,
    ChecksumLo,
    ChecksumHi,
    /// Collecting and discarding the 13-byte signature trailer
    Signature,
}

/// Per-connection parse counters for diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserStats {
    pub frames: u64,
    pub checksum_failures: u64,
    pub unknown_dropped: u64,
}

pub struct Parser {
    state: State,
    version: MavVersion,
    /// Header and payload bytes after the start marker (the checksum input)
    buf: Vec<u8>,
    header_len: usize,
    payload_len: usize,
    crc_lo: u8,
    /// Verified frame waiting for its signature trailer to be consumed
    pending: Option<Frame>,
    signature_read: usize,
    stats: ParserStats,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            version: MavVersion::V1,
            buf: Vec::with_capacity(V2_HEADER_LEN + 255),
            header_len: 0,
            payload_len: 0,
            crc_lo: 0,
            pending: None,
            signature_read: 0,
            stats: ParserStats::default(),
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Feed a chunk of bytes; returns completed frames in arrival order.
    pub fn push_bytes(&mut self, bytes: &[u8], dialect: &dyn Dialect) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.push(byte, dialect) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Feed a single byte
    pub fn push(&mut self, byte: u8, dialect: &dyn Dialect) -> Option<Frame> {
        match self.state {
            State::Idle => {
                self.on_idle(byte);
                None
            }
            State::Header => {
                self.buf.push(byte);
                if self.buf.len() == self.header_len {
                    self.payload_len = self.buf[0] as usize;
                    self.state = if self.payload_len == 0 {
                        State::ChecksumLo
                    } else {
                        State::Payload
                    };
                }
                None
            }
            State::Payload => {
                self.buf.push(byte);
                if self.buf.len() == self.header_len + self.payload_len {
                    self.state = State::ChecksumLo;
                }
                None
            }
            State::ChecksumLo => {
                self.crc_lo = byte;
                self.state = State::ChecksumHi;
                None
            }
            State::ChecksumHi => self.on_checksum_hi(byte, dialect),
            State::Signature => {
                self.signature_read += 1;
                if self.signature_read == SIGNATURE_LEN {
                    self.state = State::Idle;
                    return self.pending.take();
                }
                None
            }
        }
    }

    fn on_idle(&mut self, byte: u8) {
        match byte {
            STX_V1 => self.begin(MavVersion::V1, V1_HEADER_LEN),
            STX_V2 => self.begin(MavVersion::V2, V2_HEADER_LEN),
            _ => {}
        }
    }

    fn begin(&mut self, version: MavVersion, header_len: usize) {
        self.version = version;
        self.header_len = header_len;
        self.buf.clear();
        self.state = State::Header;
    }

    fn on_checksum_hi(&mut self, byte: u8, dialect: &dyn Dialect) -> Option<Frame> {
        let received = u16::from_le_bytes([self.crc_lo, byte]);
        let message_id = self.message_id();

        let Some(crc_extra) = dialect.crc_extra(message_id) else {
            self.stats.unknown_dropped += 1;
            log::debug!("dropping frame with unknown message id {}", message_id);
            return self.resync(byte);
        };

        let computed = crc::checksum_with_extra(&self.buf, crc_extra);
        if computed != received {
            self.stats.checksum_failures += 1;
            log::debug!(
                "checksum mismatch for message id {} (got {:04X}, want {:04X})",
                message_id,
                received,
                computed
            );
            return self.resync(byte);
        }

        let frame = self.build_frame(crc_extra, received, dialect);
        self.stats.frames += 1;

        if self.version == MavVersion::V2 && self.incompat_flags() & IFLAG_SIGNED != 0 {
            // signature follows the checksum; skip it so the stream stays
            // in sync, then emit the frame (no HMAC verification)
            self.pending = Some(frame);
            self.signature_read = 0;
            self.state = State::Signature;
            return None;
        }

        self.state = State::Idle;
        Some(frame)
    }

    /// Drop the frame in progress and re-examine `byte` as a start marker
    fn resync(&mut self, byte: u8) -> Option<Frame> {
        self.state = State::Idle;
        self.on_idle(byte);
        None
    }

    fn message_id(&self) -> u32 {
        match self.version {
            MavVersion::V1 => self.buf[4] as u32,
            MavVersion::V2 => u32::from_le_bytes([self.buf[6], self.buf[7], self.buf[8], 0]),
        }
    }

    fn incompat_flags(&self) -> u8 {
        match self.version {
            MavVersion::V1 => 0,
            MavVersion::V2 => self.buf[1],
        }
    }

    fn build_frame(&self, crc_extra: u8, checksum: u16, dialect: &dyn Dialect) -> Frame {
        let (incompat_flags, compat_flags, sequence, source_system, source_component) =
            match self.version {
                MavVersion::V1 => (0, 0, self.buf[1], self.buf[2], self.buf[3]),
                MavVersion::V2 => (
                    self.buf[1],
                    self.buf[2],
                    self.buf[3],
                    self.buf[4],
                    self.buf[5],
                ),
            };
        let message_id = self.message_id();

        // zero-extend truncated v2 payloads to the declared length before
        // field extraction
        let mut payload = self.buf[self.header_len..].to_vec();
        if let Some(declared) = dialect.payload_length(message_id) {
            if payload.len() < declared as usize {
                payload.resize(declared as usize, 0);
            }
        }

        let message = dialect.decode(message_id, &payload);
        let target = message
            .as_ref()
            .map(|m| dialect.target_of(m))
            .unwrap_or(Target::Broadcast);

        Frame {
            version: self.version,
            incompat_flags,
            compat_flags,
            sequence,
            source_system,
            source_component,
            message_id,
            payload,
            crc_extra,
            checksum,
            target,
            message,
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
