//! MAVLink wire protocol: checksum, framing, parsing.
//!
//! Frame layout (v1): `0xFE len seq sys comp msgid payload crc_lo crc_hi`
//! Frame layout (v2): `0xFD len incompat compat seq sys comp msgid[3]
//! payload crc_lo crc_hi [signature[13]]`

pub mod crc;
pub mod frame;
pub mod parser;

pub use frame::{Frame, MavVersion};
pub use parser::{Parser, ParserStats};

/// Start marker for MAVLink v1 frames
pub const STX_V1: u8 = 0xFE;

/// Start marker for MAVLink v2 frames
pub const STX_V2: u8 = 0xFD;

/// Incompat flag bit: the frame carries a 13-byte signature trailer
pub const IFLAG_SIGNED: u8 = 0x01;

/// Length of the v2 signature trailer
pub const SIGNATURE_LEN: usize = 13;

/// v1 header bytes after the start marker: len, seq, sys, comp, msgid
pub const V1_HEADER_LEN: usize = 5;

/// v2 header bytes after the start marker: len, incompat, compat, seq, sys,
/// comp, msgid (3 bytes little-endian)
pub const V2_HEADER_LEN: usize = 9;
