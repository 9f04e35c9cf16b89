//! Codec error type

use thiserror::Error;

/// Malformed V2GTP frame or EXI bitstream. Session-fatal: the caller
/// closes the connection without responding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("V2GTP frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("V2GTP version mismatch: {version:#04x}/{inverse:#04x}")]
    VersionMismatch { version: u8, inverse: u8 },

    #[error("V2GTP length {declared} does not match body length {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("V2GTP payload of {len} bytes exceeds the dialect maximum {max}")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("unknown V2GTP payload type {0:#06x}")]
    UnknownPayloadType(u16),

    #[error("EXI stream ended unexpectedly")]
    UnexpectedEnd,

    #[error("missing or unsupported EXI header byte {0:#04x}")]
    BadExiHeader(u8),

    #[error("unknown event code {code} for {context}")]
    UnknownEventCode { context: &'static str, code: u32 },

    #[error("enumeration index {index} out of range for {context}")]
    InvalidEnum { context: &'static str, index: u32 },

    #[error("unsigned integer overflows 64 bits")]
    UintOverflow,

    #[error("value {value} out of schema range for {context}")]
    ValueOutOfRange { context: &'static str, value: i64 },

    #[error("invalid UTF-8 in string value")]
    InvalidString,

    #[error("message {0} cannot be encoded in the selected dialect")]
    DialectMismatch(&'static str),

    #[error("trailing {0} bytes after EXI end of document")]
    TrailingData(usize),
}
