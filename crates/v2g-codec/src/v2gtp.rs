//! V2GTP datagram framing (ISO 15118-2 clause 7.8 / -20 clause 12)
//!
//! Header layout, big-endian: `0x01 | 0xFE | payload_type(2) | length(4)`.

use v2g_core::dialect::payload_type;

use crate::error::CodecError;

pub const V2GTP_VERSION: u8 = 0x01;
pub const V2GTP_INVERSE_VERSION: u8 = 0xFE;
pub const V2GTP_HEADER_LEN: usize = 8;

/// A framed V2GTP datagram: payload type plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2gtpFrame {
    pub payload_type: u16,
    pub payload: Vec<u8>,
}

impl V2gtpFrame {
    pub fn new(payload_type: u16, payload: Vec<u8>) -> Self {
        Self {
            payload_type,
            payload,
        }
    }

    /// Serialize header + body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(V2GTP_HEADER_LEN + self.payload.len());
        out.push(V2GTP_VERSION);
        out.push(V2GTP_INVERSE_VERSION);
        out.extend_from_slice(&self.payload_type.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a complete datagram, rejecting version, length, and
    /// payload-type violations.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (header, payload) = parse_header(bytes)?;
        if payload.len() != header.payload_len as usize {
            return Err(CodecError::LengthMismatch {
                declared: header.payload_len,
                actual: payload.len(),
            });
        }
        Ok(Self {
            payload_type: header.payload_type,
            payload: payload.to_vec(),
        })
    }
}

/// The validated fields of a V2GTP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V2gtpHeader {
    pub payload_type: u16,
    pub payload_len: u32,
}

/// Validate the leading eight bytes and return the header plus the rest
/// of the input. Streaming reads use this to learn how many body bytes
/// to wait for.
pub fn parse_header(bytes: &[u8]) -> Result<(V2gtpHeader, &[u8]), CodecError> {
    if bytes.len() < V2GTP_HEADER_LEN {
        return Err(CodecError::FrameTooShort(bytes.len()));
    }
    let version = bytes[0];
    let inverse = bytes[1];
    if version != V2GTP_VERSION || inverse != V2GTP_INVERSE_VERSION {
        return Err(CodecError::VersionMismatch { version, inverse });
    }
    let ptype = u16::from_be_bytes([bytes[2], bytes[3]]);
    if !matches!(
        ptype,
        payload_type::EXI_SAP_V2
            | payload_type::EXI_V20
            | payload_type::SDP_REQUEST
            | payload_type::SDP_RESPONSE
    ) {
        return Err(CodecError::UnknownPayloadType(ptype));
    }
    let len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((
        V2gtpHeader {
            payload_type: ptype,
            payload_len: len,
        },
        &bytes[V2GTP_HEADER_LEN..],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = V2gtpFrame::new(payload_type::EXI_SAP_V2, vec![0x80, 0x01, 0x02]);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), V2GTP_HEADER_LEN + 3);
        assert_eq!(V2gtpFrame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn rejects_bad_version_pair() {
        let mut bytes = V2gtpFrame::new(payload_type::SDP_REQUEST, vec![0x10, 0x00]).to_bytes();
        bytes[1] = 0xFF;
        assert!(matches!(
            V2gtpFrame::from_bytes(&bytes),
            Err(CodecError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut bytes = V2gtpFrame::new(payload_type::EXI_V20, vec![1, 2, 3, 4]).to_bytes();
        bytes[7] = 9;
        assert!(matches!(
            V2gtpFrame::from_bytes(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unknown_payload_type() {
        let mut bytes = V2gtpFrame::new(payload_type::EXI_SAP_V2, vec![]).to_bytes();
        bytes[2] = 0x70;
        assert!(matches!(
            V2gtpFrame::from_bytes(&bytes),
            Err(CodecError::UnknownPayloadType(_))
        ));
    }
}
