//! EXI stream encoding and decoding
//!
//! Every stream starts with the default EXI header octet, then the
//! document grammar for the namespace the V2GTP payload type selects.
//! For `0x8001` payloads the root element distinguishes the SAP
//! handshake from an ISO 15118-2 V2G_Message; `0x8002` payloads carry
//! one -20 root element per message.

pub mod iso2;
pub mod iso20;
pub mod primitives;
pub mod sap;

use v2g_core::dialect::{payload_type, Dialect};
use v2g_core::messages::Message;

use crate::bitio::{BitReader, BitWriter};
use crate::error::CodecError;

/// Default EXI header: distinguishing bits `10`, no options, final
/// version. One octet, value 0x80.
pub const EXI_HEADER: u8 = 0x80;

const ROOT_SAP_REQ: u32 = 0;
const ROOT_SAP_RES: u32 = 1;
const ROOT_V2G_MESSAGE: u32 = 2;
const ROOT_BITS: u8 = 2;

/// Serialize a message to its EXI stream (header octet included) and
/// report the V2GTP payload type it must travel under.
pub fn to_exi(message: &Message) -> Result<(u16, Vec<u8>), CodecError> {
    let mut w = BitWriter::new();
    w.write_bits(u32::from(EXI_HEADER), 8);
    let payload_type = match message {
        Message::SupportedAppProtocolReq(req) => {
            w.write_bits(ROOT_SAP_REQ, ROOT_BITS);
            sap::write_req(&mut w, req)?;
            payload_type::EXI_SAP_V2
        }
        Message::SupportedAppProtocolRes(res) => {
            w.write_bits(ROOT_SAP_RES, ROOT_BITS);
            sap::write_res(&mut w, res)?;
            payload_type::EXI_SAP_V2
        }
        Message::V2(m) => {
            w.write_bits(ROOT_V2G_MESSAGE, ROOT_BITS);
            iso2::write_message(&mut w, m)?;
            payload_type::EXI_SAP_V2
        }
        Message::V20(m) => {
            iso20::write_message(&mut w, m)?;
            payload_type::EXI_V20
        }
    };
    Ok((payload_type, w.finish()))
}

/// Decode an EXI stream under the grammar the payload type names.
/// Returns the wire dialect alongside the message (SAP handshake
/// messages travel under the -2 payload type).
pub fn from_exi(payload_type_id: u16, bytes: &[u8]) -> Result<(Dialect, Message), CodecError> {
    let mut r = BitReader::new(bytes);
    let header = r.read_bits(8)?;
    if header as u8 != EXI_HEADER {
        return Err(CodecError::BadExiHeader(header as u8));
    }
    let decoded = match payload_type_id {
        payload_type::EXI_SAP_V2 => {
            let message = match r.read_bits(ROOT_BITS)? {
                ROOT_SAP_REQ => Message::SupportedAppProtocolReq(sap::read_req(&mut r)?),
                ROOT_SAP_RES => Message::SupportedAppProtocolRes(sap::read_res(&mut r)?),
                ROOT_V2G_MESSAGE => Message::V2(iso2::read_message(&mut r)?),
                code => {
                    return Err(CodecError::UnknownEventCode {
                        context: "document root",
                        code,
                    })
                }
            };
            (Dialect::Iso2, message)
        }
        payload_type::EXI_V20 => (Dialect::Iso20, Message::V20(iso20::read_message(&mut r)?)),
        other => return Err(CodecError::UnknownPayloadType(other)),
    };
    if !r.only_padding_left() {
        return Err(CodecError::TrailingData(r.remaining_bits() / 8));
    }
    Ok(decoded)
}
