//! Grammar for the SupportedAppProtocol namespace

use v2g_core::dialect::AppProtocol;
use v2g_core::messages::app_protocol::{
    SapResponseCode, SupportedAppProtocolReq, SupportedAppProtocolRes,
};

use super::primitives::*;
use crate::bitio::{BitReader, BitWriter};
use crate::error::CodecError;

const SAP_RESPONSE_CODES: &[SapResponseCode] = &[
    SapResponseCode::OkSuccessfulNegotiation,
    SapResponseCode::OkSuccessfulNegotiationWithMinorDeviation,
    SapResponseCode::FailedNoNegotiation,
];

fn write_app_protocol(w: &mut BitWriter, p: &AppProtocol) -> Result<(), CodecError> {
    write_string(w, &p.namespace);
    write_u32(w, p.version_major);
    write_u32(w, p.version_minor);
    write_u8(w, p.schema_id);
    write_u8(w, p.priority);
    Ok(())
}

fn read_app_protocol(r: &mut BitReader) -> Result<AppProtocol, CodecError> {
    Ok(AppProtocol {
        namespace: read_string(r)?,
        version_major: read_u32(r, "AppProtocol.VersionNumberMajor")?,
        version_minor: read_u32(r, "AppProtocol.VersionNumberMinor")?,
        schema_id: read_u8(r, "AppProtocol.SchemaID")?,
        priority: read_u8(r, "AppProtocol.Priority")?,
    })
}

pub fn write_req(w: &mut BitWriter, req: &SupportedAppProtocolReq) -> Result<(), CodecError> {
    // The schema bounds the list at 20 entries
    if req.app_protocols.is_empty() || req.app_protocols.len() > 20 {
        return Err(CodecError::ValueOutOfRange {
            context: "supportedAppProtocolReq.AppProtocol",
            value: req.app_protocols.len() as i64,
        });
    }
    write_list(w, &req.app_protocols, write_app_protocol)
}

pub fn read_req(r: &mut BitReader) -> Result<SupportedAppProtocolReq, CodecError> {
    let app_protocols = read_list(r, 20, "supportedAppProtocolReq.AppProtocol", read_app_protocol)?;
    if app_protocols.is_empty() {
        return Err(CodecError::ValueOutOfRange {
            context: "supportedAppProtocolReq.AppProtocol",
            value: 0,
        });
    }
    Ok(SupportedAppProtocolReq { app_protocols })
}

pub fn write_res(w: &mut BitWriter, res: &SupportedAppProtocolRes) -> Result<(), CodecError> {
    write_enum(w, SAP_RESPONSE_CODES, res.response_code, "SAP ResponseCode")?;
    write_option(w, &res.schema_id, |w, id| write_u8(w, *id));
    Ok(())
}

pub fn read_res(r: &mut BitReader) -> Result<SupportedAppProtocolRes, CodecError> {
    Ok(SupportedAppProtocolRes {
        response_code: read_enum(r, SAP_RESPONSE_CODES, "SAP ResponseCode")?,
        schema_id: read_option(r, |r| read_u8(r, "supportedAppProtocolRes.SchemaID"))?,
    })
}
