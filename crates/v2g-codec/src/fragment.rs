//! Canonical fragment encoding for detached signatures
//!
//! The PnC flow signs selected message fragments, not whole messages.
//! The verifier must rebuild the exact octets the signer hashed, so
//! fragment encoding reuses the deterministic grammar writers and is
//! bytewise stable across runs and platforms.

use v2g_core::messages::iso2::BodyV2;
use v2g_core::messages::iso20::BodyV20;
use v2g_core::messages::Message;

use crate::bitio::BitWriter;
use crate::error::CodecError;
use crate::exi::{iso2, EXI_HEADER};

/// Canonical EXI octets of the signable fragment of `message`, or
/// `None` when the message kind carries no signed fragment.
pub fn signed_fragment(message: &Message) -> Result<Option<Vec<u8>>, CodecError> {
    match message {
        Message::V2(m) => match &m.body {
            BodyV2::AuthorizationReq(_)
            | BodyV2::MeteringReceiptReq(_)
            | BodyV2::CertificateInstallationReq(_) => {
                let mut w = BitWriter::new();
                w.write_bits(u32::from(EXI_HEADER), 8);
                iso2::write_body(&mut w, &m.body)?;
                Ok(Some(w.finish()))
            }
            _ => Ok(None),
        },
        Message::V20(m) => match &m.body {
            BodyV20::AuthorizationReq(req) => {
                // -20 signs the challenge fragment only
                let mut w = BitWriter::new();
                w.write_bits(u32::from(EXI_HEADER), 8);
                match &req.gen_challenge {
                    Some(challenge) => {
                        crate::exi::primitives::write_bytes(&mut w, challenge);
                    }
                    None => return Ok(None),
                }
                Ok(Some(w.finish()))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2g_core::messages::iso2::{AuthorizationReq, MessageV2};
    use v2g_core::session::SessionId;

    #[test]
    fn fragment_is_deterministic() {
        let msg = Message::V2(MessageV2::new(
            SessionId([1; 8]),
            BodyV2::AuthorizationReq(AuthorizationReq {
                id: Some("ID1".into()),
                gen_challenge: Some([7; 16]),
            }),
        ));
        let a = signed_fragment(&msg).unwrap().unwrap();
        let b = signed_fragment(&msg).unwrap().unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn unsigned_kinds_have_no_fragment() {
        let msg = Message::V2(MessageV2::new(
            SessionId([1; 8]),
            BodyV2::ChargingStatusReq(v2g_core::messages::iso2::ChargingStatusReq),
        ));
        assert!(signed_fragment(&msg).unwrap().is_none());
    }
}
