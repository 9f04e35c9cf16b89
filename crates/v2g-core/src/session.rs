//! Session identity, lifecycle records, and the stop diagnostic

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FaultKind;

/// The 8-byte session identifier assigned by the SECC on the first
/// response and echoed on every subsequent message in both directions.
///
/// The all-zero id is the placeholder the EVCC sends in SessionSetupReq
/// before an id has been assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionId(pub [u8; 8]);

impl SessionId {
    pub const ZERO: SessionId = SessionId([0; 8]);

    /// Fresh random id for a newly established session.
    pub fn random() -> Self {
        SessionId(rand::thread_rng().gen())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 8]
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Upper-case hex rendering, the form the id takes in logs and in
    /// the external session mirror key.
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(16);
        for b in self.0 {
            let _ = write!(s, "{:02X}", b);
        }
        s
    }

    /// Parse the 16-hex-char rendering back; `None` on anything else.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 8];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            bytes[i] = (hex_val(chunk[0])? << 4) | hex_val(chunk[1])?;
        }
        Some(SessionId(bytes))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for SessionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SessionId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("session id must be 16 hex chars"))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Why and how a session ended. Exactly one of these is produced per
/// session and emitted as the structured diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReason {
    pub session_id: SessionId,
    /// Name of the state the session was in when it stopped
    pub state: String,
    /// `None` for a graceful stop
    pub kind: Option<FaultKind>,
    pub detail: String,
}

impl StopReason {
    pub fn graceful(session_id: SessionId, state: &str, detail: impl Into<String>) -> Self {
        Self {
            session_id,
            state: state.to_string(),
            kind: None,
            detail: detail.into(),
        }
    }

    pub fn fault(
        session_id: SessionId,
        state: &str,
        kind: FaultKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            state: state.to_string(),
            kind: Some(kind),
            detail: detail.into(),
        }
    }

    pub fn is_graceful(&self) -> bool {
        self.kind.is_none()
    }
}

/// Lifecycle phase of a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Active,
    Paused,
    Terminated,
}

/// The session-scoped facts the store keeps (and mirrors externally):
/// enough for an operator to observe a session without touching the
/// owning task's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    /// "iso2" or "iso20"; None until SAP negotiation completes
    pub dialect: Option<String>,
    pub phase: SessionPhase,
    /// Current (or final) state-machine state name
    pub state: String,
    pub tls: bool,
    /// EVCC identifier as reported in SessionSetup
    pub evcc_id: Option<String>,
    /// Selected energy transfer mode, once negotiated
    pub energy_mode: Option<String>,
    /// Selected authorization method, once negotiated
    pub auth_method: Option<String>,
    /// Accepted schedule tuple id, once PowerDelivery(Start) succeeded
    pub schedule_tuple_id: Option<u8>,
    /// Unix epoch seconds at session creation
    pub started_at: u64,
    /// Populated on termination
    pub stop: Option<StopReason>,
}

impl SessionRecord {
    pub fn new(session_id: SessionId, tls: bool, started_at: u64) -> Self {
        Self {
            session_id,
            dialect: None,
            phase: SessionPhase::Active,
            state: "SessionSetup".to_string(),
            tls,
            evcc_id: None,
            energy_mode: None,
            auth_method: None,
            schedule_tuple_id: None,
            started_at,
            stop: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct_and_nonzero() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn hex_round_trip() {
        let id = SessionId([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03]);
        assert_eq!(id.to_hex(), "DEADBEEF00010203");
        assert_eq!(SessionId::from_hex(&id.to_hex()), Some(id));
        assert_eq!(SessionId::from_hex("deadbeef00010203"), Some(id));
        assert_eq!(SessionId::from_hex("nope"), None);
        assert_eq!(SessionId::from_hex("ZZADBEEF00010203"), None);
        let json = serde_json::to_string(&id).unwrap();
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn stop_reason_classes() {
        let ok = StopReason::graceful(SessionId::ZERO, "SessionStop", "peer requested stop");
        assert!(ok.is_graceful());
        let bad = StopReason::fault(
            SessionId::ZERO,
            "CurrentDemand",
            FaultKind::Timeout,
            "performance timer expired",
        );
        assert!(!bad.is_graceful());
    }
}
