//! Leaf types shared across the -2 and -20 message bodies

/// A physical quantity with explicit unit and decimal multiplier
/// (ISO 15118-2 PhysicalValueType). The represented value is
/// `value * 10^multiplier` in `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalValue {
    pub multiplier: i8,
    pub unit: UnitSymbol,
    pub value: i16,
}

impl PhysicalValue {
    pub fn new(value: i16, multiplier: i8, unit: UnitSymbol) -> Self {
        Self {
            multiplier,
            unit,
            value,
        }
    }

    pub fn volts(value: i16) -> Self {
        Self::new(value, 0, UnitSymbol::Volts)
    }

    pub fn amperes(value: i16) -> Self {
        Self::new(value, 0, UnitSymbol::Amperes)
    }

    pub fn watts(value: i16, multiplier: i8) -> Self {
        Self::new(value, multiplier, UnitSymbol::Watts)
    }

    pub fn watt_hours(value: i16, multiplier: i8) -> Self {
        Self::new(value, multiplier, UnitSymbol::WattHours)
    }

    /// The quantity scaled to its base unit.
    pub fn scaled(&self) -> f64 {
        f64::from(self.value) * 10f64.powi(i32::from(self.multiplier))
    }
}

/// Unit symbols admitted by the -2 schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSymbol {
    Hours,
    Minutes,
    Seconds,
    Amperes,
    Volts,
    Watts,
    WattHours,
}

/// A rational physical value (ISO 15118-20 RationalNumber): the
/// represented value is `value * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RationalNumber {
    pub exponent: i8,
    pub value: i16,
}

impl RationalNumber {
    pub fn new(value: i16, exponent: i8) -> Self {
        Self { exponent, value }
    }

    pub fn scaled(&self) -> f64 {
        f64::from(self.value) * 10f64.powi(i32::from(self.exponent))
    }
}

/// Payment options named in the -2 schema (authorization methods).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOption {
    /// Plug & Charge via contract certificate
    Contract,
    /// External identification means (RFID, app, ...)
    ExternalPayment,
}

/// Energy transfer modes offered by the SECC and requested by the EVCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyTransferMode {
    AcSinglePhaseCore,
    AcThreePhaseCore,
    DcCore,
    DcExtended,
    DcComboCore,
    DcUnique,
}

impl EnergyTransferMode {
    pub fn is_ac(&self) -> bool {
        matches!(
            self,
            EnergyTransferMode::AcSinglePhaseCore | EnergyTransferMode::AcThreePhaseCore
        )
    }

    pub fn is_dc(&self) -> bool {
        !self.is_ac()
    }
}

/// Whether the EVSE has finished processing a request or is still
/// working on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseProcessing {
    Finished,
    Ongoing,
    OngoingWaitingForCustomerInteraction,
}

/// Out-of-band instruction from the EVSE to the EV, carried in every
/// EVSE status during the charging loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseNotification {
    None,
    StopCharging,
    ReNegotiation,
}

/// How the EVCC wants to end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingSession {
    Terminate,
    Pause,
}

/// An ordered, leaf-first list of DER certificates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateChain {
    /// Element id referenced by a detached signature, if any
    pub id: Option<String>,
    /// DER certificates, leaf first
    pub certificates: Vec<Vec<u8>>,
}

impl CertificateChain {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.certificates.first().map(Vec::as_slice)
    }
}

/// Detached signature over a canonically encoded message fragment
/// (the XMLDSig subset ISO 15118 actually uses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// Id of the signed fragment element
    pub referenced_id: String,
    /// SHA-256 digest of the canonical EXI encoding of the fragment
    pub digest: Vec<u8>,
    /// ECDSA signature over the SignedInfo construct
    pub signature_value: Vec<u8>,
}

/// Metering data reported by the EVSE (and countersigned by the EV in
/// MeteringReceipt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterInfo {
    pub meter_id: String,
    pub meter_reading: Option<u64>,
    pub sig_meter_reading: Option<Vec<u8>>,
    pub meter_status: Option<i16>,
    pub t_meter: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_value_scaling() {
        let p = PhysicalValue::watts(11, 3);
        assert_eq!(p.scaled(), 11_000.0);
        let n = PhysicalValue::new(2300, -1, UnitSymbol::Volts);
        assert_eq!(n.scaled(), 230.0);
    }

    #[test]
    fn transfer_mode_classes() {
        assert!(EnergyTransferMode::AcThreePhaseCore.is_ac());
        assert!(EnergyTransferMode::DcExtended.is_dc());
    }
}
