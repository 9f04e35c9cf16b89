//! Shared fixtures for the end-to-end scenarios
//!
//! Builds a throwaway PKI directory (V2G and MO hierarchies with
//! ECDSA P-256 material) and provides controller wrappers that inject
//! faults into the simulator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyUsagePurpose,
    PKCS_ECDSA_P256_SHA256,
};

use v2g_core::dialect::{namespace, AppProtocol};
use v2g_core::messages::common::{EnergyTransferMode, MeterInfo, PaymentOption};
use v2g_core::schedule::ChargingSchedule;
use v2g_core::session::SessionId;
use v2g_pki::TrustStore;
use v2g_secc::{AuthStatus, EvseController, EvseLimits, ScheduleRequirements};

static PKI_COUNTER: AtomicU32 = AtomicU32::new(0);

fn ca_params(name: &str, not_after_offset_days: i64) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    params
        .distinguished_name
        .push(DnType::CommonName, name.to_string());
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    set_window(&mut params, not_after_offset_days);
    params
}

fn leaf_params(name: &str, not_after_offset_days: i64) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    params
        .distinguished_name
        .push(DnType::CommonName, name.to_string());
    params.alg = &PKCS_ECDSA_P256_SHA256;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    set_window(&mut params, not_after_offset_days);
    params
}

fn set_window(params: &mut CertificateParams, not_after_offset_days: i64) {
    use rcgen::date_time_ymd;
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = if not_after_offset_days < 0 {
        // Already lapsed
        date_time_ymd(2021, 1, 1)
    } else {
        date_time_ymd(2049, 1, 1)
    };
}

/// A freshly generated PKI directory in the layout the trust store
/// loads: `certs/` plus `private_keys/`.
pub struct PkiFixture {
    pub path: PathBuf,
}

impl PkiFixture {
    /// Full hierarchy with valid material everywhere.
    pub fn new() -> Self {
        Self::with_contract_expiry(false)
    }

    /// `expired_contract` backdates the contract leaf's validity window.
    pub fn with_contract_expiry(expired_contract: bool) -> Self {
        let id = PKI_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("v2g-pki-{}-{}", std::process::id(), id));
        let certs = path.join("certs");
        let keys = path.join("private_keys");
        std::fs::create_dir_all(&certs).unwrap();
        std::fs::create_dir_all(&keys).unwrap();

        // V2G hierarchy: root -> CPO sub -> SECC leaf
        let v2g_root = Certificate::from_params(ca_params("V2G Root CA", 1)).unwrap();
        let cpo_sub = Certificate::from_params(ca_params("CPO Sub CA 1", 1)).unwrap();
        let secc_leaf = Certificate::from_params(leaf_params("secc", 1)).unwrap();

        // MO hierarchy: root -> MO sub -> contract leaf (CN = eMAID)
        let mo_root = Certificate::from_params(ca_params("MO Root CA", 1)).unwrap();
        let mo_sub = Certificate::from_params(ca_params("MO Sub CA 1", 1)).unwrap();
        let contract_days = if expired_contract { -1 } else { 1 };
        let contract_leaf =
            Certificate::from_params(leaf_params("DE8AAA1A2B3C4D5", contract_days)).unwrap();

        // OEM hierarchy: root -> OEM leaf
        let oem_root = Certificate::from_params(ca_params("OEM Root CA", 1)).unwrap();
        let oem_leaf = Certificate::from_params(leaf_params("oem-provisioning", 1)).unwrap();

        let write = |file: &str, pem: String| {
            std::fs::write(certs.join(file), pem).unwrap();
        };
        write("v2gRootCA.pem", v2g_root.serialize_pem().unwrap());
        write("moRootCA.pem", mo_root.serialize_pem().unwrap());
        write("oemRootCA.pem", oem_root.serialize_pem().unwrap());
        write(
            "cpoSubCA1.pem",
            cpo_sub.serialize_pem_with_signer(&v2g_root).unwrap(),
        );
        write(
            "seccLeaf.pem",
            secc_leaf.serialize_pem_with_signer(&cpo_sub).unwrap(),
        );
        write(
            "moSubCA1.pem",
            mo_sub.serialize_pem_with_signer(&mo_root).unwrap(),
        );
        write(
            "contractLeaf.pem",
            contract_leaf.serialize_pem_with_signer(&mo_sub).unwrap(),
        );
        write(
            "oemLeaf.pem",
            oem_leaf.serialize_pem_with_signer(&oem_root).unwrap(),
        );

        std::fs::write(
            keys.join("seccLeaf.key.pem"),
            secc_leaf.serialize_private_key_pem(),
        )
        .unwrap();
        std::fs::write(
            keys.join("contractLeaf.key.pem"),
            contract_leaf.serialize_private_key_pem(),
        )
        .unwrap();
        std::fs::write(
            keys.join("oemLeaf.key.pem"),
            oem_leaf.serialize_private_key_pem(),
        )
        .unwrap();

        Self { path }
    }

    pub fn trust_store(&self) -> Arc<TrustStore> {
        Arc::new(TrustStore::load(&self.path).unwrap())
    }
}

impl Default for PkiFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PkiFixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// The protocol list offering only ISO 15118-2.
pub fn iso2_only() -> Vec<AppProtocol> {
    vec![AppProtocol {
        namespace: namespace::ISO_2.to_string(),
        version_major: 2,
        version_minor: 0,
        schema_id: 1,
        priority: 1,
    }]
}

/// The protocol list offering only ISO 15118-20.
pub fn iso20_only() -> Vec<AppProtocol> {
    vec![AppProtocol {
        namespace: namespace::ISO_20_COMMON.to_string(),
        version_major: 1,
        version_minor: 0,
        schema_id: 1,
        priority: 1,
    }]
}

/// Delegating wrapper that stalls the energy oracle, used to trip the
/// EVCC's performance timer.
pub struct StallingController<C> {
    pub inner: C,
    pub stall: Duration,
}

#[async_trait]
impl<C: EvseController> EvseController for StallingController<C> {
    fn evse_id(&self) -> String {
        self.inner.evse_id()
    }

    fn evse_id_v20(&self) -> String {
        self.inner.evse_id_v20()
    }

    fn supported_energy_transfer_modes(&self) -> Vec<EnergyTransferMode> {
        self.inner.supported_energy_transfer_modes()
    }

    fn limits(&self) -> EvseLimits {
        self.inner.limits()
    }

    async fn is_authorized(&self, session_id: &SessionId, method: PaymentOption) -> AuthStatus {
        self.inner.is_authorized(session_id, method).await
    }

    async fn build_schedule(&self, requirements: ScheduleRequirements) -> ChargingSchedule {
        self.inner.build_schedule(requirements).await
    }

    async fn set_precharge_target(&self, voltage_v: f64, current_a: f64) {
        self.inner.set_precharge_target(voltage_v, current_a).await
    }

    async fn set_charging(&self, active: bool) {
        self.inner.set_charging(active).await
    }

    async fn present_voltage(&self) -> f64 {
        self.inner.present_voltage().await
    }

    async fn present_current(&self) -> f64 {
        // The stall lands in the charging loop only
        tokio::time::sleep(self.stall).await;
        self.inner.present_current().await
    }

    async fn should_stop(&self) -> bool {
        self.inner.should_stop().await
    }

    async fn renegotiation_requested(&self) -> bool {
        self.inner.renegotiation_requested().await
    }

    async fn meter_info(&self) -> MeterInfo {
        self.inner.meter_info().await
    }

    fn receipt_required(&self) -> bool {
        self.inner.receipt_required()
    }
}
