//! SECC controller abstraction
//!
//! The authorization oracle, the energy source, and the schedule
//! generator behind the state machine. `SECC_CONTROLLER_SIM=true`
//! selects the simulator.

use async_trait::async_trait;
use parking_lot::Mutex;

use v2g_core::messages::common::{EnergyTransferMode, MeterInfo, PaymentOption};
use v2g_core::schedule::{ChargingSchedule, ChargingWindow};
use v2g_core::session::SessionId;

/// Verdict of the authorization oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Accepted,
    Ongoing,
    Rejected,
}

/// Electrical limits of the EVSE.
#[derive(Debug, Clone, Copy)]
pub struct EvseLimits {
    pub nominal_voltage_v: u16,
    pub min_voltage_v: u16,
    pub max_voltage_v: u16,
    pub min_current_a: u16,
    pub max_current_a: u16,
    pub max_power_w: u32,
    pub peak_current_ripple_a: u16,
}

/// What the EVCC asked for, condensed for the schedule generator.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRequirements {
    pub mode: EnergyTransferMode,
    pub departure_time: Option<u32>,
    pub energy_request_wh: Option<u32>,
    pub ev_max_power_w: u32,
}

/// Capability set the SECC state machine calls into.
#[async_trait]
pub trait EvseController: Send + Sync {
    /// EVSE identifier in the -2 string form (e.g. `DE*ABB*E123*456`).
    fn evse_id(&self) -> String;

    /// EVSE identifier in the -20 form.
    fn evse_id_v20(&self) -> String;

    fn supported_energy_transfer_modes(&self) -> Vec<EnergyTransferMode>;

    fn limits(&self) -> EvseLimits;

    /// Authorization oracle, polled while it reports `Ongoing`.
    async fn is_authorized(&self, session_id: &SessionId, method: PaymentOption) -> AuthStatus;

    /// Build the schedule offered in ChargeParameterDiscovery.
    async fn build_schedule(&self, requirements: ScheduleRequirements) -> ChargingSchedule;

    /// Begin ramping the output toward the pre-charge target.
    async fn set_precharge_target(&self, voltage_v: f64, current_a: f64);

    /// Contactor on/off.
    async fn set_charging(&self, active: bool);

    /// Output voltage right now.
    async fn present_voltage(&self) -> f64;

    /// Output current right now.
    async fn present_current(&self) -> f64;

    /// True once the EVSE wants the charging loop to end.
    async fn should_stop(&self) -> bool;

    /// True when the EVSE wants the EV to renegotiate the schedule.
    async fn renegotiation_requested(&self) -> bool {
        false
    }

    async fn meter_info(&self) -> MeterInfo;

    /// Whether a signed metering receipt is demanded in the loop.
    fn receipt_required(&self) -> bool {
        false
    }
}

/// Simulator EVSE: instant authorization, instant pre-charge ramp,
/// stop after a configurable number of loop exchanges.
pub struct SimEvseController {
    modes: Vec<EnergyTransferMode>,
    state: Mutex<SimState>,
}

struct SimState {
    target_voltage: f64,
    target_current: f64,
    charging: bool,
    loop_count: u32,
    stop_after: Option<u32>,
    auth_polls_needed: u32,
    auth_polls_seen: u32,
    renegotiate_once: bool,
    meter_wh: u64,
}

impl SimEvseController {
    pub fn new(modes: Vec<EnergyTransferMode>) -> Self {
        Self {
            modes,
            state: Mutex::new(SimState {
                target_voltage: 0.0,
                target_current: 0.0,
                charging: false,
                loop_count: 0,
                stop_after: None,
                auth_polls_needed: 0,
                auth_polls_seen: 0,
                renegotiate_once: false,
                meter_wh: 0,
            }),
        }
    }

    /// Ask the EV to stop after `n` charging-loop exchanges.
    pub fn stop_after(self, n: u32) -> Self {
        self.state.lock().stop_after = Some(n);
        self
    }

    /// Report `Ongoing` for the first `n` authorization polls.
    pub fn auth_polls(self, n: u32) -> Self {
        self.state.lock().auth_polls_needed = n;
        self
    }

    /// Make the next loop exchange carry EVSENotification=ReNegotiate.
    pub fn trigger_renegotiation(&self) {
        self.state.lock().renegotiate_once = true;
    }
}

#[async_trait]
impl EvseController for SimEvseController {
    fn evse_id(&self) -> String {
        "DE*SIM*E2024*001".to_string()
    }

    fn evse_id_v20(&self) -> String {
        "DESIME20240001".to_string()
    }

    fn supported_energy_transfer_modes(&self) -> Vec<EnergyTransferMode> {
        self.modes.clone()
    }

    fn limits(&self) -> EvseLimits {
        EvseLimits {
            nominal_voltage_v: 230,
            min_voltage_v: 150,
            max_voltage_v: 500,
            min_current_a: 2,
            max_current_a: 200,
            max_power_w: 100_000,
            peak_current_ripple_a: 2,
        }
    }

    async fn is_authorized(&self, _session_id: &SessionId, _method: PaymentOption) -> AuthStatus {
        let mut state = self.state.lock();
        if state.auth_polls_seen < state.auth_polls_needed {
            state.auth_polls_seen += 1;
            AuthStatus::Ongoing
        } else {
            AuthStatus::Accepted
        }
    }

    async fn build_schedule(&self, requirements: ScheduleRequirements) -> ChargingSchedule {
        let ceiling = requirements.ev_max_power_w.min(self.limits().max_power_w);
        let span = requirements.departure_time.unwrap_or(4 * 3600);
        ChargingSchedule {
            tuple_id: 1,
            windows: vec![
                ChargingWindow {
                    start_offset: 0,
                    duration: span / 2,
                    max_power_w: ceiling,
                },
                ChargingWindow {
                    start_offset: span / 2,
                    duration: span - span / 2,
                    max_power_w: ceiling / 2,
                },
            ],
        }
    }

    async fn set_precharge_target(&self, voltage_v: f64, current_a: f64) {
        let mut state = self.state.lock();
        // The simulated supply converges immediately
        state.target_voltage = voltage_v;
        state.target_current = current_a;
    }

    async fn set_charging(&self, active: bool) {
        let mut state = self.state.lock();
        state.charging = active;
        if !active {
            // Output decays once the contactor opens
            state.target_voltage /= 8.0;
            state.target_current = 0.0;
        }
    }

    async fn present_voltage(&self) -> f64 {
        self.state.lock().target_voltage
    }

    async fn present_current(&self) -> f64 {
        let state = self.state.lock();
        if state.charging {
            state.target_current
        } else {
            0.0
        }
    }

    async fn should_stop(&self) -> bool {
        let mut state = self.state.lock();
        state.loop_count += 1;
        state.meter_wh += 12;
        match state.stop_after {
            Some(n) => state.loop_count > n,
            None => false,
        }
    }

    async fn renegotiation_requested(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::take(&mut state.renegotiate_once)
    }

    async fn meter_info(&self) -> MeterInfo {
        let state = self.state.lock();
        MeterInfo {
            meter_id: "SIM-METER-1".to_string(),
            meter_reading: Some(state.meter_wh),
            sig_meter_reading: None,
            meter_status: Some(0),
            t_meter: Some(chrono::Utc::now().timestamp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auth_goes_ongoing_then_accepted() {
        let sim = SimEvseController::new(vec![EnergyTransferMode::AcThreePhaseCore]).auth_polls(2);
        let id = SessionId::random();
        assert_eq!(
            sim.is_authorized(&id, PaymentOption::ExternalPayment).await,
            AuthStatus::Ongoing
        );
        assert_eq!(
            sim.is_authorized(&id, PaymentOption::ExternalPayment).await,
            AuthStatus::Ongoing
        );
        assert_eq!(
            sim.is_authorized(&id, PaymentOption::ExternalPayment).await,
            AuthStatus::Accepted
        );
    }

    #[tokio::test]
    async fn stop_fires_after_budgeted_polls() {
        let sim = SimEvseController::new(vec![EnergyTransferMode::AcThreePhaseCore]).stop_after(2);
        assert!(!sim.should_stop().await);
        assert!(!sim.should_stop().await);
        assert!(sim.should_stop().await);
    }

    #[tokio::test]
    async fn schedule_covers_departure_window() {
        let sim = SimEvseController::new(vec![EnergyTransferMode::DcExtended]);
        let schedule = sim
            .build_schedule(ScheduleRequirements {
                mode: EnergyTransferMode::DcExtended,
                departure_time: Some(7200),
                energy_request_wh: Some(30_000),
                ev_max_power_w: 50_000,
            })
            .await;
        assert_eq!(schedule.span(), 7200);
        assert_eq!(schedule.power_limit_at(0), Some(50_000));
        assert_eq!(schedule.power_limit_at(3600), Some(25_000));
    }
}
