//! EVCC controller abstraction
//!
//! The state machine consults the controller for every physical-world
//! input and never blocks on it longer than the step's timer allows.
//! The simulator models a battery charging toward its target SOC and
//! is what `EVCC_CONTROLLER_SIM=true` selects.

use async_trait::async_trait;
use parking_lot::Mutex;

use v2g_core::messages::common::{EnergyTransferMode, PaymentOption};

/// Snapshot of the battery the charging loop works from.
#[derive(Debug, Clone, Copy)]
pub struct BatteryState {
    /// Present state of charge, 0..=100
    pub present_soc: i8,
    /// SOC at which charging should stop
    pub target_soc: i8,
    /// Target charge voltage in volts
    pub target_voltage: u16,
    /// Target charge current in amperes
    pub target_current: u16,
    /// Hard voltage ceiling in volts
    pub max_voltage: u16,
    /// Hard current ceiling in amperes
    pub max_current: u16,
    /// Power ceiling in watts
    pub max_power_w: u32,
    /// Remaining energy request in watt hours
    pub energy_request_wh: u32,
}

/// Capability set the EVCC state machine calls into.
#[async_trait]
pub trait EvController: Send + Sync {
    /// MAC-derived EVCC identifier (-2 wire form).
    fn evcc_id(&self) -> [u8; 6];

    /// EVCC identifier in the -20 string form.
    fn evcc_id_v20(&self) -> String;

    /// The energy transfer mode this vehicle wants.
    fn energy_transfer_mode(&self) -> EnergyTransferMode;

    /// EIM or PnC.
    fn auth_method(&self) -> PaymentOption;

    /// Departure time in seconds from now, if the driver set one.
    async fn departure_time(&self) -> Option<u32>;

    /// Current battery snapshot; called once per charging-loop tick.
    async fn battery(&self) -> BatteryState;

    /// One charging-loop tick elapsed while drawing `power_w` watts.
    async fn energy_delivered(&self, power_w: u32);

    /// True once the vehicle wants to stop (SOC target, user stop).
    async fn charging_should_stop(&self) -> bool;

    /// True when the vehicle itself wants new charge parameters.
    async fn renegotiation_requested(&self) -> bool;

    /// Whether to run welding detection after a DC stop.
    fn welding_detection_enabled(&self) -> bool {
        true
    }
}

/// Battery simulator: SOC rises with delivered energy, stop at target.
pub struct SimEvController {
    mode: EnergyTransferMode,
    auth: PaymentOption,
    state: Mutex<SimState>,
}

struct SimState {
    soc_milli: i64,
    target_soc: i8,
    user_stop: bool,
    renegotiate_once: bool,
}

impl SimEvController {
    pub fn new(mode: EnergyTransferMode, auth: PaymentOption) -> Self {
        Self {
            mode,
            auth,
            state: Mutex::new(SimState {
                soc_milli: 45_000,
                target_soc: 80,
                user_stop: false,
                renegotiate_once: false,
            }),
        }
    }

    /// Make the next `renegotiation_requested` call answer true once.
    pub fn trigger_renegotiation(&self) {
        self.state.lock().renegotiate_once = true;
    }

    pub fn press_stop(&self) {
        self.state.lock().user_stop = true;
    }

    /// Start the simulated battery at `soc` percent.
    pub fn set_soc(&self, soc: i8) {
        self.state.lock().soc_milli = i64::from(soc) * 1000;
    }
}

#[async_trait]
impl EvController for SimEvController {
    fn evcc_id(&self) -> [u8; 6] {
        [0x02, 0x00, 0x00, 0xBE, 0xEF, 0x01]
    }

    fn evcc_id_v20(&self) -> String {
        "WMIV123456789ABCD".to_string()
    }

    fn energy_transfer_mode(&self) -> EnergyTransferMode {
        self.mode
    }

    fn auth_method(&self) -> PaymentOption {
        self.auth
    }

    async fn departure_time(&self) -> Option<u32> {
        Some(4 * 3600)
    }

    async fn battery(&self) -> BatteryState {
        let state = self.state.lock();
        BatteryState {
            present_soc: (state.soc_milli / 1000).clamp(0, 100) as i8,
            target_soc: state.target_soc,
            target_voltage: 400,
            target_current: 120,
            max_voltage: 410,
            max_current: 150,
            max_power_w: 50_000,
            energy_request_wh: 30_000,
        }
    }

    async fn energy_delivered(&self, power_w: u32) {
        // One tick is one second; a 70 kWh pack gains ~0.4 SOC
        // per second at 50 kW in simulator time.
        let mut state = self.state.lock();
        state.soc_milli += i64::from(power_w) / 125;
    }

    async fn charging_should_stop(&self) -> bool {
        let state = self.state.lock();
        state.user_stop || state.soc_milli / 1000 >= i64::from(state.target_soc)
    }

    async fn renegotiation_requested(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::take(&mut state.renegotiate_once)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_battery_reaches_target() {
        let sim = SimEvController::new(EnergyTransferMode::DcExtended, PaymentOption::Contract);
        sim.set_soc(79);
        assert!(!sim.charging_should_stop().await);
        for _ in 0..300 {
            sim.energy_delivered(50_000).await;
        }
        assert!(sim.charging_should_stop().await);
    }

    #[tokio::test]
    async fn renegotiation_fires_once() {
        let sim = SimEvController::new(EnergyTransferMode::AcThreePhaseCore, PaymentOption::ExternalPayment);
        assert!(!sim.renegotiation_requested().await);
        sim.trigger_renegotiation();
        assert!(sim.renegotiation_requested().await);
        assert!(!sim.renegotiation_requested().await);
    }
}
