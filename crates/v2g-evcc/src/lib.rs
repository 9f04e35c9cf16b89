//! v2g-evcc - the vehicle-side role engine
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     EvccHandler                        │
//! │   SDP discovery ─► TCP/TLS connect ─► EvccSession      │
//! │                                                        │
//! │   EvccSession drives:                                  │
//! │     SAP → SessionSetup → ... → charging loop → Stop    │
//! │   consulting an EvController for every physical input  │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod session;

pub use config::EvccConfig;
pub use controller::{BatteryState, EvController, SimEvController};
pub use error::EvccError;
pub use handler::EvccHandler;
pub use session::{EvccSession, EvccState};
