//! v2g-core - shared data model for the ISO 15118 HLC stack
//!
//! This crate holds everything both role engines and the codec agree on:
//! the two application dialects, the typed message bodies, physical
//! values, charging schedules, session identity, the timer table, and
//! the error taxonomy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        v2g-core                              │
//! │                                                              │
//! │  ┌──────────┐  ┌───────────────┐  ┌───────────────────────┐  │
//! │  │ Dialect  │  │ Message       │  │ Session / StopReason  │  │
//! │  │ (timers, │  │ (SAP, -2, -20 │  │ (id, record, fault    │  │
//! │  │  payload │  │  bodies)      │  │  taxonomy)            │  │
//! │  │  types)  │  └───────────────┘  └───────────────────────┘  │
//! │  └──────────┘                                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The codec crate turns [`messages::Message`] into EXI bytes and back;
//! the role engines never touch bytes directly.

pub mod config;
pub mod dialect;
pub mod error;
pub mod messages;
pub mod schedule;
pub mod session;
pub mod shutdown;

pub use dialect::{Dialect, TimerKind};
pub use error::{FaultKind, ProtocolError};
pub use messages::{Message, MessageKind};
pub use schedule::{ChargingSchedule, ChargingWindow};
pub use session::{SessionId, SessionRecord, StopReason};
pub use shutdown::{ShutdownHandle, ShutdownSignal};
