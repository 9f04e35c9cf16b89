//! v2g-secc - the charging-station-side role engine
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SeccServer                            │
//! │  SDP responder ── TCP listener ── TLS listener               │
//! │                        │                                     │
//! │              one SeccSession per connection                  │
//! │   route(state, kind) ─► handler ─► response ─► transition    │
//! │                        │                                     │
//! │     EvseController (oracle) · TrustStore · SessionStore      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use config::{RedisEndpoint, SeccConfig};
pub use controller::{AuthStatus, EvseController, EvseLimits, ScheduleRequirements, SimEvseController};
pub use error::{FailCode, SeccError};
pub use router::SeccState;
pub use server::SeccServer;
pub use session::{SeccSession, SessionPolicy};
pub use store::SessionStore;
