//! The `hub` module is the single-node router: it owns the registry of live
//! connections and group memberships and serializes every routing decision
//! through one event queue.

pub mod engine;
pub mod handle;
pub mod registry;

pub use engine::{Hub, RouteReport, Source};
pub use handle::{HubEvent, HubHandle, HubStats};
pub use registry::Registry;
