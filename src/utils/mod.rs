//! The `utils` module provides the error type, logging setup and small
//! signalling helpers shared across the `hubcast` crate.

pub mod error;
pub mod logging;

pub use error::{HubError, Result};

use tokio::sync::watch;

/// Resolve once `flag` holds `want`, or its sender is gone.
pub(crate) async fn flag_reaches(flag: &mut watch::Receiver<bool>, want: bool) {
    let _ = flag.wait_for(|value| *value == want).await;
}
