//! Utility modules

pub mod errors;

pub use errors::{EngineError, ProviderError, Result};

use tokio_util::sync::CancellationToken;

/// Fails with [`EngineError::Cancelled`] once the caller gave up on the pass.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}
