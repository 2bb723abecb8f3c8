use thiserror::Error;

/// Errors surfaced at the simulation's public boundary.
///
/// None of the per-frame kernels can fail once the buffers exist; everything
/// here is caught at `new`/`resize` time or by the reentrancy guard.
#[derive(Debug, Error)]
pub enum SimError {
    /// A parameter was rejected before it could reach the internal buffers.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backing storage for a field buffer could not be sized.
    #[error("field buffer allocation failed: {0}")]
    Allocation(String),

    /// `step` or `resize` was invoked while another such call was in flight.
    /// This is a contract violation by the host, not a data error.
    #[error("`{0}` called while the simulation is busy")]
    Reentrant(&'static str),
}
