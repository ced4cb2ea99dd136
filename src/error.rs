/// Errors surfaced by the registry, the device property protocol, and the
/// acquisition engine.
#[derive(Debug, thiserror::Error)]
pub enum VrHalError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("operation on a closed device handle")]
    AlreadyClosed,

    #[error("tracking subsystem failed to initialize: {0}")]
    SubsystemInitFailed(String),
}

impl VrHalError {
    /// Shorthand for the pervasive unsupported-property-key case.
    pub(crate) fn invalid_param(msg: impl Into<String>) -> Self {
        VrHalError::InvalidParameter(msg.into())
    }
}
