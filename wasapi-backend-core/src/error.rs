use thiserror::Error;

/// Errors surfaced across the Proxy Thread boundary to engine public methods.
///
/// Maps 1:1 to the three error kinds named in the backend's error handling
/// design: format negotiation / activation / duplicate-open failures fall
/// under `DeviceError`, the OS out-of-memory status has its own variant so
/// capture `reset` can special-case it, and a streaming fault mid-run is
/// `Disconnect`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("device error: {0}")]
    DeviceError(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("device disconnected: {0}")]
    Disconnect(String),
}

impl BackendError {
    /// Translate a raw status code crossing the Proxy Thread boundary into
    /// the public error type, special-casing the OS out-of-memory code.
    pub fn from_status(context: &str, status: i32, out_of_memory_code: i32) -> Self {
        if status == out_of_memory_code {
            BackendError::OutOfMemory
        } else {
            BackendError::DeviceError(format!("{context}: 0x{status:08x}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_matching_code_to_out_of_memory() {
        let oom = 0x8007000Eu32 as i32;
        assert_eq!(BackendError::from_status("IAudioClient::Initialize failed", oom, oom), BackendError::OutOfMemory);
    }

    #[test]
    fn from_status_maps_other_codes_to_device_error() {
        let other = 0x88890008u32 as i32;
        let oom = 0x8007000Eu32 as i32;
        assert_eq!(
            BackendError::from_status("IAudioClient::Initialize failed", other, oom),
            BackendError::DeviceError(format!("IAudioClient::Initialize failed: 0x{other:08x}"))
        );
    }
}
