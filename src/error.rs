use thiserror::Error;

/// Failures inside the HID transport. These never cross the backend boundary;
/// drivers turn them into "no status".
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HID error: {0}")]
    Hid(String),

    #[error("HID permission denied: {0}")]
    PermissionDenied(String),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") || msg.contains("EACCES") {
            TransportError::PermissionDenied(msg)
        } else {
            TransportError::Hid(msg)
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine config directory")]
    NoConfigDir,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
