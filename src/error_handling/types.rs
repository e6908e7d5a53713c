use std::fmt;

use crate::session_management::SessionState;

#[derive(Debug)]
pub enum ConfigError {
    EmptyValue(String),
    NotInRange(String),
    Inconsistent(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyValue(e) => write!(f, "Missing value: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::Inconsistent(e) => write!(f, "Inconsistent configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum CaptureError {
    InterfaceNotFound(String),
    DeviceLookup(String),
    OpenFailed(String),
    FilterFailed(String),
    ReadTimeout,
    ReadFailed(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InterfaceNotFound(e) => write!(f, "Invalid interface name {:?}", e),
            CaptureError::DeviceLookup(e) => write!(f, "Unable to list capture devices: {}", e),
            CaptureError::OpenFailed(e) => write!(f, "Failed to open capture: {}", e),
            CaptureError::FilterFailed(e) => write!(f, "Failed to set BPF filter: {}", e),
            CaptureError::ReadTimeout => write!(f, "Capture read timed out"),
            CaptureError::ReadFailed(e) => write!(f, "Capture read failed: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum SessionError {
    DataLost(usize),
    Cancelled,
    InvalidTransition { from: SessionState, to: SessionState },
    OutputClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DataLost(n) => write!(f, "data lost ({} bytes)", n),
            SessionError::Cancelled => write!(f, "Session cancelled"),
            SessionError::InvalidTransition { from, to } => {
                write!(f, "Invalid session transition {:?} -> {:?}", from, to)
            }
            SessionError::OutputClosed => write!(f, "Output sink closed"),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum OutputError {
    IoError(std::io::Error),
    EncodeError(serde_json::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::IoError(e) => write!(f, "Output IO error: {}", e),
            OutputError::EncodeError(e) => write!(f, "Output encoding error: {}", e),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        OutputError::IoError(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::EncodeError(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    Config(ConfigError),
    Capture(CaptureError),
    Output(OutputError),
    TaskFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Config(e) => write!(f, "Configuration error: {}", e),
            ControllerError::Capture(e) => write!(f, "Capture error: {}", e),
            ControllerError::Output(e) => write!(f, "Output error: {}", e),
            ControllerError::TaskFailed(e) => write!(f, "Task failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::Config(err)
    }
}

impl From<CaptureError> for ControllerError {
    fn from(err: CaptureError) -> Self {
        ControllerError::Capture(err)
    }
}

impl From<OutputError> for ControllerError {
    fn from(err: OutputError) -> Self {
        ControllerError::Output(err)
    }
}
