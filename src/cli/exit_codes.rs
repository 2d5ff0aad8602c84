//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::transport::TransportError;
use super::input::InputError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Listening socket or device could not be set up
    pub const CONNECTION_FAILED: u8 = 3;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Producer violated the payload contract
    pub const PROTOCOL_ERROR: u8 = 9;
}

/// Map an error chain to an exit code
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        ExitCodes::CONFIG_ERROR
    } else if err.downcast_ref::<TransportError>().is_some() {
        ExitCodes::CONNECTION_FAILED
    } else if let Some(input) = err.downcast_ref::<InputError>() {
        match input {
            InputError::Packet { .. } => ExitCodes::PROTOCOL_ERROR,
            _ => ExitCodes::ERROR,
        }
    } else {
        ExitCodes::ERROR
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        3 => "Connection failed",
        8 => "Configuration error",
        9 => "Protocol error",
        _ => "Unknown error",
    }
}
