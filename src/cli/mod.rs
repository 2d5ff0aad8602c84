//! CLI Module
//!
//! Provides command-line support functionality including:
//! - Exit codes for automation
//! - JSON-lines payload input from stdin or a file

pub mod exit_codes;
pub mod input;

pub use exit_codes::{exit_code_description, exit_code_for, ExitCodes};
pub use input::{finish_input, parse_line, pump, InputError, InputStats};
