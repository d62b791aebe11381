//! # RAM Disk Host Runtime
//!
//! Boots a set of RAM disks and drives them with host commands.
//!
//! ## Philosophy
//!
//! - **Host owns I/O**: the devices never print, the host reports
//! - **Scripts are first-class**: every run can be replayed from a file
//! - **Dumb host, smart devices**: the host only routes commands
//!
//! ## Responsibilities
//!
//! The host runtime:
//! - Creates the device registry from configuration
//! - Parses and executes command scripts
//! - Reports transfers, geometry, device info and diagnostics
//! - Tears every device down on exit

pub mod command_script;
pub mod commands;
pub mod runtime;

pub use command_script::{CommandScript, CommandScriptError, ScriptedCommand};
pub use commands::{DeviceRef, HostCommand, HostCommandError, HostCommandParser};
pub use runtime::{HostRuntime, HostRuntimeConfig, HostRuntimeError};
