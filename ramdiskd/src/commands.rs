//! # Host Control Commands
//!
//! A minimal command surface for poking at the RAM disks from a script or
//! a terminal.
//!
//! ## Command Set
//!
//! - `open <dev>` - Count a user in
//! - `close <dev>` - Count a user out
//! - `write <dev> <sector> <byte> <count>` - Fill `count` sectors with `byte`
//! - `read <dev> <sector> <count>` - Read `count` sectors and summarize them
//! - `passthrough <dev>` - Submit a non-storage request
//! - `geometry <dev>` - Report the synthetic geometry
//! - `info [dev]` - Report one or every device
//! - `media <dev>` - Report whether the media is flagged as changed
//! - `expire <dev>` - Fire the idle timeout now
//! - `diagnostics` - List recorded diagnostics
//! - `wait <ms>` - Sleep, letting real idle timers run
//! - `quit` - Stop executing
//!
//! `<dev>` is an index (`0`) or a device name (`rda`). Sectors are 512-byte
//! kernel sectors.

use std::fmt;
use thiserror::Error;

/// Host command error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostCommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid number for {what}: {value}")]
    InvalidNumber { what: &'static str, value: String },

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// A device named by index or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Index(usize),
    Name(String),
}

impl DeviceRef {
    fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(s.to_string()),
        }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Host commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Open { device: DeviceRef },
    Close { device: DeviceRef },
    Write {
        device: DeviceRef,
        sector: u64,
        byte: u8,
        count: u64,
    },
    Read {
        device: DeviceRef,
        sector: u64,
        count: u64,
    },
    PassThrough { device: DeviceRef },
    Geometry { device: DeviceRef },
    /// Report one device, or all of them
    Info { device: Option<DeviceRef> },
    MediaChanged { device: DeviceRef },
    Expire { device: DeviceRef },
    Diagnostics,
    Wait { millis: u64 },
    Quit,
}

/// Host command parser
pub struct HostCommandParser;

impl HostCommandParser {
    /// Parses a command string
    pub fn parse(input: &str) -> Result<HostCommand, HostCommandError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(HostCommandError::InvalidCommand(
                "Empty command".to_string(),
            ));
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();
        let args = &parts[1..];

        let command = match cmd.as_str() {
            "open" => HostCommand::Open {
                device: Self::device(args)?,
            },
            "close" => HostCommand::Close {
                device: Self::device(args)?,
            },
            "write" => Self::parse_write(args)?,
            "read" => Self::parse_read(args)?,
            "passthrough" | "pc" => HostCommand::PassThrough {
                device: Self::device(args)?,
            },
            "geometry" | "getgeo" => HostCommand::Geometry {
                device: Self::device(args)?,
            },
            "info" => HostCommand::Info {
                device: args.first().map(|s| DeviceRef::parse(s)),
            },
            "media" => HostCommand::MediaChanged {
                device: Self::device(args)?,
            },
            "expire" => HostCommand::Expire {
                device: Self::device(args)?,
            },
            "diagnostics" | "diag" => HostCommand::Diagnostics,
            "wait" => Self::parse_wait(args)?,
            "quit" | "exit" => HostCommand::Quit,
            _ => return Err(HostCommandError::UnknownCommand(cmd)),
        };

        let expected = match command {
            HostCommand::Write { .. } => 4,
            HostCommand::Read { .. } => 3,
            HostCommand::Info { .. } | HostCommand::Wait { .. } => 1,
            HostCommand::Diagnostics | HostCommand::Quit => 0,
            _ => 1,
        };
        if let Some(extra) = args.get(expected) {
            return Err(HostCommandError::UnexpectedArgument(extra.to_string()));
        }

        Ok(command)
    }

    fn device(args: &[&str]) -> Result<DeviceRef, HostCommandError> {
        args.first()
            .map(|s| DeviceRef::parse(s))
            .ok_or_else(|| HostCommandError::MissingArgument("device".to_string()))
    }

    /// Parses `write <dev> <sector> <byte> <count>`
    fn parse_write(args: &[&str]) -> Result<HostCommand, HostCommandError> {
        if args.len() < 4 {
            return Err(HostCommandError::MissingArgument(
                "write <dev> <sector> <byte> <count>".to_string(),
            ));
        }
        let byte = Self::number(args[2], "byte")?;
        let byte = u8::try_from(byte).map_err(|_| HostCommandError::InvalidNumber {
            what: "byte",
            value: args[2].to_string(),
        })?;

        Ok(HostCommand::Write {
            device: DeviceRef::parse(args[0]),
            sector: Self::number(args[1], "sector")?,
            byte,
            count: Self::number(args[3], "count")?,
        })
    }

    /// Parses `read <dev> <sector> <count>`
    fn parse_read(args: &[&str]) -> Result<HostCommand, HostCommandError> {
        if args.len() < 3 {
            return Err(HostCommandError::MissingArgument(
                "read <dev> <sector> <count>".to_string(),
            ));
        }
        Ok(HostCommand::Read {
            device: DeviceRef::parse(args[0]),
            sector: Self::number(args[1], "sector")?,
            count: Self::number(args[2], "count")?,
        })
    }

    /// Parses `wait <ms>`, accepting an optional `ms` suffix
    fn parse_wait(args: &[&str]) -> Result<HostCommand, HostCommandError> {
        let value = *args
            .first()
            .ok_or_else(|| HostCommandError::MissingArgument("milliseconds".to_string()))?;
        let millis = Self::number(value.strip_suffix("ms").unwrap_or(value), "milliseconds")?;
        Ok(HostCommand::Wait { millis })
    }

    /// Parses a decimal or `0x`-prefixed hexadecimal number
    fn number(s: &str, what: &'static str) -> Result<u64, HostCommandError> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed.map_err(|_| HostCommandError::InvalidNumber {
            what,
            value: s.to_string(),
        })
    }
}
