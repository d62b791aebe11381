//! # RAM Disk Host Daemon
//!
//! Main entry point for the RAM disk host runtime.

use ramdiskd::{HostRuntime, HostRuntimeConfig};
use services_ramdisk::{RamDiskConfig, RequestModeSelector};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

/// Command-line overrides applied on top of the configuration file
#[derive(Debug, Default)]
struct Overrides {
    config_path: Option<String>,
    script_path: Option<String>,
    devices: Option<usize>,
    sectors: Option<u64>,
    sector_size: Option<usize>,
    mode: Option<RequestModeSelector>,
    idle_ms: Option<u64>,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("ramdiskd");

    let config = parse_args(&args)
        .and_then(build_config)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            print_usage(program);
            process::exit(1);
        });

    let mut runtime = HostRuntime::new(config).unwrap_or_else(|e| {
        eprintln!("Failed to create runtime: {}", e);
        process::exit(1);
    });

    runtime.run();
    for line in runtime.take_output() {
        println!("{}", line);
    }
    runtime.shutdown();
}

fn parse_args(args: &[String]) -> Result<Overrides, String> {
    let mut overrides = Overrides::default();
    let mut i = 1;

    while i < args.len() {
        let option = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", option))
        };

        match option {
            "--config" | "-c" => overrides.config_path = Some(value()?),
            "--script" | "-s" => overrides.script_path = Some(value()?),
            "--devices" => overrides.devices = Some(parse_number(option, &value()?)?),
            "--sectors" => overrides.sectors = Some(parse_number(option, &value()?)?),
            "--sector-size" => overrides.sector_size = Some(parse_number(option, &value()?)?),
            "--mode" | "-m" => {
                let mode = value()?;
                overrides.mode = Some(match mode.parse() {
                    Ok(index) => RequestModeSelector::Index(index),
                    Err(_) => RequestModeSelector::Name(mode),
                });
            }
            "--idle-ms" => overrides.idle_ms = Some(parse_number(option, &value()?)?),
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    Ok(overrides)
}

fn parse_number<T: std::str::FromStr>(option: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", option, value))
}

fn build_config(overrides: Overrides) -> Result<HostRuntimeConfig, String> {
    let mut ramdisk = match &overrides.config_path {
        Some(path) => RamDiskConfig::load(path).map_err(|e| e.to_string())?,
        None => RamDiskConfig::default(),
    };
    if let Some(devices) = overrides.devices {
        ramdisk.device_count = devices;
    }
    if let Some(sectors) = overrides.sectors {
        ramdisk.sectors_per_device = sectors;
    }
    if let Some(sector_size) = overrides.sector_size {
        ramdisk.logical_sector_size = sector_size;
    }
    if let Some(mode) = overrides.mode {
        ramdisk.request_mode = mode;
    }
    if let Some(idle_ms) = overrides.idle_ms {
        ramdisk.idle_timeout_ms = idle_ms;
    }

    let script = match &overrides.script_path {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("Failed to read script file: {}", e))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("Failed to read commands from stdin: {}", e))?;
            text
        }
    };

    Ok(HostRuntimeConfig {
        ramdisk,
        script: Some(script),
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      JSON configuration file");
    eprintln!("  -s, --script <FILE>      Command script (default: read stdin)");
    eprintln!("  --devices <N>            Number of devices (1-16)");
    eprintln!("  --sectors <N>            Device size in logical sectors");
    eprintln!("  --sector-size <BYTES>    Logical sector size (multiple of 512)");
    eprintln!("  -m, --mode <MODE>        Request mode: 0/simple, 1/full, 2/noqueue");
    eprintln!("  --idle-ms <MS>           Idle time before media is flagged as removed");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} --script demos/revalidate.rdcmd", program);
    eprintln!("  echo 'info' | {} --devices 2 --mode noqueue", program);
}
