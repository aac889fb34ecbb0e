//! Offline calculator for PWM and tachometer settings.
//!
//! Runs the controller logic against an in-memory register file, so
//! divider choices, register words, and whole fan layouts can be checked
//! without hardware.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use pwm_tach::channel::{FailsafeEdge, PwmChannelConfig, WatchdogFailsafe};
use pwm_tach::config::ControllerConfig;
use pwm_tach::regs::{Access, MemoryRegisters};
use pwm_tach::{CoolingDevice, PwmTachController, divider, duty, tach};

#[derive(Parser)]
#[command(name = "pwm-tach-calc", about, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the PWM clock divider for a target frequency
    Divider {
        /// Input clock (Hz)
        #[arg(long)]
        clock: u32,

        /// Target output frequency (Hz)
        #[arg(long)]
        frequency: u32,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the duty and control words for a duty value
    Duty {
        #[arg(long)]
        clock: u32,

        #[arg(long, default_value_t = 25_000)]
        frequency: u32,

        /// Falling point, 0 (off) to 255 (fully on)
        #[arg(long)]
        duty: u8,

        /// Enable the watchdog fail-safe with this duty point
        #[arg(long)]
        failsafe_point: Option<u8>,

        /// Edge on which the fail-safe duty loads
        #[arg(long, default_value_t = FailsafeEdge::Falling)]
        failsafe_edge: FailsafeEdge,
    },

    /// Convert a raw tach count to RPM
    Rpm {
        #[arg(long)]
        clock: u32,

        /// Count field of the status register
        #[arg(long, value_parser = parse_u32)]
        raw: u32,

        /// Tach divider exponent (divider = 4^exponent)
        #[arg(long, default_value_t = 5)]
        exponent: u8,

        #[arg(long, default_value_t = 2)]
        pulses: u8,
    },

    /// Apply a fan layout to an in-memory register file and dump the result
    Simulate {
        /// JSON fan layout
        config: PathBuf,

        #[arg(long)]
        clock: u32,

        /// Move every cooling device to this state after applying
        #[arg(long)]
        state: Option<usize>,
    },
}

fn main() -> Result<()> {
    pwm_tach::tracing::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Divider {
            clock,
            frequency,
            json,
        } => cmd_divider(clock, frequency, json),
        Command::Duty {
            clock,
            frequency,
            duty,
            failsafe_point,
            failsafe_edge,
        } => cmd_duty(clock, frequency, duty, failsafe_point, failsafe_edge),
        Command::Rpm {
            clock,
            raw,
            exponent,
            pulses,
        } => cmd_rpm(clock, raw, exponent, pulses),
        Command::Simulate {
            config,
            clock,
            state,
        } => cmd_simulate(&config, clock, state),
    }
}

/// Accept decimal or 0x-prefixed hex.
fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

fn cmd_divider(clock: u32, frequency: u32, json: bool) -> Result<()> {
    let setting = divider::resolve(clock, frequency);

    if json {
        println!("{}", serde_json::to_string_pretty(&setting)?);
        return Ok(());
    }

    println!("Coarse:   {}", setting.coarse);
    println!("Fine:     {}", setting.fine);
    println!("Achieved: {} Hz", setting.achieved_hz);
    if !setting.meets_target {
        println!("Warning:  no divider undercuts {frequency} Hz, using the largest divisor");
    }
    Ok(())
}

fn cmd_duty(
    clock: u32,
    frequency: u32,
    duty_value: u8,
    failsafe_point: Option<u8>,
    failsafe_edge: FailsafeEdge,
) -> Result<()> {
    let mut config = PwmChannelConfig {
        target_frequency_hz: frequency,
        ..Default::default()
    };
    if let Some(point) = failsafe_point {
        config.watchdog_failsafe = WatchdogFailsafe {
            enabled: true,
            edge_selection: failsafe_edge,
            failsafe_point: point,
        };
    }

    let setting = divider::resolve(clock, frequency);
    let duty_word = duty::duty_word(&config, duty_value);
    let control_word = duty::control_word(&config, &setting);

    println!("Duty word:    {:#010x}", duty_word.to_raw());
    println!("Control word: {:#010x}", control_word.to_raw());
    if duty_value == duty::DUTY_OFF {
        println!("Duty 0 gates the output; the words above are not written.");
    }
    Ok(())
}

fn cmd_rpm(clock: u32, raw: u32, exponent: u8, pulses: u8) -> Result<()> {
    if pulses == 0 {
        bail!("pulses per revolution must be at least 1");
    }
    if exponent > pwm_tach::channel::MAX_TACH_DIVIDER_EXPONENT {
        bail!("divider exponent {exponent} out of range");
    }

    let divider = tach::divider_for_exponent(exponent);
    let rpm = tach::rpm_from_raw(clock, raw, divider, pulses);
    println!("{rpm} RPM");
    Ok(())
}

fn cmd_simulate(path: &Path, clock: u32, state: Option<usize>) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = ControllerConfig::from_json_str(&json)
        .with_context(|| format!("parsing {}", path.display()))?;

    let controller = Arc::new(PwmTachController::new(MemoryRegisters::new(), clock));
    let devices = config.apply(&controller)?;

    if let Some(state) = state {
        for device in &devices {
            device
                .set_cur_state(state)
                .with_context(|| format!("setting {} to state {state}", device.name()))?;
        }
    }

    println!("Accesses:");
    for access in controller.registers().accesses() {
        match access {
            Access::Read { offset, value } => println!("  R {offset:#05x} -> {value:#010x}"),
            Access::Write { offset, value } => println!("  W {offset:#05x} <- {value:#010x}"),
        }
    }

    println!("Registers:");
    for (offset, value) in controller.registers().snapshot() {
        println!("  {offset:#05x} = {value:#010x}");
    }

    println!("Channels (input clock {} Hz):", controller.input_clock_hz());
    for fan in &config.fans {
        let pwm = controller.pwm_config(fan.pwm_channel);
        println!(
            "  PWM {}: target {} Hz, achieved {} Hz, duty {}",
            fan.pwm_channel,
            pwm.target_frequency_hz,
            controller.achieved_frequency(fan.pwm_channel)?,
            controller.get_duty(fan.pwm_channel)?
        );
        for &channel in &fan.tach_channels {
            let tach = controller.tach_config(channel);
            println!(
                "  Tach {channel}: {} edges, debounce {}, divider {}, {} pulses/rev",
                tach.edge_mode,
                tach.debounce,
                tach::divider_for_exponent(tach.divider_exponent),
                tach.pulses_per_revolution
            );
        }
    }

    if !devices.is_empty() {
        println!("Cooling devices:");
        for device in &devices {
            println!(
                "  {} (channel {}, state {}/{})",
                device.name(),
                device.channel(),
                device.cur_state(),
                device.max_state()
            );
        }
    }
    Ok(())
}
