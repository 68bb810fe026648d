//! Command line and runtime configuration.

use clap::{ArgAction, Parser};
use tracing::Level;

use crate::core::{
    ConfigError, DEFAULT_PACKETS_PER_SEC, DEFAULT_TTL, MAX_PACKETS_PER_SEC, MIN_PACKETS_PER_SEC,
    SERVER_PORT,
};

/// Like ping, but sends packets isochronously (equally spaced in time) in
/// each direction, so a noisy network's delay and loss can be attributed to
/// one direction or the other.
///
/// Run with no host to act as the server; give the server's host name or
/// address to act as a client.
#[derive(Debug, Clone, Parser)]
#[command(name = "isoping", version)]
pub struct Args {
    /// Server host name or IP (client mode); omit for server mode.
    pub host: Option<String>,

    /// Maximum output lines per second.
    #[arg(short = 'f', value_name = "LINES/SEC", allow_negative_numbers = true)]
    pub prints_per_sec: Option<f64>,

    /// Packets per second; in server mode, the highest rate accepted.
    #[arg(
        short = 'r',
        value_name = "PPS",
        default_value_t = DEFAULT_PACKETS_PER_SEC,
        allow_negative_numbers = true
    )]
    pub packets_per_sec: f64,

    /// Packet TTL (kept low by default for safety).
    #[arg(short = 't', value_name = "TTL", default_value_t = DEFAULT_TTL)]
    pub ttl: u32,

    /// Quiet mode: don't print per-packet lines.
    #[arg(short = 'q', default_value_t = false)]
    pub quiet: bool,

    /// Prefix printed lines with timestamps.
    #[arg(short = 'T', default_value_t = false)]
    pub timestamps: bool,

    /// UDP port of the server.
    #[arg(short = 'p', long, default_value_t = SERVER_PORT)]
    pub port: u16,

    /// More diagnostics on stderr (-v debug, -vv trace).
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

/// Which end of the measurement we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Accept any number of clients.
    Server,
    /// Measure against one server.
    Client {
        /// Server host name or address.
        host: String,
    },
}

/// Validated settings, built once at startup and passed to the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server or client.
    pub role: Role,
    /// Server UDP port.
    pub port: u16,
    /// Packets per second (or maximum accepted, on the server).
    pub packets_per_sec: f64,
    /// Output line limit, if any.
    pub prints_per_sec: Option<f64>,
    /// IP TTL / hop limit.
    pub ttl: u32,
    /// Suppress per-packet lines.
    pub quiet: bool,
    /// Prefix lines with wall-clock timestamps.
    pub timestamps: bool,
    /// Verbosity of stderr diagnostics.
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Server,
            port: SERVER_PORT,
            packets_per_sec: DEFAULT_PACKETS_PER_SEC,
            prints_per_sec: None,
            ttl: DEFAULT_TTL,
            quiet: false,
            timestamps: false,
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Validate parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let config = Self {
            role: match args.host {
                Some(host) => Role::Client { host },
                None => Role::Server,
            },
            port: args.port,
            packets_per_sec: args.packets_per_sec,
            prints_per_sec: args.prints_per_sec,
            ttl: args.ttl,
            quiet: args.quiet,
            timestamps: args.timestamps,
            log_level: match args.verbose {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pps) = self.prints_per_sec
            && (pps.is_nan() || pps <= 0.0)
        {
            return Err(ConfigError::PrintsPerSec(pps));
        }
        if !(MIN_PACKETS_PER_SEC..=MAX_PACKETS_PER_SEC).contains(&self.packets_per_sec) {
            return Err(ConfigError::PacketsPerSec(self.packets_per_sec));
        }
        if self.ttl < 1 {
            return Err(ConfigError::Ttl(self.ttl));
        }
        Ok(())
    }

    /// Client config for `host` with default settings.
    pub fn client(host: impl Into<String>) -> Self {
        Self {
            role: Role::Client { host: host.into() },
            ..Self::default()
        }
    }

    /// Set packets per second.
    pub fn with_packets_per_sec(mut self, pps: f64) -> Self {
        self.packets_per_sec = pps;
        self
    }

    /// Suppress per-packet lines.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Microseconds between our packets.
    pub fn usec_per_pkt(&self) -> u32 {
        (1e6 / self.packets_per_sec) as u32
    }

    /// Minimum microseconds between report lines; 0 means no limit.
    ///
    /// Capped at `i32::MAX` since it is compared against wrapping clock
    /// differences.
    pub fn usec_per_print(&self) -> u32 {
        match self.prints_per_sec {
            Some(pps) if pps > 0.0 => (1e6 / pps).min(f64::from(i32::MAX)) as u32,
            _ => 0,
        }
    }
}
