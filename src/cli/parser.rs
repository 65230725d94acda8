use crate::models::TrackingMethod;
use clap::{Args, Parser, Subcommand};

/// Command-line interface definition for rAttendance
/// Clock in, take breaks and clock out against a store, verified on this device
#[derive(Parser)]
#[command(
    name = "rattendance",
    version = env!("CARGO_PKG_VERSION"),
    about = "Time attendance CLI: clock-in/break/clock-out with geofenced stores and verified tracking methods",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    /// Act as this user instead of the configured one
    #[arg(global = true, long = "user")]
    pub user: Option<String>,

    /// Pretend the current instant is this one (RFC 3339 or "YYYY-MM-DD HH:MM")
    #[arg(global = true, long = "at")]
    pub at: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device position given on the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct PositionArgs {
    /// Latitude of the device
    #[arg(long = "lat", requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the device
    #[arg(long = "lon", requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Reported accuracy of the fix, in meters
    #[arg(long = "accuracy")]
    pub accuracy: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Show or check the configuration file
    Config {
        #[arg(long = "print", help = "Print the current configuration")]
        print_config: bool,

        #[arg(long = "check", help = "Check configuration file for missing or invalid fields")]
        check: bool,
    },

    /// Manage the database (migrations, integrity checks, etc.)
    Db {
        #[arg(long = "migrate", help = "Run pending database migrations")]
        migrate: bool,

        #[arg(long = "check", help = "Check database integrity")]
        check: bool,

        #[arg(long = "vacuum", help = "Optimize the database using VACUUM")]
        vacuum: bool,

        #[arg(long = "info", help = "Show database information")]
        info: bool,
    },

    /// Print the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },

    /// Manage the stores of the tenant (local backend)
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Rank the tenant's stores against a position
    Resolve {
        #[command(flatten)]
        position: PositionArgs,

        #[arg(long = "json", help = "Print the resolution as JSON")]
        json: bool,
    },

    /// List the tracking methods and whether this device supports them
    Methods,

    /// Clock in at a store
    ClockIn {
        /// Tracking method (defaults to the configured one)
        #[arg(long = "method", value_enum)]
        method: Option<TrackingMethod>,

        /// Store id; required when no store is within the geofence
        #[arg(long = "store")]
        store: Option<String>,

        /// Why the store differs from the auto-selected one
        #[arg(long = "reason")]
        reason: Option<String>,

        /// Value read by the scanner (NFC tag, QR token, badge id)
        #[arg(long = "scan")]
        scan: Option<String>,

        #[command(flatten)]
        position: PositionArgs,
    },

    /// Start or end a break
    Break {
        #[command(subcommand)]
        action: BreakAction,
    },

    /// Clock out of the open session
    ClockOut,

    /// Show the current state and timers
    Status {
        #[arg(long = "json", help = "Print the state as JSON")]
        json: bool,

        /// Keep printing the timers for this many ticks
        #[arg(long = "watch", value_name = "TICKS")]
        watch: Option<u32>,
    },

    /// List recent sessions (local backend)
    History {
        #[arg(long = "limit", default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum StoreAction {
    /// Add a store
    Add {
        id: String,
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(long = "address", default_value = "")]
        address: String,
    },
    /// List stores
    List,
    /// Remove a store
    Remove { id: String },
}

#[derive(Subcommand, Clone, Copy)]
pub enum BreakAction {
    Start,
    End,
}
