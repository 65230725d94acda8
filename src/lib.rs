//! rAttendance library root.
//! Exposes the attendance core (state machine, store resolver, verification
//! strategies), its backends, the CLI parser and the high-level run() function.

pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod models;
pub mod ui;
pub mod utils;

use clap::Parser;
use cli::commands::{self, AppContext};
use cli::parser::{Cli, Commands};
use config::Config;
use errors::AppResult;

/// Central command dispatcher
pub async fn dispatch(cli: &Cli, cfg: Config) -> AppResult<()> {
    match &cli.command {
        Commands::Init => commands::init::handle(cli),
        Commands::Config { .. } => commands::config::handle(&cli.command, &cfg),
        Commands::Db { .. } => commands::db::handle(&cli.command, &cfg),
        Commands::Log { .. } => commands::log::handle(&cli.command, &cfg),
        _ => dispatch_attendance(cli, AppContext::new(cli, cfg)?).await,
    }
}

/// Commands acting on stores and sessions of the current user.
async fn dispatch_attendance(cli: &Cli, ctx: AppContext) -> AppResult<()> {
    let cmd = &cli.command;
    match cmd {
        Commands::Store { .. } => commands::store::handle(cmd, &ctx),
        Commands::Resolve { .. } => commands::resolve::handle(cmd, &ctx).await,
        Commands::Methods => commands::methods::handle(&ctx),
        Commands::ClockIn { .. } => commands::clock::handle_clock_in(cmd, &ctx).await,
        Commands::Break { .. } => commands::clock::handle_break(cmd, &ctx).await,
        Commands::ClockOut => commands::clock::handle_clock_out(&ctx).await,
        Commands::Status { .. } => commands::status::handle(cmd, &ctx).await,
        Commands::History { .. } => commands::history::handle(cmd, &ctx),
        _ => Ok(()),
    }
}

/// Entry point used by main.rs
pub async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load()?;
    utils::logging::init_tracing(&cfg.log_level);

    if let Some(custom_db) = &cli.db {
        cfg.database = custom_db.clone();
    }

    dispatch(&cli, cfg).await
}
