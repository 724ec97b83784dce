//! tigoctl - wallet session and pending-operation tool.
//!
//! Logs in with password and SMS code, keeps the tokens fresh, and approves
//! pending operations for an account, either once or by polling.

mod app;
mod cli;
mod format;
mod menu;
mod prompt;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tigoctl_core::config::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{AcceptMode, App};
use cli::{Cli, Commands, DeviceCommands, UserCommands};

/// Log file prefix inside `<data_dir>/logs`
const LOG_FILE_PREFIX: &str = "tigoctl.log";

/// Initialize the tracing subscriber: stderr plus a daily log file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(data_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match data_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let data_dir = config.data_dir().ok();
    let _guard = init_tracing(data_dir.as_deref());
    info!("tigoctl starting");
    if config.api.api_key.is_none() {
        warn!("No API key configured; account commands will be rejected");
    }

    let mut app = App::new(config)?;

    let Some(command) = cli.command else {
        return menu::run(&mut app).await;
    };

    match command {
        Commands::Login(args) => app.login(args.username).await,
        Commands::Refresh => app.refresh().await,
        Commands::Status => app.status(),
        Commands::Logout => app.logout(),
        Commands::AccountInfo(args) => app.account_info(&args.number).await,
        Commands::Pending(args) => {
            let mode = if args.accept {
                AcceptMode::Always
            } else {
                AcceptMode::Never
            };
            app.pending(&args.number, mode).await
        }
        Commands::Watch(args) => app.watch(&args.number, args.interval).await,
        Commands::Device(args) => match args.command {
            DeviceCommands::Show => app.device_show().await,
            DeviceCommands::List => app.device_list().await,
            DeviceCommands::Confirm { name } => app.device_confirm(name).await,
            DeviceCommands::Remember { off } => app.device_remember(!off).await,
            DeviceCommands::Forget { key } => app.device_forget(key).await,
        },
        Commands::User(args) => match args.command {
            UserCommands::Show => app.user_show().await,
            UserCommands::SetMfa { sms, totp } => {
                app.user_set_mfa(sms.map(|t| t.enabled()), totp.map(|t| t.enabled()))
                    .await
            }
            UserCommands::SetupTotp => app.user_setup_totp().await,
            UserCommands::ChangePassword => app.user_change_password().await,
            UserCommands::SetAttribute { name, value } => app.user_set_attribute(&name, &value).await,
            UserCommands::DeleteAttribute { name } => app.user_delete_attribute(&name).await,
            UserCommands::VerifyAttribute { name, code } => {
                app.user_verify_attribute(&name, code).await
            }
        },
    }
}
