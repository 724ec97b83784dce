//! CLI argument definitions for tigoctl.

use clap::{Parser, Subcommand, ValueEnum};

/// Wallet session and pending-operation tool
#[derive(Parser, Debug)]
#[command(name = "tigoctl", version, about = "Log in, keep tokens fresh and approve pending operations")]
pub struct Cli {
    /// Run without a subcommand to open the interactive menu
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with password and SMS code
    Login(LoginArgs),
    /// Exchange the stored refresh token for new tokens
    Refresh,
    /// Show the stored session
    Status,
    /// Delete the stored session
    Logout,
    /// Look up an account by number
    AccountInfo(AccountArgs),
    /// List pending operations, optionally accepting them
    Pending(PendingArgs),
    /// Poll for pending operations and accept them as they appear
    Watch(WatchArgs),
    /// Manage the devices tracked for this user
    Device(DeviceArgs),
    /// Manage the user's profile and MFA settings
    User(UserArgs),
}

#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Phone number; the country prefix is added when missing
    #[arg(short, long)]
    pub username: Option<String>,
}

#[derive(Parser, Debug)]
pub struct AccountArgs {
    /// Account number (10 digits)
    pub number: String,
}

#[derive(Parser, Debug)]
pub struct PendingArgs {
    /// Account number (10 digits)
    pub number: String,

    /// Accept every listed operation, stopping at the first failure
    #[arg(long)]
    pub accept: bool,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Account number (10 digits)
    pub number: String,

    /// Seconds between polls (overrides config)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommands,
}

#[derive(Subcommand, Debug)]
pub enum DeviceCommands {
    /// Show the current device
    Show,
    /// List all devices tracked for the user
    List,
    /// Confirm the current device
    Confirm {
        /// Device name (generated when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Mark the current device as remembered
    Remember {
        /// Mark it as not remembered instead
        #[arg(long)]
        off: bool,
    },
    /// Forget a device
    Forget {
        /// Device key (the current device when omitted)
        #[arg(short, long)]
        key: Option<String>,
    },
}

#[derive(Parser, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Show attributes and MFA settings
    Show,
    /// Enable or disable MFA factors
    SetMfa {
        #[arg(long, value_enum)]
        sms: Option<Toggle>,
        #[arg(long, value_enum)]
        totp: Option<Toggle>,
    },
    /// Enrol an authenticator app and enable TOTP MFA
    SetupTotp,
    /// Change the account password
    ChangePassword,
    /// Set a user attribute (e.g. email, phone_number)
    SetAttribute { name: String, value: String },
    /// Delete a user attribute
    DeleteAttribute { name: String },
    /// Verify an attribute with the code sent to it
    VerifyAttribute {
        name: String,
        /// Code already received; a new one is requested when omitted
        #[arg(short, long)]
        code: Option<String>,
    },
}
