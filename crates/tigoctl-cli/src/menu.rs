//! Numbered interactive menu, shown when no subcommand is given.

use anyhow::Result;

use crate::app::{AcceptMode, App};
use crate::prompt;

const MAIN_MENU: &[&str] = &[
    "Log in",
    "Refresh tokens",
    "Session status",
    "Account info",
    "Pending operations",
    "Watch for pending operations",
    "Devices",
    "User and security",
    "Log out",
];

const DEVICE_MENU: &[&str] = &[
    "Show current device",
    "List devices",
    "Confirm current device",
    "Remember current device",
    "Stop remembering current device",
    "Forget a device",
];

const USER_MENU: &[&str] = &[
    "Show profile",
    "Enable SMS MFA only",
    "Disable all MFA",
    "Set up authenticator app",
    "Change password",
    "Set attribute",
    "Delete attribute",
    "Verify attribute",
];

/// Parse a menu answer. `Some(0)` is back/exit.
fn parse_choice(answer: &str, count: usize) -> Option<usize> {
    answer.parse::<usize>().ok().filter(|n| *n <= count)
}

/// Print a numbered menu and read a choice. `None` means back/exit, which
/// is also what a closed stdin gives.
fn choose(title: &str, items: &[&str], exit_label: &str) -> Result<Option<usize>> {
    println!("\n{}", title);
    println!("{}", "=".repeat(title.len()));
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
    println!("  0. {}", exit_label);

    loop {
        let Some(answer) = prompt::answer(&format!("Choose (0-{}): ", items.len()))? else {
            println!();
            return Ok(None);
        };
        match parse_choice(&answer, items.len()) {
            Some(0) => return Ok(None),
            Some(n) => return Ok(Some(n)),
            None => println!("Invalid option."),
        }
    }
}

/// Report a failed action without leaving the menu.
fn report(result: Result<()>) {
    if let Err(e) = result {
        eprintln!("\nError: {:#}", e);
    }
}

fn account_number() -> Result<String> {
    prompt::line("Account number (10 digits): ")
}

pub async fn run(app: &mut App) -> Result<()> {
    loop {
        let status = if app.is_logged_in() {
            "logged in"
        } else {
            "not logged in"
        };
        let Some(choice) = choose(&format!("tigoctl ({})", status), MAIN_MENU, "Exit")? else {
            return Ok(());
        };

        match choice {
            1 => report(app.login(None).await),
            2 => report(app.refresh().await),
            3 => report(app.status()),
            4 => {
                let number = account_number()?;
                report(app.account_info(&number).await)
            }
            5 => {
                let number = account_number()?;
                report(app.pending(&number, AcceptMode::Ask).await)
            }
            6 => {
                let number = account_number()?;
                report(app.watch(&number, None).await)
            }
            7 => report(device_menu(app).await),
            8 => report(user_menu(app).await),
            9 => {
                if prompt::confirm("Remove stored credentials?")? {
                    report(app.logout());
                }
            }
            _ => unreachable!("choose bounds the selection"),
        }

        if matches!(choice, 7 | 8) {
            continue;
        }
        prompt::pause()?;
    }
}

async fn device_menu(app: &mut App) -> Result<()> {
    loop {
        let Some(choice) = choose("Devices", DEVICE_MENU, "Back")? else {
            return Ok(());
        };
        let result = match choice {
            1 => app.device_show().await,
            2 => app.device_list().await,
            3 => {
                let name = prompt::line("Device name (empty to generate): ")?;
                app.device_confirm(Some(name).filter(|n| !n.is_empty())).await
            }
            4 => app.device_remember(true).await,
            5 => app.device_remember(false).await,
            6 => {
                let key = prompt::line("Device key (empty for the current device): ")?;
                let key = Some(key).filter(|k| !k.is_empty());
                if prompt::confirm("Forget the device?")? {
                    app.device_forget(key).await
                } else {
                    Ok(())
                }
            }
            _ => unreachable!("choose bounds the selection"),
        };
        report(result);
        prompt::pause()?;
    }
}

async fn user_menu(app: &mut App) -> Result<()> {
    loop {
        let Some(choice) = choose("User and security", USER_MENU, "Back")? else {
            return Ok(());
        };
        let result = match choice {
            1 => app.user_show().await,
            2 => app.user_set_mfa(Some(true), Some(false)).await,
            3 => app.user_set_mfa(Some(false), Some(false)).await,
            4 => app.user_setup_totp().await,
            5 => app.user_change_password().await,
            6 => {
                let name = prompt::line("Attribute name (e.g. email, phone_number): ")?;
                let value = prompt::line("Value: ")?;
                app.user_set_attribute(&name, &value).await
            }
            7 => {
                let name = prompt::line("Attribute name: ")?;
                app.user_delete_attribute(&name).await
            }
            8 => {
                let name = prompt::line("Attribute name (email or phone_number): ")?;
                app.user_verify_attribute(&name, None).await
            }
            _ => unreachable!("choose bounds the selection"),
        };
        report(result);
        prompt::pause()?;
    }
}
