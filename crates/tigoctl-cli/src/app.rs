//! Command implementations shared by the subcommands and the interactive menu.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use tigoctl_core::api::{ApiClient, ApiError, IdentityClient};
use tigoctl_core::auth::{token_tail, Authenticator, DeviceManager, JsonFileStore, Session, TokenRefresher};
use tigoctl_core::cache::CacheManager;
use tigoctl_core::config::Config;
use tigoctl_core::models::{AccountInfo, AccountNumber, MfaSettings, PendingOperation, UserAttribute};
use tigoctl_core::poller::{accept_all, OperationPoller, PollEvent, PollOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::format::{format_local, format_remaining, format_server_date, truncate_string};
use crate::prompt;

/// Characters of each token shown by `status`
const TOKEN_TAIL_CHARS: usize = 10;

/// Friendly name registered with the authenticator app
const TOTP_DEVICE_NAME: &str = "tigoctl";

/// Whether `pending` accepts what it lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMode {
    Never,
    Ask,
    Always,
}

pub struct App {
    pub config: Config,
    identity: IdentityClient,
    api: ApiClient,
    cache: CacheManager,
    session: Session<JsonFileStore>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let identity = IdentityClient::new(&config).context("Failed to build identity client")?;
        let api = ApiClient::new(&config)?;
        let cache = CacheManager::new(data_dir.clone())
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let session = Session::open(JsonFileStore::in_dir(&data_dir))
            .context("Failed to load stored credentials")?;

        Ok(Self {
            config,
            identity,
            api,
            cache,
            session,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.record().is_some()
    }

    // ===== Session =====

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(username) => username,
            None => prompt::line_or("Phone number", self.config.last_username.as_deref())?,
        };
        if username.is_empty() {
            bail!("Phone number required");
        }
        let password = prompt::password("Password: ")?;
        if password.is_empty() {
            bail!("Password required");
        }

        let authenticator = Authenticator::new(self.identity.clone(), &self.config.identity);
        let challenge = authenticator.start(&username, &password).await?;
        match challenge.destination() {
            Some(destination) => println!("Verification code sent to {}", destination),
            None => println!("Verification code sent by SMS"),
        }

        let code = prompt::line("SMS code: ")?;
        if code.is_empty() {
            bail!("No code entered");
        }
        authenticator.complete(&mut self.session, challenge, &code).await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Login successful!\n");
        self.status()
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let refresher = TokenRefresher::new(self.identity.clone());
        match refresher.refresh(&mut self.session).await {
            Ok(outcome) => {
                println!(
                    "Tokens refreshed; valid for {} minutes{}",
                    outcome.expires_in / 60,
                    if outcome.refresh_token_rotated {
                        " (new refresh token issued)"
                    } else {
                        ""
                    }
                );
                Ok(())
            }
            Err(e) if e.requires_login() => {
                Err(anyhow!(e).context("Refresh failed; log in again with `tigoctl login`"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn status(&self) -> Result<()> {
        let Some(record) = self.session.record() else {
            println!("Not logged in.");
            println!("Credentials file: {}", self.session.store().path().display());
            return Ok(());
        };

        println!("Session");
        println!("  Issued:        {}", format_local(record.issued_at));
        println!(
            "  Expires:       {} ({})",
            format_local(record.expires_at()),
            format_remaining(record.minutes_until_expiry())
        );
        println!("  Access token:  {}", token_tail(&record.access_token, TOKEN_TAIL_CHARS));
        println!("  Id token:      {}", token_tail(&record.id_token, TOKEN_TAIL_CHARS));
        println!(
            "  Refresh token: {}",
            if record.has_refresh_token() {
                token_tail(&record.refresh_token, TOKEN_TAIL_CHARS)
            } else {
                "missing".to_string()
            }
        );
        if let Some(phone) = record.phone_number() {
            println!("  Phone number:  {}", phone);
        }
        match record.device_key() {
            Some(key) => println!("  Device key:    {}", key),
            None => println!("  Device key:    none"),
        }
        if let Some(ref device) = record.device_info {
            let flag = |v: Option<bool>| match v {
                Some(true) => "yes",
                Some(false) => "no",
                None => "unknown",
            };
            println!(
                "  Device:        {} (confirmed: {}, remembered: {})",
                device.device_name.as_deref().unwrap_or("unnamed"),
                flag(device.confirmed),
                flag(device.remembered)
            );
        }
        if record.needs_refresh() {
            println!("\nTokens expire soon; run `tigoctl refresh`.");
        }
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        if !self.is_logged_in() {
            println!("Not logged in.");
            return Ok(());
        }
        self.session.clear()?;
        info!("Logged out");
        println!("Stored credentials removed.");
        Ok(())
    }

    /// Account API client carrying the session token, refreshing first when
    /// the tokens are about to expire.
    async fn authorized_api(&mut self) -> Result<ApiClient> {
        let needs_refresh = self.session.require()?.needs_refresh();
        if needs_refresh {
            info!("Tokens near expiry, refreshing before the request");
            self.refresh().await?;
        }
        let record = self.session.require()?;
        let token = record.api_token(self.config.api.authorization_token);
        if token.is_empty() {
            bail!("Stored session has no {:?} token; log in again", self.config.api.authorization_token);
        }
        if self.config.api.api_key.is_none() {
            warn!("No API key configured; set TIGOCTL_API_KEY");
        }
        Ok(self.api.with_token(token.to_string()))
    }

    // ===== Accounts =====

    pub async fn account_info(&mut self, number: &str) -> Result<()> {
        let number: AccountNumber = number.parse()?;
        let api = self.authorized_api().await?;

        match api.fetch_account_info(&number).await {
            Ok(info) => {
                if let Err(e) = self.cache.save_account_info(&number, &info) {
                    warn!(error = %e, "Failed to save account snapshot");
                }
                print_account(&number, &info);
                Ok(())
            }
            Err(e) if e.is_transport() => {
                let cached = self.cache.load_account_info(&number).ok().flatten();
                match cached {
                    Some(cached) => {
                        println!("Offline ({}); showing snapshot from {}", e, cached.age_display());
                        print_account(&number, &cached.data);
                        Ok(())
                    }
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn pending(&mut self, number: &str, mode: AcceptMode) -> Result<()> {
        let number: AccountNumber = number.parse()?;
        let api = self.authorized_api().await?;

        let operations = api.fetch_pending_operations(&number).await?;
        if operations.is_empty() {
            println!("No pending operations for {}.", number);
            return Ok(());
        }
        print_operations(&operations);

        let accept = match mode {
            AcceptMode::Never => false,
            AcceptMode::Always => true,
            AcceptMode::Ask => prompt::confirm("\nAccept the pending operation(s)?")?,
        };
        if !accept {
            return Ok(());
        }

        let accepted = accept_all(&api, &self.cache, &number, &operations, &mut print_event).await?;
        println!("{} operation(s) accepted.", accepted);
        Ok(())
    }

    pub async fn watch(&mut self, number: &str, interval: Option<u64>) -> Result<()> {
        let number: AccountNumber = number.parse()?;
        let api = self.authorized_api().await?;

        let mut settings = self.config.poller.clone();
        if let Some(secs) = interval {
            settings.interval_secs = secs;
        }
        let poller = OperationPoller::new(&settings);

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        println!(
            "Checking {} every {}s. Press Ctrl+C to stop.",
            number,
            poller.interval().as_secs()
        );
        let outcome = poller
            .run(&api, &self.cache, &number, &cancel, print_event)
            .await;
        ctrl_c.abort();

        match outcome.context("Could not look up the account")? {
            PollOutcome::Cancelled => {
                println!("\nStopped.");
                Ok(())
            }
            PollOutcome::ErrorBudgetExhausted { last_error } => Err(anyhow!(last_error).context(format!(
                "Stopped after {} consecutive failed checks",
                settings.max_consecutive_errors.max(1)
            ))),
            PollOutcome::AcceptFailed { reference, error } => {
                Err(anyhow!(error).context(format!("Stopped: operation {} was not accepted", reference)))
            }
        }
    }

    // ===== Devices =====

    fn devices(&self) -> DeviceManager {
        DeviceManager::new(self.identity.clone())
    }

    pub async fn device_show(&mut self) -> Result<()> {
        let device = self.devices().current(&mut self.session).await?;
        println!("Device {}", device.device_key);
        println!("  Name:   {}", device.name().unwrap_or("unnamed"));
        println!("  Status: {}", device.status().unwrap_or("unknown"));
        if let Some(created) = device.created_at() {
            println!("  Added:  {}", format_local(created));
        }
        if let Some(last) = device.last_authenticated_at() {
            println!("  Last authenticated: {}", format_local(last));
        }
        Ok(())
    }

    pub async fn device_list(&mut self) -> Result<()> {
        let devices = self.devices().list(&self.session).await?;
        if devices.is_empty() {
            println!("No devices tracked for this user.");
            return Ok(());
        }
        let current = self.session.record().and_then(|r| r.device_key());
        for device in &devices {
            let marker = if current.as_deref() == Some(device.device_key.as_str()) {
                "*"
            } else {
                " "
            };
            println!(
                "{} {}  {:<24} {}",
                marker,
                device.device_key,
                truncate_string(device.name().unwrap_or("unnamed"), 24),
                device
                    .last_authenticated_at()
                    .map(format_local)
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    pub async fn device_confirm(&mut self, name: Option<String>) -> Result<()> {
        let response = self
            .devices()
            .confirm(&mut self.session, name.as_deref())
            .await?;
        println!("Device confirmed.");
        if response.user_confirmation_necessary == Some(true) {
            println!("The pool asks for the device to be remembered; run `tigoctl device remember`.");
        }
        Ok(())
    }

    pub async fn device_remember(&mut self, remembered: bool) -> Result<()> {
        self.devices()
            .set_remembered(&mut self.session, remembered)
            .await?;
        println!(
            "Device marked as {}.",
            if remembered { "remembered" } else { "not remembered" }
        );
        Ok(())
    }

    pub async fn device_forget(&mut self, key: Option<String>) -> Result<()> {
        self.devices().forget(&mut self.session, key.as_deref()).await?;
        println!("Device forgotten.");
        Ok(())
    }

    // ===== User =====

    fn access_token(&self) -> Result<String> {
        Ok(self.session.require()?.access_token.clone())
    }

    pub async fn user_show(&mut self) -> Result<()> {
        let profile = self.identity.get_user(&self.access_token()?).await?;
        println!("User {}", profile.username);
        for attribute in &profile.user_attributes {
            if attribute.name.ends_with("_verified") {
                continue;
            }
            let verified = if profile.is_verified(&attribute.name) {
                " (verified)"
            } else {
                ""
            };
            println!("  {:<20} {}{}", attribute.name, attribute.value, verified);
        }
        if profile.mfa_setting_list.is_empty() {
            println!("  MFA: none");
        } else {
            println!("  MFA: {}", profile.mfa_setting_list.join(", "));
        }
        if let Some(ref preferred) = profile.preferred_mfa_setting {
            println!("  Preferred MFA: {}", preferred);
        }
        Ok(())
    }

    pub async fn user_set_mfa(&mut self, sms: Option<bool>, totp: Option<bool>) -> Result<()> {
        if sms.is_none() && totp.is_none() {
            bail!("Nothing to change; pass --sms and/or --totp");
        }
        self.identity
            .set_mfa_preference(
                &self.access_token()?,
                sms.map(MfaSettings::enabled),
                totp.map(MfaSettings::enabled),
            )
            .await?;
        println!("MFA preferences updated.");
        Ok(())
    }

    pub async fn user_setup_totp(&mut self) -> Result<()> {
        let access_token = self.access_token()?;
        let association = match self.identity.associate_software_token(&access_token).await {
            Ok(association) => association,
            Err(ApiError::Identity { ref kind, .. }) if kind == "SoftwareTokenMFANotFoundException" => {
                bail!("Authenticator apps are not enabled for this user pool; only SMS MFA is available")
            }
            Err(e) => return Err(e.into()),
        };

        println!("Add this secret to your authenticator app:\n");
        println!("  {}\n", association.secret_code);
        let code = prompt::line("6-digit code from the app: ")?;
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            bail!("Expected a 6-digit code");
        }

        let verification = self
            .identity
            .verify_software_token(&access_token, &code, TOTP_DEVICE_NAME)
            .await?;
        if !verification.is_success() {
            bail!("Code was not accepted (status {:?})", verification.status);
        }
        self.identity
            .set_mfa_preference(&access_token, None, Some(MfaSettings::enabled(true)))
            .await?;
        println!("Authenticator app enabled.");
        Ok(())
    }

    pub async fn user_change_password(&mut self) -> Result<()> {
        let current = prompt::password("Current password: ")?;
        let proposed = prompt::password("New password: ")?;
        let repeated = prompt::password("Repeat new password: ")?;
        if proposed != repeated {
            bail!("Passwords do not match");
        }
        if proposed.is_empty() {
            bail!("New password required");
        }

        let authenticator = Authenticator::new(self.identity.clone(), &self.config.identity);
        authenticator
            .change_password(&self.session, &current, &proposed)
            .await?;
        println!("Password changed. Use the new one on your next login.");
        Ok(())
    }

    pub async fn user_set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let response = self
            .identity
            .update_user_attributes(&self.access_token()?, &[UserAttribute::new(name, value)])
            .await?;
        println!("{} updated.", name);
        for delivery in &response.code_delivery_details_list {
            println!(
                "Verification code sent to {} by {}",
                delivery.destination.as_deref().unwrap_or("?"),
                delivery.delivery_medium.as_deref().unwrap_or("?")
            );
        }
        Ok(())
    }

    pub async fn user_delete_attribute(&mut self, name: &str) -> Result<()> {
        self.identity
            .delete_user_attributes(&self.access_token()?, &[name])
            .await?;
        println!("{} removed.", name);
        Ok(())
    }

    pub async fn user_verify_attribute(&mut self, name: &str, code: Option<String>) -> Result<()> {
        let access_token = self.access_token()?;
        let code = match code {
            Some(code) => code,
            None => {
                let response = self
                    .identity
                    .request_attribute_verification(&access_token, name)
                    .await?;
                if let Some(delivery) = response.code_delivery_details {
                    println!(
                        "Code sent to {}",
                        delivery.destination.as_deref().unwrap_or("?")
                    );
                }
                prompt::line("Verification code: ")?
            }
        };
        if code.is_empty() {
            bail!("No code entered");
        }
        self.identity
            .verify_user_attribute(&access_token, name, &code)
            .await?;
        println!("{} verified.", name);
        Ok(())
    }
}

fn print_account(number: &AccountNumber, info: &AccountInfo) {
    println!("Account {}", number);
    println!("  Name:       {}", info.full_name().unwrap_or("N/A"));
    println!("  Status:     {}", info.status.as_deref().unwrap_or("N/A"));
    if let Some(ref sub_status) = info.sub_status {
        println!("  Sub-status: {}", sub_status);
    }
}

fn print_operations(operations: &[PendingOperation]) {
    println!("{} pending operation(s):", operations.len());
    for (i, op) in operations.iter().enumerate() {
        println!(
            "\n{}. {} {}",
            i + 1,
            op.kind.as_deref().unwrap_or("operation"),
            op.amount_display()
        );
        if let Some(text) = op.notification_text().or(op.description_text.as_deref()) {
            println!("   {}", text);
        }
        println!("   Reference: {}", op.reference().unwrap_or("none"));
        if let Some(ref date) = op.request_date {
            println!("   Requested: {}", format_server_date(date));
        }
        if let Some(ref date) = op.expiration_date {
            println!("   Expires:   {}", format_server_date(date));
        }
    }
}

fn print_event(event: PollEvent) {
    let now = Local::now().format("%H:%M:%S");
    match event {
        PollEvent::Started { account } => {
            println!("Watching {}", account.full_name().unwrap_or("account"));
        }
        PollEvent::NoPending => println!("[{}] No pending operations", now),
        PollEvent::Found { count } => println!("[{}] {} pending operation(s), accepting...", now, count),
        PollEvent::Accepted { reference, result } => println!(
            "[{}] Accepted {} (transaction {}, status {})",
            now,
            reference,
            result.transaction_reference.as_deref().unwrap_or("-"),
            result.status.as_deref().unwrap_or("-")
        ),
        PollEvent::AcceptFailed { reference, error } => {
            eprintln!("[{}] Could not accept {}: {}", now, reference, error)
        }
        PollEvent::MissingReference { index } => {
            println!("[{}] Skipping operation #{} without a reference", now, index + 1)
        }
        PollEvent::FetchFailed {
            consecutive,
            max,
            error,
        } => eprintln!("[{}] Check failed ({}/{}): {}", now, consecutive, max, error),
        PollEvent::HistoryWriteFailed { reference, error } => {
            eprintln!("[{}] Could not record {} in history: {}", now, reference, error)
        }
    }
}
