use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::models::{AcceptResult, AccountInfo, AccountNumber, PendingOperation};

use super::CacheError;

/// Directory for account-info snapshots
const ACCOUNTS_DIR: &str = "accounts";

/// Directory for acceptance history logs
const HISTORY_DIR: &str = "history";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// One acceptance attempt, successful or not.
///
/// Logs written by the earlier scripts hold `{timestamp, pending_operations,
/// accept_result}` with a naive local timestamp; those read as accepted
/// entries without a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub pending_reference: String,
    #[serde(default = "legacy_accepted")]
    pub accepted: bool,
    /// Everything that was pending in the cycle this attempt belonged to
    #[serde(default)]
    pub pending_operations: Vec<PendingOperation>,
    #[serde(default, alias = "accept_result", skip_serializing_if = "Option::is_none")]
    pub result: Option<AcceptResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn accepted(reference: &str, pending: &[PendingOperation], result: AcceptResult) -> Self {
        Self {
            timestamp: Utc::now(),
            pending_reference: reference.to_string(),
            accepted: true,
            pending_operations: pending.to_vec(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(reference: &str, pending: &[PendingOperation], error: String) -> Self {
        Self {
            timestamp: Utc::now(),
            pending_reference: reference.to_string(),
            accepted: false,
            pending_operations: pending.to_vec(),
            result: None,
            error: Some(error),
        }
    }
}

fn legacy_accepted() -> bool {
    true
}

/// RFC 3339, or a naive timestamp taken as local time.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(serde::de::Error::custom)?;
    Ok(Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc()))
}

/// Per-account snapshots and acceptance history under the data directory.
pub struct CacheManager {
    data_dir: PathBuf,
}

impl CacheManager {
    /// Create the manager and its directories.
    pub fn new(data_dir: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(data_dir.join(ACCOUNTS_DIR))?;
        std::fs::create_dir_all(data_dir.join(HISTORY_DIR))?;
        Ok(Self { data_dir })
    }

    pub fn account_path(&self, number: &AccountNumber) -> PathBuf {
        self.data_dir
            .join(ACCOUNTS_DIR)
            .join(format!("{}.json", number))
    }

    pub fn history_path(&self, number: &AccountNumber) -> PathBuf {
        self.data_dir
            .join(HISTORY_DIR)
            .join(format!("{}.json", number))
    }

    fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    // ===== Account Info =====

    pub fn load_account_info(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<CachedData<AccountInfo>>, CacheError> {
        Self::load(&self.account_path(number))
    }

    pub fn save_account_info(&self, number: &AccountNumber, info: &AccountInfo) -> Result<(), CacheError> {
        debug!(account = %number, "Saving account snapshot");
        Self::save(&self.account_path(number), &CachedData::new(info))
    }

    // ===== History =====

    pub fn load_history(&self, number: &AccountNumber) -> Result<Vec<HistoryEntry>, CacheError> {
        let path = self.history_path(number);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            // Older logs held a single object
            other => Ok(vec![serde_json::from_value(other)?]),
        }
    }

    /// Append one entry to the account's history. An unreadable log is moved
    /// aside rather than overwritten.
    pub fn append_history(&self, number: &AccountNumber, entry: &HistoryEntry) -> Result<(), CacheError> {
        let path = self.history_path(number);
        let mut entries = match self.load_history(number) {
            Ok(entries) => entries,
            Err(CacheError::Json(e)) => {
                let aside = path.with_extension(format!("corrupt-{}.json", Utc::now().timestamp()));
                warn!(error = %e, moved_to = %aside.display(), "History log unreadable, starting a new one");
                std::fs::rename(&path, &aside)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        entries.push(entry.clone());
        Self::save(&path, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn number() -> AccountNumber {
        "0981123456".parse().expect("valid number")
    }

    fn operation(reference: &str) -> PendingOperation {
        serde_json::from_value(serde_json::json!({"pendingReference": reference, "amount": 100}))
            .expect("operation")
    }

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(vec![1]);
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::hours(3);
        assert_eq!(cached.age_display(), "3h ago");

        cached.cached_at = Utc::now() - Duration::days(2);
        assert_eq!(cached.age_display(), "2d ago");
    }

    #[test]
    fn test_account_snapshot_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        assert!(cache.load_account_info(&number()).expect("load").is_none());

        let info: AccountInfo =
            serde_json::from_str(r#"{"name":{"fullName":"Ana"},"status":"ACTIVE"}"#).expect("info");
        cache.save_account_info(&number(), &info).expect("save");

        let cached = cache
            .load_account_info(&number())
            .expect("load")
            .expect("snapshot present");
        assert_eq!(cached.data.full_name(), Some("Ana"));
        assert!(cache.account_path(&number()).ends_with("accounts/0981123456.json"));
    }

    #[test]
    fn test_history_is_append_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        let pending = vec![operation("PR-1"), operation("PR-2")];

        cache
            .append_history(
                &number(),
                &HistoryEntry::accepted("PR-1", &pending, AcceptResult::default()),
            )
            .expect("append first");

        // A second manager over the same directory sees and extends the log
        let reopened = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        reopened
            .append_history(&number(), &HistoryEntry::failed("PR-2", &pending, "boom".to_string()))
            .expect("append second");

        let history = reopened.load_history(&number()).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].pending_reference, "PR-1");
        assert!(history[0].accepted);
        assert_eq!(history[1].error.as_deref(), Some("boom"));
        assert_eq!(history[1].pending_operations.len(), 2);
    }

    #[test]
    fn test_history_single_object_is_wrapped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        let single = serde_json::to_string(&HistoryEntry::failed("PR-0", &[], "x".to_string()))
            .expect("serialize");
        std::fs::write(cache.history_path(&number()), single).expect("write");

        let history = cache.load_history(&number()).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pending_reference, "PR-0");
    }

    #[test]
    fn test_history_reads_script_written_log() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        let legacy = serde_json::json!([{
            "timestamp": "2025-01-15T10:30:00.123456",
            "pending_operations": [{"pendingReference": "PR-7", "amount": 5000}],
            "accept_result": {"transactionReference": "TX-7"}
        }]);
        std::fs::write(cache.history_path(&number()), legacy.to_string()).expect("write");

        let history = cache.load_history(&number()).expect("history");
        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert!(entry.accepted);
        assert_eq!(entry.pending_reference, "");
        assert_eq!(entry.pending_operations.len(), 1);
        assert_eq!(
            entry.result.as_ref().and_then(|r| r.transaction_reference.as_deref()),
            Some("TX-7")
        );
        assert_eq!(
            entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            "2025-01-15 10:30"
        );

        cache
            .append_history(&number(), &HistoryEntry::failed("PR-8", &[], "x".to_string()))
            .expect("append");
        assert_eq!(cache.load_history(&number()).expect("history").len(), 2);
    }

    #[test]
    fn test_corrupt_history_is_moved_aside() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        std::fs::write(cache.history_path(&number()), "[{broken").expect("write");

        cache
            .append_history(&number(), &HistoryEntry::failed("PR-1", &[], "x".to_string()))
            .expect("append");

        assert_eq!(cache.load_history(&number()).expect("history").len(), 1);
        let moved = std::fs::read_dir(dir.path().join(HISTORY_DIR))
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .count();
        assert_eq!(moved, 1);
    }
}
