use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::MirrorError;

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_RUN_TIME: &str = "00:05";
pub const DEFAULT_DEDUP_PATTERN: &str = r"\b[A-Za-z0-9]{6,}\b";

/// Mutable runtime configuration for the cleanup subsystem and code
/// extraction. Persisted in the store so it survives restarts; updated only
/// through the control surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Age threshold in days for the daily sweep. 0 disables age-based
    /// deletion entirely.
    pub retention_days: u32,
    /// Daily run time as "HH:MM", interpreted in UTC.
    pub run_time: String,
    /// Pattern applied to message text to extract dedup codes.
    pub dedup_pattern: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            run_time: DEFAULT_RUN_TIME.into(),
            dedup_pattern: DEFAULT_DEDUP_PATTERN.into(),
        }
    }
}

impl CleanupConfig {
    pub fn validate(&self) -> Result<(), MirrorError> {
        parse_run_time(&self.run_time).ok_or_else(|| {
            MirrorError::Config(format!("run_time must be HH:MM, got '{}'", self.run_time))
        })?;
        compile_pattern(&self.dedup_pattern)?;
        Ok(())
    }
}

/// Parses "HH:MM" into (hour, minute). Returns None for anything else.
pub fn parse_run_time(value: &str) -> Option<(u32, u32)> {
    let (hour_str, minute_str) = value.trim().split_once(':')?;
    let hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = minute_str.parse().ok()?;
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}

fn compile_pattern(pattern: &str) -> Result<Regex, MirrorError> {
    Regex::new(pattern).map_err(|e| MirrorError::Config(format!("invalid dedup_pattern: {e}")))
}

/// A fully-applied view of the cleanup config with its pattern already
/// compiled. Readers hold an `Arc` so an update never changes fields under
/// them.
pub struct Snapshot {
    pub cleanup: CleanupConfig,
    pub pattern: Regex,
}

pub struct Settings {
    snap: RwLock<Arc<Snapshot>>,
}

impl Settings {
    pub fn new(cleanup: CleanupConfig) -> Result<Self, MirrorError> {
        cleanup.validate()?;
        let pattern = compile_pattern(&cleanup.dedup_pattern)?;
        Ok(Self {
            snap: RwLock::new(Arc::new(Snapshot { cleanup, pattern })),
        })
    }

    /// Loads the persisted config, writing `seed` on first run.
    pub fn load_or_seed(db: &Database, seed: CleanupConfig) -> Result<Self, MirrorError> {
        let cleanup = match db.load_cleanup_config()? {
            Some(cfg) => cfg,
            None => {
                db.save_cleanup_config(&seed)?;
                seed
            }
        };
        Self::new(cleanup)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snap.read().unwrap().clone()
    }

    /// Validates, persists, then swaps the snapshot. On any failure the
    /// previous snapshot stays in effect and the store is unchanged.
    pub fn update(&self, db: &Database, cleanup: CleanupConfig) -> Result<(), MirrorError> {
        cleanup.validate()?;
        let pattern = compile_pattern(&cleanup.dedup_pattern)?;
        db.save_cleanup_config(&cleanup)?;
        *self.snap.write().unwrap() = Arc::new(Snapshot { cleanup, pattern });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("tgmirror_test_{}", uuid::Uuid::new_v4()));
        let db = Database::new(dir.to_str().unwrap()).unwrap();
        (db, dir)
    }

    fn cleanup(dir: &std::path::Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_parse_run_time_valid() {
        assert_eq!(parse_run_time("00:05"), Some((0, 5)));
        assert_eq!(parse_run_time("23:59"), Some((23, 59)));
        assert_eq!(parse_run_time(" 9:30 "), Some((9, 30)));
    }

    #[test]
    fn test_parse_run_time_invalid() {
        assert_eq!(parse_run_time("24:00"), None);
        assert_eq!(parse_run_time("12:60"), None);
        assert_eq!(parse_run_time("12"), None);
        assert_eq!(parse_run_time("12:00:00"), None);
        assert_eq!(parse_run_time("noon"), None);
        assert_eq!(parse_run_time(""), None);
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let cfg = CleanupConfig {
            dedup_pattern: "[unclosed".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid dedup_pattern"));
    }

    #[test]
    fn test_validate_rejects_bad_run_time() {
        let cfg = CleanupConfig {
            run_time: "25:00".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_or_seed_persists_seed() {
        let (db, dir) = test_db();
        let seed = CleanupConfig {
            retention_days: 7,
            run_time: "03:15".into(),
            dedup_pattern: r"[A-Z]{4}".into(),
        };
        let settings = Settings::load_or_seed(&db, seed.clone()).unwrap();
        assert_eq!(settings.snapshot().cleanup, seed);

        // Second load reads the persisted row, ignoring a different seed.
        let other_seed = CleanupConfig::default();
        let settings = Settings::load_or_seed(&db, other_seed).unwrap();
        assert_eq!(settings.snapshot().cleanup, seed);
        cleanup(&dir);
    }

    #[test]
    fn test_update_swaps_snapshot() {
        let (db, dir) = test_db();
        let settings = Settings::new(CleanupConfig::default()).unwrap();
        let before = settings.snapshot();

        let next = CleanupConfig {
            retention_days: 3,
            run_time: "12:00".into(),
            dedup_pattern: r"\d{8}".into(),
        };
        settings.update(&db, next.clone()).unwrap();

        let after = settings.snapshot();
        assert_eq!(after.cleanup, next);
        assert!(after.pattern.is_match("12345678"));
        // The old snapshot is still intact for anyone who held it.
        assert_eq!(before.cleanup, CleanupConfig::default());

        assert_eq!(db.load_cleanup_config().unwrap(), Some(next));
        cleanup(&dir);
    }

    #[test]
    fn test_update_rejects_invalid_and_keeps_previous() {
        let (db, dir) = test_db();
        let settings = Settings::new(CleanupConfig::default()).unwrap();

        let bad = CleanupConfig {
            dedup_pattern: "(".into(),
            ..Default::default()
        };
        assert!(settings.update(&db, bad).is_err());

        assert_eq!(settings.snapshot().cleanup, CleanupConfig::default());
        assert_eq!(db.load_cleanup_config().unwrap(), None);
        cleanup(&dir);
    }
}
