//! Repository for the `settings` table
//!
//! Key/value rows holding the milestone day offsets, template assignments,
//! per-run limits and operational flags. `load` reads the table fresh on
//! every call — callers must re-load before each run rather than caching.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::error::ScanError;
use crate::domain::settings::{ScanSettings, ScanThresholds};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Arc<SqlitePool>,
}

fn parse_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn string_or(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    map.get(key).cloned().unwrap_or_else(|| default.to_string())
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn all_rows(&self) -> Result<HashMap<String, String>, ScanError> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    /// Load and validate the full settings set. Missing keys fall back to
    /// defaults; invalid combinations surface as configuration errors and
    /// abort the batch before a session exists.
    pub async fn load(&self) -> Result<ScanSettings, ScanError> {
        let map = self.all_rows().await?;
        let defaults = ScanThresholds::default();

        let thresholds = ScanThresholds {
            heads_up_day: parse_or(&map, "heads_up_day", defaults.heads_up_day),
            choice_day: parse_or(&map, "choice_day", defaults.choice_day),
            gift_notice_day: parse_or(&map, "gift_notice_day", defaults.gift_notice_day),
            heads_up_template: string_or(&map, "heads_up_template", &defaults.heads_up_template),
            choice_template: string_or(&map, "choice_template", &defaults.choice_template),
            gift_notice_template: string_or(
                &map,
                "gift_notice_template",
                &defaults.gift_notice_template,
            ),
            max_shipments_per_run: parse_or(
                &map,
                "max_shipments_per_run",
                defaults.max_shipments_per_run,
            ),
            inter_item_delay_ms: parse_or(&map, "inter_item_delay_ms", defaults.inter_item_delay_ms),
        };
        thresholds.validate()?;

        let last_scheduled_run_at = map
            .get("last_scheduled_run_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(ScanSettings {
            thresholds,
            emergency_stop: parse_or(&map, "emergency_stop", false),
            auto_scan_enabled: parse_or(&map, "auto_scan_enabled", true),
            min_scheduled_interval_minutes: parse_or(&map, "min_scheduled_interval_minutes", 60),
            last_scheduled_run_at,
        })
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Stamp the scheduled-run guard timestamp.
    pub async fn record_scheduled_run(&self, at: DateTime<Utc>) -> Result<(), ScanError> {
        self.set("last_scheduled_run_at", &at.to_rfc3339()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::TimeZone;

    async fn test_repo() -> (tempfile::TempDir, SettingsRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("settings.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        (dir, SettingsRepository::new(db.pool().clone()))
    }

    #[tokio::test]
    async fn empty_table_yields_defaults() {
        let (_dir, repo) = test_repo().await;
        let settings = repo.load().await.unwrap();
        assert_eq!(settings.thresholds.heads_up_day, 3);
        assert_eq!(settings.thresholds.choice_day, 5);
        assert_eq!(settings.thresholds.gift_notice_day, 10);
        assert!(!settings.emergency_stop);
        assert!(settings.auto_scan_enabled);
        assert!(settings.last_scheduled_run_at.is_none());
    }

    #[tokio::test]
    async fn stored_values_override_defaults() {
        let (_dir, repo) = test_repo().await;
        repo.set("choice_day", "6").await.unwrap();
        repo.set("emergency_stop", "true").await.unwrap();
        repo.set("choice_template", "custom-choice").await.unwrap();

        let settings = repo.load().await.unwrap();
        assert_eq!(settings.thresholds.choice_day, 6);
        assert_eq!(settings.thresholds.choice_template, "custom-choice");
        assert!(settings.emergency_stop);
    }

    #[tokio::test]
    async fn invalid_threshold_combination_is_a_configuration_error() {
        let (_dir, repo) = test_repo().await;
        // choice before heads-up breaks the ascending invariant
        repo.set("choice_day", "2").await.unwrap();
        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }

    #[tokio::test]
    async fn scheduled_run_timestamp_round_trips() {
        let (_dir, repo) = test_repo().await;
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 3, 30, 0).unwrap();
        repo.record_scheduled_run(at).await.unwrap();
        let settings = repo.load().await.unwrap();
        assert_eq!(settings.last_scheduled_run_at, Some(at));
    }
}
