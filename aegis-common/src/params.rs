//! Runtime engine parameters
//!
//! Stored in the `settings` table, seeded by [`crate::db::init_database`] and
//! read once at startup. Unparseable or out-of-range values fall back to the
//! compiled default with a warning; a bad setting never prevents startup.

use crate::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Settings keys and their defaults, seeded at database initialization
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("race_deadline_ms", "500"),
    ("reconcile_interval_secs", "5"),
    ("reconcile_batch_size", "10"),
    ("reconcile_concurrency", "2"),
    ("reconcile_timeout_ms", "10000"),
    ("feedback_min_length", "3"),
    ("feedback_max_length", "5000"),
];

/// Tunables consumed by the race arbiter, reconciliation worker and normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    /// Hard ceiling for the AI side of a race
    ///
    /// Valid range: [10, 60000] ms, default 500 ms
    pub race_deadline: Duration,

    /// Period between background reconciliation sweeps
    ///
    /// Valid range: [1, 86400] s, default 5 s
    pub reconcile_interval: Duration,

    /// Fallback records picked up per sweep (default 10)
    pub reconcile_batch_size: usize,

    /// Concurrent AI calls during a sweep (default 2)
    pub reconcile_concurrency: usize,

    /// Per-call timeout during reconciliation (default 10 s)
    pub reconcile_timeout: Duration,

    /// Minimum sanitized length in characters (default 3)
    pub min_length: usize,

    /// Maximum sanitized length in characters (default 5000)
    pub max_length: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            race_deadline: Duration::from_millis(500),
            reconcile_interval: Duration::from_secs(5),
            reconcile_batch_size: 10,
            reconcile_concurrency: 2,
            reconcile_timeout: Duration::from_millis(10_000),
            min_length: 3,
            max_length: 5000,
        }
    }
}

impl EngineParams {
    /// Load parameters from the settings table
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(pool)
            .await?;
        let values: HashMap<String, String> = rows
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();

        let defaults = Self::default();
        let min_length = read_ranged(&values, "feedback_min_length", 1, 1000, defaults.min_length as u64) as usize;
        let mut max_length =
            read_ranged(&values, "feedback_max_length", 1, 100_000, defaults.max_length as u64) as usize;
        if max_length < min_length {
            warn!(
                min_length,
                max_length, "feedback_max_length below feedback_min_length, using default"
            );
            max_length = defaults.max_length.max(min_length);
        }

        Ok(Self {
            race_deadline: Duration::from_millis(read_ranged(
                &values,
                "race_deadline_ms",
                10,
                60_000,
                defaults.race_deadline.as_millis() as u64,
            )),
            reconcile_interval: Duration::from_secs(read_ranged(
                &values,
                "reconcile_interval_secs",
                1,
                86_400,
                defaults.reconcile_interval.as_secs(),
            )),
            reconcile_batch_size: read_ranged(
                &values,
                "reconcile_batch_size",
                1,
                1000,
                defaults.reconcile_batch_size as u64,
            ) as usize,
            reconcile_concurrency: read_ranged(
                &values,
                "reconcile_concurrency",
                1,
                64,
                defaults.reconcile_concurrency as u64,
            ) as usize,
            reconcile_timeout: Duration::from_millis(read_ranged(
                &values,
                "reconcile_timeout_ms",
                100,
                600_000,
                defaults.reconcile_timeout.as_millis() as u64,
            )),
            min_length,
            max_length,
        })
    }
}

fn read_ranged(values: &HashMap<String, String>, key: &str, min: u64, max: u64, default: u64) -> u64 {
    match values.get(key).map(|v| v.trim().parse::<u64>()) {
        Some(Ok(v)) if (min..=max).contains(&v) => v,
        Some(Ok(v)) => {
            warn!(key, value = v, min, max, default, "Setting out of range, using default");
            default
        }
        Some(Err(_)) => {
            warn!(key, raw = %values[key], default, "Setting is not a number, using default");
            default
        }
        None => default,
    }
}
