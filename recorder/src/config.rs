//! Recorder configuration
//!
//! Loaded from an optional config file layered under `ROLLCALL_*`
//! environment variables (e.g. `ROLLCALL_SPACE_ID`). Every tunable has a
//! default; the session and store identifiers and credentials do not, and
//! [`RecorderConfig::validate`] rejects a config that lacks any of them.

use crate::ledger::Growth;
use crate::resolver::PollPolicy;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use chrono::FixedOffset;
use rollcall_shared::utils::{parse_duration, time};
use rollcall_shared::EventLabels;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment prefix for every setting
pub const ENV_PREFIX: &str = "ROLLCALL";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Virtual space whose presence is recorded
    pub space_id: String,

    /// API key for the presence source
    pub source_api_key: String,

    /// Ledger document id
    pub store_id: String,

    /// Service account used to write the ledger
    pub service_account_email: String,
    pub service_account_key: String,

    /// Name of the identity table
    pub identity_table: String,

    /// Label column text for entries and exits
    pub enter_label: String,
    pub exit_label: String,

    /// Ledger time zone as seconds east of UTC (default: Asia/Tokyo)
    pub utc_offset_secs: i32,

    /// Rows added when a partition scan runs past the end, and the column
    /// count partitions are resized to
    pub growth_rows: u32,
    pub partition_cols: u32,

    /// Delay between identity lookups (e.g. "1000ms", "1s")
    pub poll_interval: String,

    /// Identity lookups before a sync task gives up
    pub poll_max_attempts: u32,

    /// Overall deadline for one identity to resolve
    pub poll_timeout: Option<String>,

    /// Max tasks waiting in each queue
    pub queue_capacity: usize,

    /// Store call attempts before a partition is reported unavailable
    pub store_retry_attempts: u32,

    /// First backoff delay between store attempts
    pub store_retry_delay: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            space_id: String::new(),
            source_api_key: String::new(),
            store_id: String::new(),
            service_account_email: String::new(),
            service_account_key: String::new(),
            identity_table: "Users".to_string(),
            enter_label: EventLabels::default().enter,
            exit_label: EventLabels::default().exit,
            utc_offset_secs: time::TOKYO_OFFSET_SECS,
            growth_rows: 1000,
            partition_cols: 3,
            poll_interval: "1000ms".to_string(),
            poll_max_attempts: 300,
            poll_timeout: None,
            queue_capacity: 1024,
            store_retry_attempts: 3,
            store_retry_delay: "500ms".to_string(),
        }
    }
}

// Credentials stay out of logs
impl std::fmt::Debug for RecorderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderConfig")
            .field("space_id", &self.space_id)
            .field("store_id", &self.store_id)
            .field("service_account_email", &self.service_account_email)
            .field("identity_table", &self.identity_table)
            .field("utc_offset_secs", &self.utc_offset_secs)
            .field("poll_interval", &self.poll_interval)
            .field("poll_max_attempts", &self.poll_max_attempts)
            .field("poll_timeout", &self.poll_timeout)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl RecorderConfig {
    /// Load `path` (if given) and overlay `ROLLCALL_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("space_id", &self.space_id),
            ("source_api_key", &self.source_api_key),
            ("store_id", &self.store_id),
            ("service_account_email", &self.service_account_email),
            ("service_account_key", &self.service_account_key),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| format!("{}_{}", ENV_PREFIX, key.to_uppercase()))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        if self.identity_table.trim().is_empty() {
            anyhow::bail!("identity_table must not be empty");
        }
        if time::is_partition_key(self.identity_table.trim()) {
            anyhow::bail!(
                "identity_table '{}' collides with a monthly partition name",
                self.identity_table
            );
        }
        if self.partition_cols < 3 {
            anyhow::bail!("partition_cols must be at least 3");
        }
        if self.growth_rows == 0 {
            anyhow::bail!("growth_rows must be greater than 0");
        }
        if self.poll_max_attempts == 0 {
            anyhow::bail!("poll_max_attempts must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }
        self.zone()?;
        self.poll_policy()?;
        self.retry_policy()?;
        Ok(())
    }

    pub fn zone(&self) -> Result<FixedOffset> {
        time::offset_from_secs(self.utc_offset_secs)
            .with_context(|| format!("utc_offset_secs out of range: {}", self.utc_offset_secs))
    }

    pub fn labels(&self) -> EventLabels {
        EventLabels {
            enter: self.enter_label.clone(),
            exit: self.exit_label.clone(),
        }
    }

    pub fn partition_growth(&self) -> Growth {
        Growth::new(self.growth_rows, self.partition_cols)
    }

    /// Identity rows only have two columns
    pub fn identity_growth(&self) -> Growth {
        Growth::new(self.growth_rows, 2)
    }

    pub fn poll_policy(&self) -> Result<PollPolicy> {
        let interval = parse_duration(&self.poll_interval)
            .with_context(|| format!("Invalid poll_interval: {}", self.poll_interval))?;
        let timeout = self
            .poll_timeout
            .as_deref()
            .map(|t| parse_duration(t).with_context(|| format!("Invalid poll_timeout: {}", t)))
            .transpose()?;
        Ok(PollPolicy {
            interval,
            max_attempts: self.poll_max_attempts,
            timeout,
        })
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let delay = parse_duration(&self.store_retry_delay)
            .with_context(|| format!("Invalid store_retry_delay: {}", self.store_retry_delay))?;
        Ok(RetryPolicy::new(self.store_retry_attempts, delay))
    }
}
