//! Configuration for the worker and the notification producer.
//!
//! All configuration is loaded from environment variables. Both binaries
//! need S3 credentials, the bucket route, and the NATS stream; the worker
//! additionally needs the ledger path and cycle tuning, the producer the
//! inline copy size ceiling.
//!
//! Loading goes through a lookup function so the parsing rules can be tested
//! without touching the process environment.

use std::fmt;
use std::time::Duration;

use backup_core::producer::DEFAULT_SIZE_CEILING;
use backup_core::{CopyRoute, CycleSettings, SchedulerSettings};

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "content-backup";
/// Default subject lifecycle events are published on.
pub const DEFAULT_SUBJECT: &str = "content-backup.events";
/// Default durable consumer name.
pub const DEFAULT_CONSUMER: &str = "content-backup-worker";
/// Default ledger path.
pub const DEFAULT_DATABASE: &str = "backup.db";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required env var {name}")]
    Missing {
        /// Variable name.
        name: String,
    },

    /// A variable is set but cannot be parsed.
    #[error("invalid {name}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        name: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Access key pair for the S3 API.
#[derive(Clone)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// How to reach the S3 API.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Static credentials.
    pub credentials: Credentials,
    /// Endpoint of an S3-compatible store, addressed path-style. `None`
    /// resolves the AWS regional endpoints.
    pub endpoint: Option<String>,
}

/// Where lifecycle events live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// NATS server URL (e.g. `nats://localhost:4222`).
    pub nats_url: String,
    /// JetStream stream name.
    pub stream: String,
    /// Subject the stream is bound to.
    pub subject: String,
    /// Durable pull consumer name.
    pub consumer: String,
}

/// Configuration for `backup-worker`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// S3 access.
    pub s3: S3Config,
    /// Source and target buckets.
    pub route: CopyRoute,
    /// Lifecycle queue.
    pub queue: QueueConfig,
    /// Path of the SQLite ledger file.
    pub database_path: String,
    /// Batch size, copy budget and staleness window.
    pub cycle: CycleSettings,
}

/// Configuration for `backup-notify`.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// S3 access.
    pub s3: S3Config,
    /// Source and target buckets. The source region is replaced by the
    /// region named in each notification record.
    pub route: CopyRoute,
    /// Lifecycle queue.
    pub queue: QueueConfig,
    /// Objects at or above this size are not copied inline.
    pub size_ceiling: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `ACCESS_KEY_ID`, `SECRET_ACCESS_KEY` -- S3 credentials
    /// - `SOURCE_BUCKET`, `SOURCE_REGION` -- bucket copied from
    /// - `TARGET_BUCKET`, `TARGET_REGION` -- bucket copied to
    /// - `NATS_URL` -- NATS server connection string
    ///
    /// Optional variables:
    /// - `QUEUE_STREAM` -- stream name (default `content-backup`)
    /// - `QUEUE_SUBJECT` -- subject (default `content-backup.events`)
    /// - `QUEUE_CONSUMER` -- durable consumer (default `content-backup-worker`)
    /// - `BACKUP_DB` -- ledger path (default `backup.db`)
    /// - `QUEUE_BATCH_SIZE` -- messages per fetch (default 10)
    /// - `COPY_BUDGET_SECS` -- scheduler time budget (default 1800)
    /// - `STALE_AFTER_SECS` -- pending age before retry (default 3600)
    /// - `S3_ENDPOINT` -- endpoint of an S3-compatible store (path-style)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let route = CopyRoute {
            source_bucket: vars.required("SOURCE_BUCKET")?,
            source_region: vars.required("SOURCE_REGION")?,
            target_bucket: vars.required("TARGET_BUCKET")?,
            target_region: vars.required("TARGET_REGION")?,
        };

        let batch_size: usize = vars.parsed_or("QUEUE_BATCH_SIZE", 10)?;
        if batch_size == 0 {
            return Err(vars.invalid("QUEUE_BATCH_SIZE", "must be at least 1"));
        }
        let budget_secs: u64 = vars.parsed_or("COPY_BUDGET_SECS", 1800)?;
        let stale_secs: u64 = vars.parsed_or("STALE_AFTER_SECS", 3600)?;

        Ok(Self {
            s3: vars.s3()?,
            route,
            queue: vars.queue()?,
            database_path: vars.or("BACKUP_DB", DEFAULT_DATABASE),
            cycle: CycleSettings {
                batch_size,
                scheduler: SchedulerSettings {
                    budget: Duration::from_secs(budget_secs),
                    stale_after: Duration::from_secs(stale_secs),
                },
            },
        })
    }
}

impl NotifyConfig {
    /// Load configuration from environment variables.
    ///
    /// Uses the same S3, bucket and queue variables as
    /// [`WorkerConfig::from_env`], except that `SOURCE_REGION` is optional
    /// (default `us-east-1`). Adds:
    /// - `SIZE_CEILING_BYTES` -- inline copy ceiling (default 200 GiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let route = CopyRoute {
            source_bucket: vars.required("SOURCE_BUCKET")?,
            source_region: vars.or("SOURCE_REGION", "us-east-1"),
            target_bucket: vars.required("TARGET_BUCKET")?,
            target_region: vars.required("TARGET_REGION")?,
        };

        Ok(Self {
            s3: vars.s3()?,
            route,
            queue: vars.queue()?,
            size_ceiling: vars.parsed_or("SIZE_CEILING_BYTES", DEFAULT_SIZE_CEILING)?,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-empty, trimmed.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::Missing {
            name: name.to_owned(),
        })
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_owned())
    }

    fn parsed_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.get(name).map_or(Ok(default), |value| {
            value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name: name.to_owned(),
                value,
                reason: e.to_string(),
            })
        })
    }

    fn invalid(&self, name: &str, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            name: name.to_owned(),
            value: self.get(name).unwrap_or_default(),
            reason: reason.to_owned(),
        }
    }

    fn s3(&self) -> Result<S3Config, ConfigError> {
        let credentials = Credentials {
            access_key_id: self.required("ACCESS_KEY_ID")?,
            secret_access_key: self.required("SECRET_ACCESS_KEY")?,
        };

        let endpoint = self.get("S3_ENDPOINT");
        if let Some(raw) = &endpoint {
            let host = raw
                .strip_prefix("https://")
                .or_else(|| raw.strip_prefix("http://"));
            if host.is_none_or(|host| host.trim_matches('/').is_empty()) {
                return Err(self.invalid("S3_ENDPOINT", "expected an http(s) URL with a host"));
            }
        }

        Ok(S3Config {
            credentials,
            endpoint,
        })
    }

    fn queue(&self) -> Result<QueueConfig, ConfigError> {
        Ok(QueueConfig {
            nats_url: self.required("NATS_URL")?,
            stream: self.or("QUEUE_STREAM", DEFAULT_STREAM),
            subject: self.or("QUEUE_SUBJECT", DEFAULT_SUBJECT),
            consumer: self.or("QUEUE_CONSUMER", DEFAULT_CONSUMER),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("ACCESS_KEY_ID", "AKIDEXAMPLE"),
        ("SECRET_ACCESS_KEY", "super-secret"),
        ("SOURCE_BUCKET", "content"),
        ("SOURCE_REGION", "us-east-2"),
        ("TARGET_BUCKET", "content-backup"),
        ("TARGET_REGION", "us-west-2"),
        ("NATS_URL", "nats://localhost:4222"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn worker_defaults() {
        let config = WorkerConfig::from_lookup(env(REQUIRED)).unwrap();
        assert_eq!(config.queue.stream, DEFAULT_STREAM);
        assert_eq!(config.queue.subject, DEFAULT_SUBJECT);
        assert_eq!(config.queue.consumer, DEFAULT_CONSUMER);
        assert_eq!(config.database_path, "backup.db");
        assert_eq!(config.cycle, CycleSettings::default());
        assert!(config.s3.endpoint.is_none());
        assert_eq!(config.route.source_region, "us-east-2");
    }

    #[test]
    fn worker_overrides() {
        let config = WorkerConfig::from_lookup(env(&with(&[
            ("QUEUE_BATCH_SIZE", "25"),
            ("COPY_BUDGET_SECS", "60"),
            ("STALE_AFTER_SECS", "120"),
            ("BACKUP_DB", "/var/lib/backup/ledger.db"),
            ("S3_ENDPOINT", "http://localhost:9000"),
        ])))
        .unwrap();
        assert_eq!(config.cycle.batch_size, 25);
        assert_eq!(config.cycle.scheduler.budget, Duration::from_secs(60));
        assert_eq!(config.cycle.scheduler.stale_after, Duration::from_secs(120));
        assert_eq!(config.database_path, "/var/lib/backup/ledger.db");
        assert_eq!(
            config.s3.endpoint.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn endpoint_must_be_an_http_url() {
        for raw in ["localhost:9000", "ftp://store", "https://"] {
            let err = WorkerConfig::from_lookup(env(&with(&[("S3_ENDPOINT", raw)]))).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref name, .. } if name == "S3_ENDPOINT"),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn missing_required_variable_is_named() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "TARGET_BUCKET")
            .collect();
        let err = WorkerConfig::from_lookup(env(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                name: "TARGET_BUCKET".to_owned()
            }
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = WorkerConfig::from_lookup(env(&with(&[("NATS_URL", "  ")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref name } if name == "NATS_URL"));
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let err =
            WorkerConfig::from_lookup(env(&with(&[("COPY_BUDGET_SECS", "half an hour")])))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "COPY_BUDGET_SECS"));

        let err = WorkerConfig::from_lookup(env(&with(&[("QUEUE_BATCH_SIZE", "0")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "QUEUE_BATCH_SIZE"));
    }

    #[test]
    fn notify_defaults_source_region_and_ceiling() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "SOURCE_REGION")
            .collect();
        let config = NotifyConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.route.source_region, "us-east-1");
        assert_eq!(config.size_ceiling, DEFAULT_SIZE_CEILING);

        let config =
            NotifyConfig::from_lookup(env(&with(&[("SIZE_CEILING_BYTES", "1048576")]))).unwrap();
        assert_eq!(config.size_ceiling, 1_048_576);
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = WorkerConfig::from_lookup(env(REQUIRED)).unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
