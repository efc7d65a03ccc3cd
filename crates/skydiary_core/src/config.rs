//! Runtime configuration from environment variables.
//!
//! # Responsibility
//! - Read and validate every knob the mirror process uses.
//!
//! # Invariants
//! - `DID` and `JETSTREAM_HOST` are required by the feed mirror; everything
//!   else has a default.
//! - Malformed values are errors, never silently replaced by defaults.

use crate::firehose::subscriber::{
    DispatchMode, SubscriptionOptions, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE,
};
use crate::logging::LogLevel;
use crate::resolver::appview::{DEFAULT_APPVIEW_URL, DEFAULT_RESOLVE_TIMEOUT};
use crate::service::materializer::DeleteScope;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DID: &str = "DID";
pub const JETSTREAM_HOST: &str = "JETSTREAM_HOST";
pub const APPVIEW_URL: &str = "APPVIEW_URL";
pub const RESOLVER_TIMEOUT_MS: &str = "RESOLVER_TIMEOUT_MS";
pub const DISPATCH: &str = "SKYDIARY_DISPATCH";
pub const QUEUE_CAPACITY: &str = "SKYDIARY_QUEUE_CAPACITY";
pub const DELETE_SCOPE: &str = "SKYDIARY_DELETE_SCOPE";
pub const SHUTDOWN_GRACE_MS: &str = "SKYDIARY_SHUTDOWN_GRACE_MS";
pub const DB_PATH: &str = "SKYDIARY_DB_PATH";
pub const LOG_LEVEL: &str = "SKYDIARY_LOG_LEVEL";
pub const LOG_DIR: &str = "SKYDIARY_LOG_DIR";

const DEFAULT_DB_PATH: &str = "skydiary.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing { key: &'static str },
    Invalid { key: &'static str, value: String, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "{key} is not set"),
            Self::Invalid { key, value, reason } => {
                write!(f, "{key}=`{value}` is invalid: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings every command needs: storage, logging and materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub appview_url: String,
    pub resolver_timeout: Duration,
    pub delete_scope: DeleteScope,
    pub db_path: PathBuf,
    /// `None` means the build-mode default.
    pub log_level: Option<LogLevel>,
    /// `None` means `<cwd>/logs`.
    pub log_dir: Option<PathBuf>,
}

impl LocalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| non_empty(&lookup, key);

        let resolver_timeout = match get(RESOLVER_TIMEOUT_MS) {
            Some(value) => Duration::from_millis(parse_positive(RESOLVER_TIMEOUT_MS, &value)?),
            None => DEFAULT_RESOLVE_TIMEOUT,
        };

        Ok(Self {
            appview_url: get(APPVIEW_URL).unwrap_or_else(|| DEFAULT_APPVIEW_URL.to_string()),
            resolver_timeout,
            delete_scope: get(DELETE_SCOPE)
                .map(|value| parse_delete_scope(&value))
                .transpose()?
                .unwrap_or_default(),
            db_path: get(DB_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            log_level: get(LOG_LEVEL)
                .map(|value| {
                    value
                        .parse::<LogLevel>()
                        .map_err(|err| invalid(LOG_LEVEL, &value, &err.to_string()))
                })
                .transpose()?,
            log_dir: get(LOG_DIR).map(PathBuf::from),
        })
    }
}

/// Settings of the long-running feed mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirehoseConfig {
    pub actor_id: String,
    /// Feed hosts, one subscriber each.
    pub hosts: Vec<String>,
    pub dispatch: DispatchMode,
    pub queue_capacity: usize,
    pub shutdown_grace: Duration,
    pub local: LocalConfig,
}

impl FirehoseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| non_empty(&lookup, key);

        let actor_id = get(DID).ok_or(ConfigError::Missing { key: DID })?;
        if !actor_id.starts_with("did:") {
            return Err(invalid(DID, &actor_id, "expected a `did:` identifier"));
        }

        let hosts_raw = get(JETSTREAM_HOST).ok_or(ConfigError::Missing {
            key: JETSTREAM_HOST,
        })?;
        let hosts: Vec<String> = hosts_raw
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(invalid(JETSTREAM_HOST, &hosts_raw, "no host listed"));
        }

        let shutdown_grace = match get(SHUTDOWN_GRACE_MS) {
            Some(value) => Duration::from_millis(parse_number(SHUTDOWN_GRACE_MS, &value)?),
            None => DEFAULT_SHUTDOWN_GRACE,
        };
        let queue_capacity = match get(QUEUE_CAPACITY) {
            Some(value) => usize::try_from(parse_positive(QUEUE_CAPACITY, &value)?)
                .map_err(|_| invalid(QUEUE_CAPACITY, &value, "too large"))?,
            None => DEFAULT_QUEUE_CAPACITY,
        };

        Ok(Self {
            actor_id,
            hosts,
            dispatch: get(DISPATCH)
                .map(|value| parse_dispatch(&value))
                .transpose()?
                .unwrap_or_default(),
            queue_capacity,
            shutdown_grace,
            local: LocalConfig::from_lookup(&lookup)?,
        })
    }

    /// Subscriber options shared by every host; `host` is filled per feed.
    pub fn subscription_template(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            host: String::new(),
            actor_id: self.actor_id.clone(),
            dispatch: self.dispatch,
            queue_capacity: self.queue_capacity,
            shutdown_grace: self.shutdown_grace,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses `serial` or `keyed:<workers>`.
pub fn parse_dispatch(value: &str) -> Result<DispatchMode, ConfigError> {
    let normalized = value.trim().to_ascii_lowercase();
    if normalized == "serial" {
        return Ok(DispatchMode::Serial);
    }
    if let Some(workers) = normalized.strip_prefix("keyed:") {
        let workers = parse_positive(DISPATCH, workers)?;
        let workers = usize::try_from(workers).map_err(|_| invalid(DISPATCH, value, "too large"))?;
        return Ok(DispatchMode::Keyed { workers });
    }
    Err(invalid(DISPATCH, value, "expected `serial` or `keyed:<n>`"))
}

pub fn parse_delete_scope(value: &str) -> Result<DeleteScope, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "record" => Ok(DeleteScope::Record),
        "actor" => Ok(DeleteScope::Actor),
        _ => Err(invalid(DELETE_SCOPE, value, "expected `record` or `actor`")),
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| invalid(key, value, &err.to_string()))
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse_number(key, value)? {
        0 => Err(invalid(key, value, "must be greater than zero")),
        number => Ok(number),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
