//! Operator configuration from environment variables

use crate::error::OperatorError;
use reconcile_core::{ConvergenceWaiter, DEFAULT_ESTABLISH_POLL_INTERVAL, DEFAULT_ESTABLISH_TIMEOUT};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_BACKOFF_MIN_SECS: u64 = 10;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Runtime settings for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Address of the health probe server
    pub probe_bind_address: SocketAddr,
    /// Requeue delay after a cycle that was not blocked
    pub resync_interval: Duration,
    /// First retry delay after a blocked cycle
    pub backoff_min: Duration,
    /// Retry delay cap
    pub backoff_max: Duration,
    /// How long to wait for a CRD to become established
    pub crd_establish_timeout: Duration,
    pub crd_poll_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            probe_bind_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            backoff_min: Duration::from_secs(DEFAULT_BACKOFF_MIN_SECS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            crd_establish_timeout: DEFAULT_ESTABLISH_TIMEOUT,
            crd_poll_interval: DEFAULT_ESTABLISH_POLL_INTERVAL,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, OperatorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OperatorError> {
        let secs = |key: &str, default: u64| -> Result<Duration, OperatorError> {
            match lookup(key) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| OperatorError::InvalidConfig(format!("{key} must be a whole number of seconds, got '{raw}'"))),
            }
        };

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let bind = lookup("PROBE_BIND_ADDRESS").unwrap_or_else(|| DEFAULT_PROBE_BIND_ADDRESS.to_string());
        let probe_bind_address = bind
            .parse()
            .map_err(|_| OperatorError::InvalidConfig(format!("PROBE_BIND_ADDRESS '{bind}' is not a socket address")))?;

        let config = Self {
            watch_namespace,
            probe_bind_address,
            resync_interval: secs("RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?,
            backoff_min: secs("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS)?,
            backoff_max: secs("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?,
            crd_establish_timeout: secs("CRD_ESTABLISH_TIMEOUT_SECS", DEFAULT_ESTABLISH_TIMEOUT.as_secs())?,
            crd_poll_interval: secs("CRD_POLL_INTERVAL_SECS", DEFAULT_ESTABLISH_POLL_INTERVAL.as_secs())?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), OperatorError> {
        if self.resync_interval.is_zero() {
            return Err(OperatorError::InvalidConfig("RESYNC_INTERVAL_SECS must be positive".to_string()));
        }
        if self.backoff_min.is_zero() || self.backoff_min > self.backoff_max {
            return Err(OperatorError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECS ({}) <= BACKOFF_MAX_SECS ({})",
                self.backoff_min.as_secs(),
                self.backoff_max.as_secs()
            )));
        }
        self.crd_waiter()?;
        Ok(())
    }

    /// Waiter used when installing custom resource definitions
    pub fn crd_waiter(&self) -> Result<ConvergenceWaiter, OperatorError> {
        Ok(ConvergenceWaiter::new(self.crd_establish_timeout, self.crd_poll_interval)?)
    }
}
