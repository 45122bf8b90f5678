//! Configuration for the session manager.

use std::time::Duration;

use larkdocs_mcp::SUPPORTED_PROTOCOL_VERSIONS;

/// Default maximum number of live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default idle timeout (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Option<Duration> = Some(Duration::from_secs(30 * 60));

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of live sessions; further `initialize` calls are refused.
    pub max_sessions: usize,

    /// Sessions not seen within this duration are closed.
    /// `None` disables idle eviction.
    pub idle_timeout: Option<Duration>,

    /// Whether to run a periodic sweep of idle sessions.
    /// If false, idle sessions are only closed when next looked up.
    pub enable_cleanup_task: bool,

    /// Interval for the cleanup task (if enabled).
    pub cleanup_interval: Duration,

    /// Protocol versions accepted at session creation.
    pub supported_versions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            enable_cleanup_task: true,
            cleanup_interval: Duration::from_secs(60),
            supported_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Disable idle eviction (sessions live until closed).
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Enable or disable the background cleanup task.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Replace the accepted protocol versions.
    pub fn with_supported_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a protocol version is accepted.
    pub fn supports(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }
}
