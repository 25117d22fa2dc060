//! Per-commit options
//!
//! Retry uses a fixed delay between attempts, not exponential backoff.

use std::time::Duration;

/// Default maximum number of intents per batch
pub const DEFAULT_MAX_MUTATIONS: usize = 1000;
/// Default retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Options controlling one `commit_with` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    /// Reject batches with more intents than this
    pub max_mutations: usize,
    /// Run pre-flight existence and schema checks
    pub validate: bool,
    /// Deadline for the store commit (`None` = wait forever)
    pub timeout: Option<Duration>,
    /// Retry rejected or transiently failed commits
    pub retry: bool,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait between attempts
    pub retry_delay: Duration,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            max_mutations: DEFAULT_MAX_MUTATIONS,
            validate: true,
            timeout: None,
            retry: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl CommitOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with retries disabled
    pub fn no_retry() -> Self {
        Self {
            retry: false,
            ..Default::default()
        }
    }

    /// Set the batch size limit
    pub fn with_max_mutations(mut self, max_mutations: usize) -> Self {
        self.max_mutations = max_mutations;
        self
    }

    /// Enable or disable pre-flight validation
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set a commit deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable retries
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Set the number of retries after the first attempt
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the fixed delay between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Total attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        if self.retry {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}
