//! Per-operation timeouts for facilitator calls.

use std::time::Duration;

/// Timeout applied to each facilitator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// `POST /verify`.
    pub verify: Duration,
    /// `POST /settle`.
    pub settle: Duration,
    /// `GET /supported`.
    pub supported: Duration,
}

/// A timeout combination that cannot work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    /// A timeout is zero.
    #[error("{0} timeout must be positive")]
    Zero(&'static str),
    /// Settlement is given less time than verification.
    #[error("settle timeout ({settle:?}) should be >= verify timeout ({verify:?})")]
    SettleShorterThanVerify {
        /// Configured settle timeout.
        settle: Duration,
        /// Configured verify timeout.
        verify: Duration,
    },
}

impl Timeouts {
    /// Default for every operation.
    pub const DEFAULT: Duration = Duration::from_secs(10);

    /// The same timeout for every operation.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            verify: timeout,
            settle: timeout,
            supported: timeout,
        }
    }

    /// Sets the verify timeout.
    #[must_use]
    pub const fn with_verify(mut self, timeout: Duration) -> Self {
        self.verify = timeout;
        self
    }

    /// Sets the settle timeout.
    #[must_use]
    pub const fn with_settle(mut self, timeout: Duration) -> Self {
        self.settle = timeout;
        self
    }

    /// Sets the supported-kinds timeout.
    #[must_use]
    pub const fn with_supported(mut self, timeout: Duration) -> Self {
        self.supported = timeout;
        self
    }

    /// Checks that every timeout is positive and settlement is not given
    /// less time than verification.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), TimeoutError> {
        for (name, value) in [
            ("verify", self.verify),
            ("settle", self.settle),
            ("supported", self.supported),
        ] {
            if value.is_zero() {
                return Err(TimeoutError::Zero(name));
            }
        }
        if self.settle < self.verify {
            return Err(TimeoutError::SettleShorterThanVerify {
                settle: self.settle,
                verify: self.verify,
            });
        }
        Ok(())
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Self::DEFAULT)
    }
}
