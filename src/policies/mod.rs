//! Policy types encapsulate optional parameters for various client operations.
//!
//! Every command policy embeds a [`BasePolicy`] and starts out with the driver defaults. Fields
//! are public, and the `with_*` builders override one field at a time, leaving all others
//! untouched.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use windpike::policies::{Expiration, WritePolicy};
//!
//! let policy = WritePolicy::default()
//!     .with_total_timeout(Duration::from_millis(250))
//!     .with_max_retries(2)
//!     .with_expiration(Expiration::Seconds(60));
//!
//! assert_eq!(2, policy.base_policy.max_retries);
//! assert!(!policy.base_policy.send_key);
//! ```

/// Implement [`AsRef`]/[`AsMut`] for the embedded base policy.
macro_rules! base_policy {
    ($($ty:ty),+) => {
        $(
            impl AsRef<$crate::policies::BasePolicy> for $ty {
                fn as_ref(&self) -> &$crate::policies::BasePolicy {
                    &self.base_policy
                }
            }

            impl AsMut<$crate::policies::BasePolicy> for $ty {
                fn as_mut(&mut self) -> &mut $crate::policies::BasePolicy {
                    &mut self.base_policy
                }
            }
        )+
    };
}

mod admin_policy;
mod batch_policy;
mod client_policy;
mod query_policy;
mod scan_policy;
mod write_policy;

use tokio::time::{Duration, Instant};

pub use self::{
    admin_policy::AdminPolicy,
    batch_policy::{
        BatchDeletePolicy, BatchPolicy, BatchReadPolicy, BatchUdfPolicy, BatchWritePolicy,
        Concurrency,
    },
    client_policy::ClientPolicy,
    query_policy::QueryPolicy,
    scan_policy::ScanPolicy,
    write_policy::{CommitLevel, Expiration, GenerationPolicy, RecordExistsAction, WritePolicy},
};
use crate::{errors::Error, exp::Expression};

/// Policy for single record reads.
pub type ReadPolicy = BasePolicy;

/// `ConsistencyLevel` indicates how replicas should be consulted in a read
/// operation to provide the desired consistency guarantee.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConsistencyLevel {
    /// Only a single replica should be consulted in the read operation.
    #[default]
    One,
    /// All replicas should be consulted in the read operation.
    All,
}

/// Trait implemented by all command policies, giving uniform access to the embedded
/// [`BasePolicy`].
pub trait Policy: AsRef<BasePolicy> {
    /// Point in time at which the whole command, including retries, gives up. `None` if the total
    /// timeout is zero.
    #[doc(hidden)]
    fn deadline(&self) -> Option<Instant> {
        let timeout = self.as_ref().total_timeout;
        (!timeout.is_zero()).then(|| Instant::now() + timeout)
    }

    /// Time budget for a single attempt. The socket timeout is capped by whatever is left until
    /// the deadline.
    #[doc(hidden)]
    fn attempt_timeout(&self, deadline: Option<Instant>) -> Option<Duration> {
        let socket = self.as_ref().socket_timeout;
        let socket = (!socket.is_zero()).then_some(socket);
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

        match (socket, remaining) {
            (Some(s), Some(r)) => Some(s.min(r)),
            (s, r) => s.or(r),
        }
    }

    /// Pause before the given retry (starting at 1).
    #[doc(hidden)]
    fn retry_delay(&self, retry: usize) -> Duration {
        let base = self.as_ref();
        let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = base.sleep_multiplier.powi(exp);
        let factor = if factor.is_nan() || factor <= 0.0 {
            1.0
        } else {
            factor.min(1e6)
        };
        base.sleep_between_retries.mul_f64(factor)
    }

    /// Timeout in milliseconds that is sent to the server with the command.
    #[doc(hidden)]
    fn server_timeout(&self) -> u32 {
        u32::try_from(self.as_ref().total_timeout.as_millis()).unwrap_or(u32::MAX)
    }

    /// Check the policy for values the client refuses to work with.
    fn validate(&self) -> Result<(), Error> {
        let base = self.as_ref();
        if base.sleep_multiplier.is_nan() || base.sleep_multiplier < 1.0 {
            return Err(Error::invalid_argument(format!(
                "sleep multiplier must be at least 1.0, got {}",
                base.sleep_multiplier
            )));
        }
        Ok(())
    }
}

impl<T> Policy for T where T: AsRef<BasePolicy> {}

/// Common parameters shared by all policy types.
#[derive(Debug, Clone)]
pub struct BasePolicy {
    /// How replicas should be consulted in a read operation to provide the desired
    /// consistency guarantee. Default to allowing one replica to be used in the
    /// read operation.
    pub consistency_level: ConsistencyLevel,

    /// End-to-end budget of a command, including all retries. The value is also sent to the
    /// server, so it can abort work the client no longer waits for. Zero means no limit, in which
    /// case only `max_retries` bounds the command.
    ///
    /// Default: 1s
    pub total_timeout: Duration,

    /// Budget of a single attempt. Capped by the time left of `total_timeout`. Zero means every
    /// attempt may use the full remaining total timeout.
    ///
    /// Default: 30s
    pub socket_timeout: Duration,

    /// Maximum number of retries before aborting the current command. A retry is attempted when
    /// there is a network error or the server reports a temporary condition. Commands that are
    /// not idempotent may be applied twice when retried.
    ///
    /// Default: 2
    pub max_retries: usize,

    /// Duration to sleep before the first retry. Zero skips the sleep.
    ///
    /// Default: 1ms
    pub sleep_between_retries: Duration,

    /// Factor by which the sleep grows with each further retry. Must be at least 1.0.
    ///
    /// Default: 1.0
    pub sleep_multiplier: f64,

    /// Send user defined key in addition to hash digest on both reads and writes.
    /// The default is to not send the user defined key.
    pub send_key: bool,

    /// Expression evaluated by the server against the record before the command is applied. If
    /// it evaluates to false, the command is skipped and reported as
    /// [`ResultCode::FilteredOut`](crate::ResultCode::FilteredOut).
    pub filter_expression: Option<Expression>,
}

impl Default for BasePolicy {
    fn default() -> Self {
        Self {
            consistency_level: ConsistencyLevel::default(),
            total_timeout: Duration::from_secs(1),
            socket_timeout: Duration::from_secs(30),
            max_retries: 2,
            sleep_between_retries: Duration::from_millis(1),
            sleep_multiplier: 1.0,
            send_key: false,
            filter_expression: None,
        }
    }
}

impl AsRef<BasePolicy> for BasePolicy {
    fn as_ref(&self) -> &BasePolicy {
        self
    }
}

impl AsMut<BasePolicy> for BasePolicy {
    fn as_mut(&mut self) -> &mut BasePolicy {
        self
    }
}

macro_rules! builders {
    ($($ty:ty),+) => {
        $(
            impl $ty {
                #[must_use]
                pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).total_timeout = timeout;
                    self
                }

                #[must_use]
                pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).socket_timeout = timeout;
                    self
                }

                #[must_use]
                pub fn with_max_retries(mut self, retries: usize) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).max_retries = retries;
                    self
                }

                #[must_use]
                pub fn with_sleep_between_retries(mut self, sleep: Duration) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).sleep_between_retries = sleep;
                    self
                }

                #[must_use]
                pub fn with_sleep_multiplier(mut self, multiplier: f64) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).sleep_multiplier = multiplier;
                    self
                }

                #[must_use]
                pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).consistency_level = level;
                    self
                }

                #[must_use]
                pub fn with_send_key(mut self, send_key: bool) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).send_key = send_key;
                    self
                }

                #[must_use]
                pub fn with_filter_expression(mut self, expression: Expression) -> Self {
                    AsMut::<BasePolicy>::as_mut(&mut self).filter_expression = Some(expression);
                    self
                }
            }
        )+
    };
}

builders!(BasePolicy, WritePolicy, BatchPolicy, ScanPolicy, QueryPolicy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_field_wise() {
        let policy = BasePolicy::default()
            .with_max_retries(7)
            .with_send_key(true);

        assert_eq!(7, policy.max_retries);
        assert!(policy.send_key);
        assert_eq!(Duration::from_secs(1), policy.total_timeout);
        assert_eq!(Duration::from_millis(1), policy.sleep_between_retries);
    }

    #[test]
    fn writes_do_not_retry_by_default() {
        assert_eq!(0, WritePolicy::default().base_policy.max_retries);
        assert_eq!(2, BasePolicy::default().max_retries);
    }

    #[test]
    fn backoff_grows_with_multiplier() {
        let policy = BasePolicy::default()
            .with_sleep_between_retries(Duration::from_millis(10))
            .with_sleep_multiplier(2.0);

        assert_eq!(Duration::from_millis(10), policy.retry_delay(1));
        assert_eq!(Duration::from_millis(20), policy.retry_delay(2));
        assert_eq!(Duration::from_millis(40), policy.retry_delay(3));
    }

    #[test]
    fn multiplier_below_one_is_rejected() {
        let policy = BasePolicy::default().with_sleep_multiplier(0.5);
        assert!(policy.validate().is_err());
        assert!(BasePolicy::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn socket_timeout_is_capped_by_total() {
        let policy = BasePolicy::default()
            .with_total_timeout(Duration::from_millis(100))
            .with_socket_timeout(Duration::from_secs(5));
        let deadline = policy.deadline();

        assert_eq!(
            Some(Duration::from_millis(100)),
            policy.attempt_timeout(deadline)
        );

        let unlimited = BasePolicy::default()
            .with_total_timeout(Duration::ZERO)
            .with_socket_timeout(Duration::ZERO);
        assert_eq!(None, unlimited.deadline());
        assert_eq!(None, unlimited.attempt_timeout(None));
    }
}
