use std::time::Duration;

/// Policy attributes used for user administration, index and UDF management commands.
#[derive(Debug, Clone, Copy)]
pub struct AdminPolicy {
    /// Total transaction timeout for both client and server.
    pub timeout: Duration,
}

impl Default for AdminPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}
