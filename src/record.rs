use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{Key, Value};

/// Container object for a database record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Record key. Only set for records returned by scans, queries and batches, where the caller
    /// needs it to tell the records apart.
    pub key: Option<Key>,

    /// Map of named record bins.
    pub bins: HashMap<String, Value>,

    /// Record modification count.
    pub generation: u32,

    /// Date record will expire, in seconds from Jan 01 2010, 00:00:00 UTC.
    pub(crate) expiration: u32,
}

impl Record {
    #[must_use]
    pub(crate) const fn new(
        key: Option<Key>,
        bins: HashMap<String, Value>,
        generation: u32,
        expiration: u32,
    ) -> Self {
        Self {
            key,
            bins,
            generation,
            expiration,
        }
    }

    /// Returns the remaining time-to-live (TTL, a.k.a. expiration time) for the record or `None`
    /// if the record never expires.
    #[must_use]
    pub fn time_to_live(&self) -> Option<Duration> {
        (self.expiration > 0).then(|| {
            let expiration = citrusleaf_epoch() + Duration::new(u64::from(self.expiration), 0);
            expiration
                .duration_since(SystemTime::now())
                .ok()
                .unwrap_or(Duration::new(1, 0))
        })
    }

    /// Raw expiration as reported by the server, in seconds since the Aerospike epoch. Zero means
    /// the record never expires.
    #[must_use]
    pub const fn expiration(&self) -> u32 {
        self.expiration
    }

    #[must_use]
    pub fn get(&self, bin: &str) -> Option<&Value> {
        self.bins.get(bin)
    }
}

/// Aerospike's own epoch time, which is `Fri Jan  1 00:00:00 UTC 2010`.
#[inline]
fn citrusleaf_epoch() -> SystemTime {
    UNIX_EPOCH + Duration::new(1_262_304_000, 0)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::{Duration, SystemTime},
    };

    use super::{citrusleaf_epoch, Record};

    #[test]
    fn ttl_expiration_future() {
        let expiration = SystemTime::now() + Duration::new(1000, 0);
        let secs_since_epoch = expiration
            .duration_since(citrusleaf_epoch())
            .unwrap()
            .as_secs();
        let record = Record::new(None, HashMap::new(), 0, secs_since_epoch as u32);
        let ttl = record.time_to_live();
        assert!(ttl.is_some());
        assert!(1000 - ttl.unwrap().as_secs() <= 1);
    }

    #[test]
    fn ttl_expiration_past() {
        let record = Record::new(None, HashMap::new(), 0, 0x0d00_d21c);
        assert_eq!(record.time_to_live(), Some(Duration::new(1u64, 0)));
    }

    #[test]
    fn ttl_never_expires() {
        let record = Record::new(None, HashMap::new(), 0, 0);
        assert_eq!(record.time_to_live(), None);
    }
}
