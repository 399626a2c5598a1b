use crate::{
    cluster::partition::PARTITIONS,
    errors::{Error, Result},
    key::DIGEST_SIZE,
    Key,
};

/// Selection of partitions a scan or query runs over, together with the progress made in each.
///
/// Pass the filter returned by [`Recordset::partition_filter`](super::Recordset::partition_filter)
/// to the next call to continue where the previous one stopped, for example when paging through
/// a set with a `max_records` limit.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionFilter {
    begin: u16,
    count: u16,
    digest: Option<[u8; DIGEST_SIZE]>,
    pub(crate) partitions: Vec<PartitionStatus>,
    pub(crate) done: bool,
}

/// Progress of a single partition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionStatus {
    pub id: u16,
    /// Digest of the last record received from this partition. Further requests continue after
    /// it.
    pub digest: Option<[u8; DIGEST_SIZE]>,
    /// The partition still has records to deliver.
    pub retry: bool,
}

impl PartitionFilter {
    /// Cover every partition.
    #[must_use]
    pub const fn all() -> Self {
        Self::by_range(0, PARTITIONS as u16)
    }

    #[must_use]
    pub const fn by_id(id: u16) -> Self {
        Self::by_range(id, 1)
    }

    /// Cover `count` partitions starting with `begin`.
    #[must_use]
    pub const fn by_range(begin: u16, count: u16) -> Self {
        Self {
            begin,
            count,
            digest: None,
            partitions: Vec::new(),
            done: false,
        }
    }

    /// Cover the partition of the key, starting after the key's record.
    #[must_use]
    pub fn by_key(key: &Key) -> Self {
        Self {
            digest: Some(key.digest()),
            ..Self::by_id(key.partition_id() as u16)
        }
    }

    /// All partitions delivered their records.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn partitions(&self) -> &[PartitionStatus] {
        &self.partitions
    }

    /// Set up the status list on first use.
    pub(crate) fn prepare(&mut self) -> Result<()> {
        if !self.partitions.is_empty() {
            return Ok(());
        }

        let end = usize::from(self.begin) + usize::from(self.count);
        if self.count == 0 || end > PARTITIONS {
            return Err(Error::invalid_argument(format!(
                "invalid partition range {}..{end}",
                self.begin
            )));
        }

        self.partitions = (self.begin..self.begin + self.count)
            .map(|id| PartitionStatus {
                id,
                digest: None,
                retry: true,
            })
            .collect();
        if let Some(first) = self.partitions.first_mut() {
            first.digest = self.digest;
        }

        Ok(())
    }

    pub(crate) fn status_mut(&mut self, id: u16) -> Option<&mut PartitionStatus> {
        let index = id.checked_sub(self.begin)?;
        self.partitions.get_mut(usize::from(index))
    }
}
