use std::{collections::HashMap, sync::Arc};

use super::Node;
use crate::Key;

/// Number of partitions the key space of every namespace is split into.
pub(crate) const PARTITIONS: usize = 4096;

/// Owner of every partition, per namespace. Partitions no node claimed yet are `None`.
pub(crate) type PartitionMap = HashMap<String, Vec<Option<Arc<Node>>>>;

/// A single partition of a namespace.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Partition<'a> {
    pub(crate) namespace: &'a str,
    pub(crate) partition_id: usize,
}

impl<'a> Partition<'a> {
    pub(crate) const fn new(namespace: &'a str, partition_id: usize) -> Self {
        Self {
            namespace,
            partition_id,
        }
    }

    pub(crate) fn new_by_key(key: &'a Key) -> Self {
        Self::new(&key.namespace, key.partition_id())
    }
}

/// Mark `node` as the owner of every partition whose bit is set in the namespace's bitmap. The
/// most significant bit of the first byte stands for partition 0.
pub(crate) fn apply_ownership(
    map: &mut PartitionMap,
    namespace: String,
    bitmap: &[u8],
    node: &Arc<Node>,
) {
    let owners = map
        .entry(namespace)
        .or_insert_with(|| vec![None; PARTITIONS]);

    for (id, owner) in owners.iter_mut().enumerate() {
        if bitmap
            .get(id >> 3)
            .is_some_and(|byte| byte & (0x80 >> (id & 7)) != 0)
        {
            *owner = Some(Arc::clone(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_of_key() {
        let key = Key::new("namespace", "set", 1);
        let partition = Partition::new_by_key(&key);

        assert_eq!("namespace", partition.namespace);
        assert_eq!(key.partition_id(), partition.partition_id);
        assert!(partition.partition_id < PARTITIONS);
    }
}
