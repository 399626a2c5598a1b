use std::collections::HashSet;

use windpike::{
    policies::{ScanPolicy, WritePolicy},
    query::{PartitionFilter, Recordset},
    Bin, Bins, Client, Key, Value,
};

use crate::{common, fake::NAMESPACE};

const SET: &str = "scan";
const RECORDS: i64 = 200;

async fn create_records(client: &Client) {
    let wpolicy = WritePolicy::default();
    for i in 0..RECORDS {
        let key = Key::new(NAMESPACE, SET, i);
        client
            .put(&wpolicy, &key, &[Bin::new("i", i), Bin::new("name", "scan")])
            .await
            .unwrap();
    }

    let other = Key::new(NAMESPACE, "other", 0);
    client
        .put(&wpolicy, &other, &[Bin::new("i", -1)])
        .await
        .unwrap();
}

/// Drain the recordset, returning the digests of all records.
async fn collect(recordset: &Recordset) -> Vec<[u8; 20]> {
    let mut digests = Vec::new();
    while let Some(record) = recordset.next().await {
        let record = record.unwrap();
        assert_eq!(Some(&Value::from("scan")), record.get("name"));
        digests.push(record.key.unwrap().digest());
    }
    digests
}

fn expected_digests() -> HashSet<[u8; 20]> {
    (0..RECORDS)
        .map(|i| Key::new(NAMESPACE, SET, i).digest())
        .collect()
}

#[tokio::test]
async fn scan_all() {
    let (client, cluster) = common::fake_client(3).await;
    create_records(&client).await;

    let recordset = client
        .scan(
            &ScanPolicy::default(),
            PartitionFilter::all(),
            NAMESPACE,
            SET,
            Bins::All,
        )
        .unwrap();
    let digests = collect(&recordset).await;

    assert_eq!(RECORDS as usize, digests.len());
    assert_eq!(expected_digests(), digests.into_iter().collect());
    assert_eq!(3, cluster.stream_requests());

    let filter = recordset.partition_filter().await.unwrap();
    assert!(filter.is_done());
    assert!(!recordset.is_active());

    client.close().await;
}

#[tokio::test]
async fn scan_pages() {
    let (client, _cluster) = common::fake_client(3).await;
    create_records(&client).await;

    let policy = ScanPolicy::default().with_max_records(30);
    let mut filter = PartitionFilter::all();
    let mut seen = HashSet::new();
    let mut pages = 0;

    while !filter.is_done() {
        pages += 1;
        assert!(pages < 50, "scan never finished");

        let recordset = client
            .scan(&policy, filter.clone(), NAMESPACE, SET, Bins::All)
            .unwrap();
        let digests = collect(&recordset).await;
        assert!(digests.len() <= 30, "page exceeded the record limit");

        for digest in digests {
            assert!(seen.insert(digest), "record returned twice");
        }
        filter = recordset.partition_filter().await.unwrap();
    }

    assert!(pages > 1);
    assert_eq!(expected_digests(), seen);

    client.close().await;
}

#[tokio::test]
async fn pages_smaller_than_node_count() {
    let (client, _cluster) = common::fake_client(3).await;
    create_records(&client).await;

    let policy = ScanPolicy::default().with_max_records(2);
    let mut filter = PartitionFilter::all();
    let mut seen = HashSet::new();
    let mut pages = 0;

    while !filter.is_done() {
        pages += 1;
        assert!(pages <= 2 * RECORDS as usize, "scan never finished");

        let recordset = client
            .scan(&policy, filter.clone(), NAMESPACE, SET, Bins::All)
            .unwrap();
        let digests = collect(&recordset).await;
        assert!(
            digests.len() <= 2,
            "page of {} records exceeded the limit",
            digests.len()
        );

        seen.extend(digests);
        filter = recordset.partition_filter().await.unwrap();
    }

    assert_eq!(expected_digests(), seen);

    client.close().await;
}

#[tokio::test]
async fn retries_unavailable_partitions() {
    let (client, cluster) = common::fake_client(2).await;
    create_records(&client).await;

    let key = Key::new(NAMESPACE, SET, 42);
    cluster.fail_partition_once(key.partition_id() as u16);

    let recordset = client
        .scan(
            &ScanPolicy::default(),
            PartitionFilter::all(),
            NAMESPACE,
            SET,
            Bins::All,
        )
        .unwrap();
    let digests = collect(&recordset).await;

    assert_eq!(RECORDS as usize, digests.len());
    assert_eq!(expected_digests(), digests.into_iter().collect());
    assert_eq!(3, cluster.stream_requests());
    assert!(recordset.partition_filter().await.unwrap().is_done());

    client.close().await;
}

#[tokio::test]
async fn scan_partition_range() {
    let (client, _cluster) = common::fake_client(3).await;
    create_records(&client).await;

    let key = Key::new(NAMESPACE, SET, 7);
    let id = key.partition_id() as u16;
    let recordset = client
        .scan(
            &ScanPolicy::default(),
            PartitionFilter::by_id(id),
            NAMESPACE,
            SET,
            Bins::All,
        )
        .unwrap();
    let digests = collect(&recordset).await;

    let expected = (0..RECORDS)
        .map(|i| Key::new(NAMESPACE, SET, i))
        .filter(|key| key.partition_id() as u16 == id)
        .map(|key| key.digest())
        .collect::<HashSet<_>>();
    assert!(expected.contains(&key.digest()));
    assert_eq!(expected, digests.into_iter().collect());

    client.close().await;
}

#[tokio::test]
async fn scan_header_only() {
    let (client, _cluster) = common::fake_client(1).await;
    create_records(&client).await;

    let recordset = client
        .scan(
            &ScanPolicy::default(),
            PartitionFilter::all(),
            NAMESPACE,
            SET,
            Bins::None,
        )
        .unwrap();

    let mut count = 0;
    while let Some(record) = recordset.next().await {
        let record = record.unwrap();
        assert!(record.bins.is_empty());
        assert_eq!(1, record.generation);
        count += 1;
    }
    assert_eq!(RECORDS, count);

    client.close().await;
}

#[tokio::test]
async fn close_recordset_early() {
    let (client, _cluster) = common::fake_client(3).await;
    create_records(&client).await;

    let policy = ScanPolicy {
        record_queue_size: 4,
        ..ScanPolicy::default()
    };
    let recordset = client
        .scan(&policy, PartitionFilter::all(), NAMESPACE, SET, Bins::All)
        .unwrap();

    for _ in 0..3 {
        assert!(recordset.next().await.unwrap().is_ok());
    }
    recordset.close();
    assert!(!recordset.is_active());
    assert!(recordset.next().await.is_none());

    client.close().await;
}

#[tokio::test]
async fn scan_after_close_fails() {
    let (client, _cluster) = common::fake_client(1).await;
    client.close().await;

    let result = client.scan(
        &ScanPolicy::default(),
        PartitionFilter::all(),
        NAMESPACE,
        SET,
        Bins::All,
    );
    assert!(result.is_err());
}
