//! Arguments the client refuses must fail before anything reaches the cluster.

use std::time::Duration;

use windpike::{
    batch::BatchOperation,
    errors::{ErrorKind, Result},
    operations::{lists, scalar},
    policies::{BasePolicy, BatchPolicy, ScanPolicy, WritePolicy},
    query::PartitionFilter,
    Bin, Bins, Key, Value,
};

use crate::{common, fake::NAMESPACE};

const SET: &str = "validation";
/// One byte over the bin name limit.
const LONG_NAME: &str = "abcdefghijklmnop";

#[track_caller]
fn assert_rejected<T: std::fmt::Debug>(result: Result<T>) {
    let err = result.unwrap_err();
    assert_eq!(ErrorKind::ClientContract, err.kind(), "unexpected error: {err}");
}

#[tokio::test]
async fn rejects_bad_bins() {
    let (client, cluster) = common::fake_client(2).await;
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, SET, "bins");

    assert_rejected(client.put(&wpolicy, &key, &[Bin::new(LONG_NAME, 1)]).await);
    assert_rejected(client.put(&wpolicy, &key, &[Bin::new("a", Value::Infinity)]).await);
    assert_rejected(client.put(&wpolicy, &key, &[Bin::new("a", Value::Wildcard)]).await);
    assert_rejected(client.put(&wpolicy, &key, &[Bin::new("a", u64::MAX)]).await);
    assert_rejected(client.append(&wpolicy, &key, &[Bin::new("a", 1)]).await);
    assert_rejected(client.add(&wpolicy, &key, &[Bin::new("a", "one")]).await);
    assert_rejected(
        client
            .get(&BasePolicy::default(), &key, Bins::from([LONG_NAME]))
            .await,
    );

    assert_eq!(0, cluster.record_count());
    client.close().await;
}

#[tokio::test]
async fn uint_within_range_is_stored_as_int() {
    let (client, _cluster) = common::fake_client(1).await;
    let key = Key::new(NAMESPACE, SET, "uint");

    let largest = i64::MAX as u64;
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("u", largest)])
        .await
        .unwrap();
    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(&Value::Int(i64::MAX)), record.get("u"));

    client.close().await;
}

#[tokio::test]
async fn rejects_bad_operations() {
    let (client, cluster) = common::fake_client(2).await;
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, SET, "ops");
    client.put(&wpolicy, &key, &[Bin::new("c", 0)]).await.unwrap();

    let inc = Bin::new("c", 1);
    let infinity = Bin::new("c", Value::Infinity);
    assert_rejected(client.operate(&wpolicy, &key, &[]).await);
    assert_rejected(client.operate(&wpolicy, &key, &[lists::get_range("l", 0, -5)]).await);
    assert_rejected(client.operate(&wpolicy, &key, &[scalar::put(&infinity)]).await);
    assert_rejected(
        client
            .operate(&wpolicy, &key, &[scalar::add(&inc), scalar::get_bin(LONG_NAME)])
            .await,
    );

    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(1, record.generation);
    assert_eq!(Some(&Value::Int(0)), record.get("c"));
    assert_eq!(1, cluster.record_count());

    client.close().await;
}

#[tokio::test]
async fn rejects_bad_policies() {
    let (client, cluster) = common::fake_client(2).await;
    let key = Key::new(NAMESPACE, SET, "policy");

    let mut wpolicy = WritePolicy::default();
    wpolicy.base_policy.sleep_multiplier = 0.5;
    assert_rejected(client.put(&wpolicy, &key, &[Bin::new("a", 1)]).await);

    let policy = BasePolicy::default()
        .with_sleep_between_retries(Duration::from_millis(1))
        .with_sleep_multiplier(f64::NAN);
    assert_rejected(client.get(&policy, &key, Bins::All).await);

    let bpolicy = BatchPolicy::default().with_sleep_multiplier(0.0);
    assert_rejected(
        client
            .batch(&bpolicy, vec![BatchOperation::read(key, Bins::All)])
            .await,
    );

    assert_eq!(0, cluster.record_count());
    assert_eq!(0, cluster.stream_requests());
    client.close().await;
}

#[tokio::test]
async fn rejects_bad_batch_entries() {
    let (client, cluster) = common::fake_client(3).await;
    let inc = Bin::new("c", 1);
    let text = Bin::new("c", "x");

    let ops = vec![
        BatchOperation::write(Key::new(NAMESPACE, SET, 1), vec![scalar::add(&inc)]),
        BatchOperation::write(Key::new(NAMESPACE, SET, 2), vec![scalar::add(&text)]),
    ];
    assert_rejected(client.batch(&BatchPolicy::default(), ops).await);

    let ops = vec![BatchOperation::read(
        Key::new(NAMESPACE, SET, 3),
        Bins::from([LONG_NAME]),
    )];
    assert_rejected(client.batch(&BatchPolicy::default(), ops).await);

    assert_eq!(0, cluster.record_count());
    assert_eq!(0, cluster.stream_requests());
    client.close().await;
}

#[tokio::test]
async fn rejects_bad_scan_bins() {
    let (client, cluster) = common::fake_client(2).await;

    let bins = Bins::Some(vec![LONG_NAME.to_owned()]);
    assert_rejected(client.scan(
        &ScanPolicy::default(),
        PartitionFilter::all(),
        NAMESPACE,
        SET,
        bins,
    ));
    assert_rejected(client.scan(
        &ScanPolicy::default().with_sleep_multiplier(0.9),
        PartitionFilter::all(),
        NAMESPACE,
        SET,
        Bins::All,
    ));

    assert_eq!(0, cluster.stream_requests());
    client.close().await;
}
