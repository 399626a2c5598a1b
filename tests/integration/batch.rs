use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use windpike::{
    batch::{BatchOperation, BatchWrite},
    errors::{Error, NetError},
    exp,
    operations::scalar,
    policies::{BatchPolicy, BatchWritePolicy, GenerationPolicy, WritePolicy},
    Bin, Bins, FrameStream, Host, Key, ResultCode, Transport, Value,
};

use crate::{
    common,
    fake::{FakeCluster, NAMESPACE},
};

const SET: &str = "batch";

#[tokio::test]
async fn batch_get() {
    let (client, _cluster) = common::fake_client(3).await;
    let wpolicy = WritePolicy::default();

    for i in 0..20 {
        let key = Key::new(NAMESPACE, SET, i);
        client
            .put(&wpolicy, &key, &[Bin::new("a", i), Bin::new("b", "x")])
            .await
            .unwrap();
    }

    let keys = (0..25).map(|i| Key::new(NAMESPACE, SET, i)).collect::<Vec<_>>();
    let results = client
        .batch_get(&BatchPolicy::default(), keys.clone(), Bins::from(["a"]))
        .await
        .unwrap();

    assert_eq!(25, results.len());
    for (i, (result, key)) in results.iter().zip(&keys).enumerate() {
        assert_eq!(key, &result.key);
        if i < 20 {
            assert!(result.is_success());
            let record = result.record.as_ref().unwrap();
            assert_eq!(Some(&Value::from(i as i64)), record.get("a"));
            assert_eq!(None, record.get("b"));
        } else {
            assert_eq!(ResultCode::KeyNotFoundError, result.result_code);
            assert!(result.record.is_none());
        }
    }

    client.close().await;
}

#[tokio::test]
async fn mixed_operations() {
    let (client, cluster) = common::fake_client(2).await;
    let wpolicy = WritePolicy::default();

    let text = Key::new(NAMESPACE, SET, "text");
    let counter = Key::new(NAMESPACE, SET, "counter");
    let doomed = Key::new(NAMESPACE, SET, "doomed");
    client
        .put(&wpolicy, &text, &[Bin::new("v", "hello")])
        .await
        .unwrap();
    client
        .put(&wpolicy, &counter, &[Bin::new("v", 1)])
        .await
        .unwrap();
    client
        .put(&wpolicy, &doomed, &[Bin::new("v", 0)])
        .await
        .unwrap();
    assert_eq!(3, cluster.record_count());

    let increment = Bin::new("v", 1);
    let ops = vec![
        BatchOperation::read(text.clone(), Bins::All),
        BatchOperation::write(text.clone(), vec![scalar::add(&increment)]),
        BatchOperation::write(
            counter.clone(),
            vec![scalar::add(&increment), scalar::get_bin("v")],
        ),
        BatchOperation::delete(doomed.clone()),
        BatchOperation::read(Key::new(NAMESPACE, SET, "nope"), Bins::All),
    ];
    let results = client.batch(&BatchPolicy::default(), ops).await.unwrap();

    assert_eq!(5, results.len());
    assert!(results[0].is_success());
    assert_eq!(
        Some(&Value::from("hello")),
        results[0].record.as_ref().and_then(|r| r.get("v"))
    );

    assert_eq!(ResultCode::BinTypeError, results[1].result_code);
    assert!(!results[1].in_doubt);

    assert!(results[2].is_success());
    let record = results[2].record.as_ref().unwrap();
    assert_eq!(Some(&Value::from(2)), record.get("v"));
    assert_eq!(2, record.generation);

    assert!(results[3].is_success());
    assert_eq!(ResultCode::KeyNotFoundError, results[4].result_code);
    assert_eq!(2, cluster.record_count());

    client.close().await;
}

#[tokio::test]
async fn failure_without_partial_results() {
    let (client, _cluster) = common::fake_client(3).await;
    let key = Key::new(NAMESPACE, SET, "strict");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("v", "text")])
        .await
        .unwrap();

    let policy = BatchPolicy::default().with_allow_partial_results(false);
    let increment = Bin::new("v", 1);
    let err = client
        .batch(
            &policy,
            vec![
                BatchOperation::read(Key::new(NAMESPACE, SET, "absent"), Bins::All),
                BatchOperation::write(key, vec![scalar::add(&increment)]),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::BinTypeError)));

    client.close().await;
}

#[tokio::test]
async fn empty_batch() {
    let (client, cluster) = common::fake_client(1).await;
    let results = client
        .batch(&BatchPolicy::default(), Vec::new())
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(0, cluster.stream_requests());

    client.close().await;
}

/// Applies every request, but loses the response of the first `lost` streams.
#[derive(Debug)]
struct LostReplies {
    cluster: Arc<FakeCluster>,
    lost: AtomicUsize,
}

#[async_trait]
impl Transport for LostReplies {
    async fn send(
        &self,
        host: &Host,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Bytes, NetError> {
        self.cluster.send(host, request, timeout).await
    }

    async fn stream(
        &self,
        host: &Host,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn FrameStream>, NetError> {
        let stream = self.cluster.stream(host, request, timeout).await?;
        let lost = self
            .lost
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |lost| lost.checked_sub(1))
            .is_ok();
        if lost {
            stream.finish(false).await;
            return Err(NetError::Timeout);
        }
        Ok(stream)
    }
}

async fn lossy_client(lost: usize) -> (windpike::Client, Arc<FakeCluster>) {
    let cluster = FakeCluster::new(1);
    let transport = Arc::new(LostReplies {
        cluster: Arc::clone(&cluster),
        lost: AtomicUsize::new(lost),
    });
    let client = common::fake_client_with(&common::fake_policy(), &cluster, transport).await;
    (client, cluster)
}

async fn counter(client: &windpike::Client, key: &Key) -> Option<Value> {
    client
        .get(&Default::default(), key, Bins::All)
        .await
        .unwrap()
        .and_then(|mut record| record.bins.remove("c"))
}

#[tokio::test]
async fn writes_are_not_replayed() {
    let (client, _cluster) = lossy_client(1).await;
    let key = Key::new(NAMESPACE, SET, "once");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("c", 0)])
        .await
        .unwrap();

    let inc = Bin::new("c", 1);
    let policy = BatchPolicy::default()
        .with_max_retries(3)
        .with_sleep_between_retries(Duration::ZERO);
    let err = client
        .batch(&policy, vec![BatchOperation::write(key.clone(), vec![scalar::add(&inc)])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { attempts: 1 }), "{err:?}");
    assert_eq!(Some(Value::from(1)), counter(&client, &key).await);

    client.close().await;
}

#[tokio::test]
async fn write_retries_are_opt_in() {
    let (client, _cluster) = lossy_client(1).await;
    let key = Key::new(NAMESPACE, SET, "twice");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("c", 0)])
        .await
        .unwrap();

    let inc = Bin::new("c", 1);
    let policy = BatchPolicy::default()
        .with_max_write_retries(1)
        .with_sleep_between_retries(Duration::ZERO);
    let results = client
        .batch(&policy, vec![BatchOperation::write(key.clone(), vec![scalar::add(&inc)])])
        .await
        .unwrap();
    assert!(results[0].is_success());
    // The lost attempt was applied as well.
    assert_eq!(Some(Value::from(2)), counter(&client, &key).await);

    client.close().await;
}

#[tokio::test]
async fn reads_are_retried() {
    let (client, _cluster) = lossy_client(1).await;
    let key = Key::new(NAMESPACE, SET, "read");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("c", 7)])
        .await
        .unwrap();

    let policy = BatchPolicy::default().with_sleep_between_retries(Duration::ZERO);
    let results = client
        .batch(&policy, vec![BatchOperation::read(key, Bins::All)])
        .await
        .unwrap();
    assert_eq!(
        Some(&Value::from(7)),
        results[0].record.as_ref().and_then(|r| r.get("c"))
    );

    client.close().await;
}

fn filtered_write(key: Key, filter: exp::Expression, bin: &Bin<'_>) -> BatchOperation {
    BatchOperation::Write(BatchWrite {
        key,
        policy: BatchWritePolicy {
            filter_expression: Some(filter),
            ..BatchWritePolicy::default()
        },
        ops: vec![scalar::put(bin)],
    })
}

#[tokio::test]
async fn filtered_batch_writes() {
    let (client, _cluster) = common::fake_client(3).await;
    let wpolicy = WritePolicy::default();
    let matching = Key::new(NAMESPACE, SET, "small");
    let other = Key::new(NAMESPACE, SET, "large");
    client
        .put(&wpolicy, &matching, &[Bin::new("a", 1)])
        .await
        .unwrap();
    client
        .put(&wpolicy, &other, &[Bin::new("a", 100)])
        .await
        .unwrap();

    let bin = Bin::new("b", "added");
    let filter = || exp::lt(exp::int_bin("a"), exp::int_val(10));
    let results = client
        .batch(
            &BatchPolicy::default(),
            vec![
                filtered_write(matching.clone(), filter(), &bin),
                filtered_write(other.clone(), filter(), &bin),
            ],
        )
        .await
        .unwrap();

    assert_eq!(ResultCode::Ok, results[0].result_code);
    assert_eq!(ResultCode::FilteredOut, results[1].result_code);

    let batch = client
        .batch_get(&BatchPolicy::default(), vec![matching, other], Bins::All)
        .await
        .unwrap();
    let bins = batch
        .iter()
        .map(|result| result.record.as_ref().unwrap().bins.len())
        .collect::<Vec<_>>();
    assert_eq!(vec![2, 1], bins);

    client.close().await;
}

#[tokio::test]
async fn batch_write_generation() {
    let (client, _cluster) = common::fake_client(2).await;
    let key = Key::new(NAMESPACE, SET, "gen");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("a", 1)])
        .await
        .unwrap();

    let bin = Bin::new("a", 2);
    let write = |generation| {
        BatchOperation::Write(BatchWrite {
            key: key.clone(),
            policy: BatchWritePolicy {
                generation_policy: GenerationPolicy::ExpectGenEqual,
                generation,
                ..BatchWritePolicy::default()
            },
            ops: vec![scalar::put(&bin)],
        })
    };

    let results = client
        .batch(&BatchPolicy::default(), vec![write(5)])
        .await
        .unwrap();
    assert_eq!(ResultCode::GenerationError, results[0].result_code);

    let results = client
        .batch(&BatchPolicy::default(), vec![write(1)])
        .await
        .unwrap();
    assert!(results[0].is_success());
    assert_eq!(Some(Value::from(2)), {
        let record = client
            .get(&Default::default(), &key, ["a"])
            .await
            .unwrap()
            .unwrap();
        record.get("a").cloned()
    });

    client.close().await;
}
