use std::{sync::Arc, time::Duration};

use windpike::{
    errors::Error,
    exp,
    operations::scalar,
    policies::{BasePolicy, ClientPolicy, GenerationPolicy, RecordExistsAction, WritePolicy},
    Bin, Bins, Key, ResultCode, Value,
};

use crate::{
    common,
    fake::{FakeCluster, NAMESPACE},
};

#[tokio::test]
async fn put_get_generation() {
    let (client, _cluster) = common::fake_client(3).await;
    let policy = BasePolicy::default();
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, "kv", "gen");

    client
        .put(&wpolicy, &key, &[Bin::new("a", 1), Bin::new("b", "two")])
        .await
        .unwrap();
    let record = client.get(&policy, &key, Bins::All).await.unwrap().unwrap();
    assert_eq!(1, record.generation);
    assert_eq!(Some(&Value::from(1)), record.get("a"));
    assert_eq!(Some(&Value::from("two")), record.get("b"));

    client.put(&wpolicy, &key, &[Bin::new("a", 5)]).await.unwrap();
    let record = client.get(&policy, &key, ["a"]).await.unwrap().unwrap();
    assert_eq!(2, record.generation);
    assert_eq!(1, record.bins.len());
    assert_eq!(Some(&Value::from(5)), record.get("a"));

    let header = client.get_header(&policy, &key).await.unwrap().unwrap();
    assert_eq!(2, header.generation);
    assert!(header.bins.is_empty());

    client.touch(&wpolicy, &key).await.unwrap();
    let header = client.get_header(&policy, &key).await.unwrap().unwrap();
    assert_eq!(3, header.generation);

    client.close().await;
}

#[tokio::test]
async fn missing_records() {
    let (client, _cluster) = common::fake_client(2).await;
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, "kv", "missing");

    assert!(client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .is_none());
    assert!(!client.exists(&BasePolicy::default(), &key).await.unwrap());
    assert!(!client.delete(&wpolicy, &key).await.unwrap());

    let err = client.touch(&wpolicy, &key).await.unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::KeyNotFoundError)));

    client.put(&wpolicy, &key, &[Bin::new("a", 1)]).await.unwrap();
    assert!(client.exists(&BasePolicy::default(), &key).await.unwrap());
    assert!(client.delete(&wpolicy, &key).await.unwrap());
    assert!(!client.exists(&BasePolicy::default(), &key).await.unwrap());

    client.close().await;
}

#[tokio::test]
async fn add_append_prepend() {
    let (client, _cluster) = common::fake_client(1).await;
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, "kv", 7);

    client
        .put(&wpolicy, &key, &[Bin::new("count", 10), Bin::new("text", "mid")])
        .await
        .unwrap();
    client
        .add(&wpolicy, &key, &[Bin::new("count", 5)])
        .await
        .unwrap();
    client
        .append(&wpolicy, &key, &[Bin::new("text", "-end")])
        .await
        .unwrap();
    client
        .prepend(&wpolicy, &key, &[Bin::new("text", "start-")])
        .await
        .unwrap();

    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(&Value::from(15)), record.get("count"));
    assert_eq!(Some(&Value::from("start-mid-end")), record.get("text"));
    assert_eq!(4, record.generation);

    let err = client
        .add(&wpolicy, &key, &[Bin::new("text", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::BinTypeError)));

    client.close().await;
}

#[tokio::test]
async fn operate() {
    let (client, _cluster) = common::fake_client(3).await;
    let wpolicy = WritePolicy::default();
    let key = Key::new(NAMESPACE, "kv", "operate");

    client
        .put(&wpolicy, &key, &[Bin::new("a", 1)])
        .await
        .unwrap();

    let bin = Bin::new("a", 41);
    let record = client
        .operate(&wpolicy, &key, &[scalar::add(&bin), scalar::get_bin("a")])
        .await
        .unwrap();
    assert_eq!(Some(&Value::from(42)), record.get("a"));
    assert_eq!(2, record.generation);

    client.close().await;
}

#[tokio::test]
async fn expected_generation() {
    let (client, _cluster) = common::fake_client(2).await;
    let key = Key::new(NAMESPACE, "kv", "cas");

    client
        .put(&WritePolicy::default(), &key, &[Bin::new("v", 1)])
        .await
        .unwrap();
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("v", 2)])
        .await
        .unwrap();

    let stale = WritePolicy::default().with_generation(GenerationPolicy::ExpectGenEqual, 1);
    let err = client
        .put(&stale, &key, &[Bin::new("v", 3)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::GenerationError)));

    let current = WritePolicy::default().with_generation(GenerationPolicy::ExpectGenEqual, 2);
    client
        .put(&current, &key, &[Bin::new("v", 3)])
        .await
        .unwrap();

    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(3, record.generation);
    assert_eq!(Some(&Value::from(3)), record.get("v"));

    client.close().await;
}

#[tokio::test]
async fn record_exists_actions() {
    let (client, _cluster) = common::fake_client(2).await;
    let key = Key::new(NAMESPACE, "kv", "exists");
    let policy = |action| WritePolicy::default().with_record_exists_action(action);

    let err = client
        .put(&policy(RecordExistsAction::UpdateOnly), &key, &[Bin::new("a", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::KeyNotFoundError)));
    let err = client
        .put(&policy(RecordExistsAction::ReplaceOnly), &key, &[Bin::new("a", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::KeyNotFoundError)));

    client
        .put(
            &policy(RecordExistsAction::CreateOnly),
            &key,
            &[Bin::new("a", 1), Bin::new("b", 2)],
        )
        .await
        .unwrap();
    let err = client
        .put(&policy(RecordExistsAction::CreateOnly), &key, &[Bin::new("a", 9)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(ResultCode::KeyExistsError)));

    client
        .put(&policy(RecordExistsAction::UpdateOnly), &key, &[Bin::new("a", 3)])
        .await
        .unwrap();
    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(&Value::from(3)), record.get("a"));
    assert_eq!(Some(&Value::from(2)), record.get("b"));

    client
        .put(&policy(RecordExistsAction::ReplaceOnly), &key, &[Bin::new("c", 4)])
        .await
        .unwrap();
    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(1, record.bins.len());
    assert_eq!(Some(&Value::from(4)), record.get("c"));
    assert_eq!(3, record.generation);

    client.close().await;
}

#[tokio::test]
async fn filtered_reads_and_writes() {
    let (client, _cluster) = common::fake_client(1).await;
    let key = Key::new(NAMESPACE, "kv", "filtered");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("a", 5)])
        .await
        .unwrap();

    let miss = BasePolicy::default()
        .with_filter_expression(exp::gt(exp::int_bin("a"), exp::int_val(5)));
    let err = client.get(&miss, &key, Bins::All).await.unwrap_err();
    assert!(matches!(err, Error::FilteredOut));

    let hit = BasePolicy::default()
        .with_filter_expression(exp::eq(exp::int_bin("a"), exp::int_val(5)));
    let record = client.get(&hit, &key, Bins::All).await.unwrap().unwrap();
    assert_eq!(Some(&Value::from(5)), record.get("a"));

    let wpolicy = WritePolicy::default()
        .with_filter_expression(exp::lt(exp::int_bin("a"), exp::int_val(0)));
    let err = client
        .put(&wpolicy, &key, &[Bin::new("a", 6)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FilteredOut));
    let record = client
        .get(&BasePolicy::default(), &key, Bins::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(1, record.generation);

    client.close().await;
}

#[tokio::test]
async fn follows_moved_partition() {
    let cluster = FakeCluster::new(3);
    let policy = ClientPolicy {
        tend_interval: Duration::from_secs(3600),
        ..common::fake_policy()
    };
    let client = common::fake_client_with(&policy, &cluster, Arc::clone(&cluster) as _).await;

    let key = Key::new(NAMESPACE, "kv", "moving");
    client
        .put(&WritePolicy::default(), &key, &[Bin::new("a", 1)])
        .await
        .unwrap();

    let id = key.partition_id() as u16;
    let new_owner = (cluster.owner(id) + 1) % 3;
    cluster.move_partition(id, new_owner);

    // The first attempt hits the old master, which makes the client refresh its partition map
    // without waiting for the next tend interval.
    let rpolicy = BasePolicy::default()
        .with_max_retries(5)
        .with_sleep_between_retries(Duration::from_millis(20));
    let record = client.get(&rpolicy, &key, Bins::All).await.unwrap().unwrap();
    assert_eq!(Some(&Value::from(1)), record.get("a"));

    // Without retries, so the request must go to the new master right away.
    let record = client
        .get(&BasePolicy::default().with_max_retries(0), &key, Bins::All)
        .await
        .unwrap();
    assert!(record.is_some());

    client.close().await;
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn live_round_trip() {
    common::init_logger();

    let client = common::client().await;
    let policy = BasePolicy::default();
    let wpolicy = WritePolicy::default();
    let key = Key::new(common::namespace().to_owned(), common::rand_str(10), -1);

    client.delete(&wpolicy, &key).await.unwrap();

    let bins = [
        Bin::new("bin999", "test string"),
        Bin::new("bin vec![u8]", Value::from(vec![1u8, 2u8, 3u8])),
        Bin::new("bin f64", 1.64f64),
        Bin::new("bin-name-len-15", "max. bin name length is 15 chars"),
    ];
    client.put(&wpolicy, &key, &bins).await.unwrap();

    let record = client.get(&policy, &key, Bins::All).await.unwrap().unwrap();
    assert_eq!(4, record.bins.len());
    assert_eq!(Some(&Value::from("test string")), record.get("bin999"));
    assert_eq!(Some(&Value::from(1.64f64)), record.get("bin f64"));

    client.touch(&wpolicy, &key).await.unwrap();

    let record = client
        .get(&policy, &key, ["bin999", "bin f64"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(2, record.bins.len());

    assert!(client.exists(&policy, &key).await.unwrap());
    assert!(client.delete(&wpolicy, &key).await.unwrap());
    assert!(!client.exists(&policy, &key).await.unwrap());

    client.close().await;
}
