use windpike::{
    policies::{QueryPolicy, WritePolicy},
    query::{Filter, PartitionFilter, Statement},
    Bin, Bins, Client, Key, Value,
};

use crate::{common, fake::NAMESPACE};

const SET: &str = "query";

async fn create_people(client: &Client) {
    let wpolicy = WritePolicy::default();
    for i in 0..50 {
        let key = Key::new(NAMESPACE, SET, i);
        let name = format!("person-{i}");
        client
            .put(
                &wpolicy,
                &key,
                &[
                    Bin::new("age", i),
                    Bin::new("name", name.as_str()),
                    Bin::new("group", if i % 2 == 0 { "even" } else { "odd" }),
                ],
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn range_filter() {
    let (client, _cluster) = common::fake_client(3).await;
    create_people(&client).await;

    let statement =
        Statement::new(NAMESPACE, SET, Bins::All).with_filter(Filter::range("age", 10, 19));
    let recordset = client
        .query(&QueryPolicy::default(), PartitionFilter::all(), statement)
        .unwrap();

    let mut ages = Vec::new();
    while let Some(record) = recordset.next().await {
        let record = record.unwrap();
        assert_eq!(3, record.bins.len());
        match record.get("age") {
            Some(Value::Int(age)) => ages.push(*age),
            other => panic!("unexpected age bin {other:?}"),
        }
    }

    ages.sort_unstable();
    assert_eq!((10..=19).collect::<Vec<_>>(), ages);

    client.close().await;
}

#[tokio::test]
async fn equality_filter_with_bin_selection() {
    let (client, _cluster) = common::fake_client(2).await;
    create_people(&client).await;

    let statement = Statement::new(NAMESPACE, SET, Bins::from(["name"]))
        .with_filter(Filter::equal("group", "odd"));
    let recordset = client
        .query(&QueryPolicy::default(), PartitionFilter::all(), statement)
        .unwrap();

    let mut count = 0;
    while let Some(record) = recordset.next().await {
        let record = record.unwrap();
        assert_eq!(1, record.bins.len());
        assert!(matches!(record.get("name"), Some(Value::String(_))));
        count += 1;
    }
    assert_eq!(25, count);

    client.close().await;
}

#[tokio::test]
async fn query_without_filter_reads_set() {
    let (client, _cluster) = common::fake_client(3).await;
    create_people(&client).await;

    let statement = Statement::new(NAMESPACE, SET, Bins::All);
    let policy = QueryPolicy {
        max_concurrent_nodes: 1,
        ..QueryPolicy::default()
    };
    let recordset = client
        .query(&policy, PartitionFilter::all(), statement)
        .unwrap();

    let mut count = 0;
    while let Some(record) = recordset.next().await {
        record.unwrap();
        count += 1;
    }
    assert_eq!(50, count);

    client.close().await;
}
