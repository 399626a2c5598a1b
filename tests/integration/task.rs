use std::time::Duration;

use windpike::{
    errors::Error,
    policies::{AdminPolicy, WritePolicy},
    query::{IndexType, Statement},
    task::{Status, Task},
    udf::UdfLanguage,
    Bin, Bins, Key,
};

use crate::{common, fake::NAMESPACE};

const UDF_BODY: &str = r#"
function echo(rec, val)
  return val
end
"#;

#[tokio::test]
async fn register_and_drop_udf() {
    let (client, cluster) = common::fake_client(3).await;
    let policy = AdminPolicy::default();

    let task = client
        .register_udf(&policy, UDF_BODY.as_bytes(), "echo.lua", UdfLanguage::Lua)
        .await
        .unwrap();
    let status = task
        .wait_till_complete(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(Status::Complete, status);

    let udfs = client.list_udf(&policy).await.unwrap();
    assert_eq!(1, udfs.len());
    assert_eq!("echo.lua", udfs[0].name);
    assert_eq!(UdfLanguage::Lua, udfs[0].language);

    let put = cluster
        .commands()
        .into_iter()
        .find(|cmd| cmd.starts_with("udf-put:"))
        .unwrap();
    assert!(put.contains("filename=echo.lua;"));
    assert!(put.contains("udf-type=LUA;"));

    client.drop_udf(&policy, "echo.lua").await.unwrap();
    assert!(client.list_udf(&policy).await.unwrap().is_empty());
    // Removing it again isn't an error.
    client.drop_udf(&policy, "echo.lua").await.unwrap();

    client.close().await;
}

#[tokio::test]
async fn create_and_drop_index() {
    let (client, cluster) = common::fake_client(2).await;
    let policy = AdminPolicy::default();

    let task = client
        .create_index(&policy, NAMESPACE, "people", "age", "idx_age", IndexType::Numeric)
        .await
        .unwrap();
    assert_eq!(Status::Complete, task.query_status().await.unwrap());

    client
        .drop_index(&policy, NAMESPACE, "people", "idx_age")
        .await
        .unwrap();

    let commands = cluster.commands();
    let create = "sindex-create:ns=test;set=people;indexname=idx_age;numbins=1;\
                  indexdata=age,NUMERIC;priority=normal";
    assert!(commands.iter().any(|cmd| cmd == create));
    assert!(commands
        .iter()
        .any(|cmd| cmd == "sindex-delete:ns=test;set=people;indexname=idx_age"));

    client.close().await;
}

#[tokio::test]
async fn truncate_set() {
    let (client, cluster) = common::fake_client(3).await;
    let wpolicy = WritePolicy::default();

    for i in 0..10 {
        client
            .put(&wpolicy, &Key::new(NAMESPACE, "gone", i), &[Bin::new("i", i)])
            .await
            .unwrap();
    }
    client
        .put(&wpolicy, &Key::new(NAMESPACE, "kept", 0), &[Bin::new("i", 0)])
        .await
        .unwrap();
    assert_eq!(11, cluster.record_count());

    client
        .truncate(&AdminPolicy::default(), NAMESPACE, "gone", 0)
        .await
        .unwrap();
    assert_eq!(1, cluster.record_count());
    assert!(cluster
        .commands()
        .contains(&"truncate:namespace=test;set=gone".to_owned()));

    client.close().await;
}

#[tokio::test]
async fn background_udf() {
    let (client, _cluster) = common::fake_client(3).await;

    let statement = Statement::new(NAMESPACE, "people", Bins::All);
    let task = client
        .query_execute_udf(&WritePolicy::default(), &statement, "echo", "echo", &[])
        .await
        .unwrap();
    assert_eq!(Status::Complete, task.query_status().await.unwrap());

    client.close().await;
}

#[tokio::test]
async fn info_errors() {
    let (client, _cluster) = common::fake_client(1).await;

    let response = client
        .info(&AdminPolicy::default(), &["node", "cluster-name"])
        .await
        .unwrap();
    assert_eq!(Some("fake"), response.get("cluster-name").map(String::as_str));

    client.close().await;
    let err = client
        .truncate(&AdminPolicy::default(), NAMESPACE, "gone", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoNodes));
}
