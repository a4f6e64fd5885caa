#[cfg(feature = "e2e-tests")]
use cqlink_tokio::cluster::session::{SessionBuilder, TcpSessionBuilder};
#[cfg(feature = "e2e-tests")]
use cqlink_tokio::cluster::NodeTcpConfigBuilder;
#[cfg(feature = "e2e-tests")]
use cqlink_tokio::load_balancing::RoundRobinLoadBalancingStrategy;
#[cfg(feature = "e2e-tests")]
use cqlink_tokio::retry::NeverReconnectionPolicy;
#[cfg(feature = "e2e-tests")]
use std::sync::Arc;

#[tokio::test]
#[cfg(feature = "e2e-tests")]
async fn should_read_local_node_info() {
    let cluster_config = NodeTcpConfigBuilder::new()
        .with_contact_point("127.0.0.1:9042".into())
        .build()
        .await
        .unwrap();
    let session = TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), cluster_config)
        .with_reconnection_policy(Arc::new(NeverReconnectionPolicy))
        .build()
        .unwrap();

    let mut rows = session
        .query("SELECT release_version, host_id FROM system.local")
        .await
        .expect("Query error");

    assert!(rows.advance().unwrap());
    assert!(rows.get_string(0).unwrap().is_some());
    assert!(rows.get_uuid(rows.ordinal("host_id").unwrap()).unwrap().is_some());
    assert!(!rows.advance().unwrap());
}

#[tokio::test]
#[cfg(feature = "e2e-tests")]
async fn should_write_and_read_back() {
    let cluster_config = NodeTcpConfigBuilder::new()
        .with_contact_point("127.0.0.1:9042".into())
        .build()
        .await
        .unwrap();
    let session = TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), cluster_config)
        .build()
        .unwrap();

    session
        .query(
            "CREATE KEYSPACE IF NOT EXISTS cqlink_test WITH REPLICATION = { \
             'class' : 'SimpleStrategy', 'replication_factor' : 1 }",
        )
        .await
        .expect("Keyspace creation error");
    session
        .query("CREATE TABLE IF NOT EXISTS cqlink_test.kv (key int PRIMARY KEY, value text)")
        .await
        .expect("Table creation error");
    session
        .query("INSERT INTO cqlink_test.kv (key, value) VALUES (1, 'one')")
        .await
        .expect("Insert error");

    let mut rows = session
        .query("SELECT key, value FROM cqlink_test.kv WHERE key = 1")
        .await
        .expect("Select error");

    assert!(rows.advance().unwrap());
    assert_eq!(rows.get_i32(0).unwrap(), Some(1));
    assert_eq!(
        rows.get_string(rows.ordinal("value").unwrap()).unwrap(),
        Some("one".to_string())
    );
}
