use std::time::Duration;

use bytes::Bytes;
use gravity_client::ClientConfig;
use gravity_node::LocalStore;
use gravity_sim::Cluster;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_writes_converge_on_every_node() {
    const KEYS: usize = 64;
    const NODES: usize = 3;

    let cluster = Cluster::start(NODES).expect("cluster starts");
    let client = cluster.client(ClientConfig::default());
    let mut rng = StdRng::seed_from_u64(0x5EED_CAFE);

    let mut expected = Vec::with_capacity(KEYS);
    let mut tasks = Vec::with_capacity(KEYS);
    for idx in 0..KEYS {
        let key = format!("key-{idx}");
        let mut value = vec![0_u8; rng.gen_range(1..=2048)];
        rng.fill_bytes(&mut value);
        expected.push((key.clone(), Bytes::from(value.clone())));

        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .set(&key, value, NODES, Duration::from_secs(2))
                .await
        }));
    }
    for task in tasks {
        let receipt = task
            .await
            .expect("task joins")
            .expect("every write reaches quorum");
        assert_eq!(receipt.acknowledged, NODES);
    }

    for (key, value) in &expected {
        for idx in 0..cluster.len() {
            let node = cluster.node(idx).expect("node exists");
            assert_eq!(node.store().get(key).as_ref(), Some(value));
        }
        let read = client
            .get(key, Some(Duration::from_secs(1)))
            .await
            .expect("get answers");
        assert_eq!(read.as_ref(), Some(value));
    }

    // Every node sees every write; reads past the first answer may still be queued.
    let stats = cluster.node(0).expect("node exists").stats();
    assert!(stats.received as usize >= KEYS);
    cluster.shutdown().await;
}
