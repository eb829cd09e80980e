use std::time::Duration;

mod common;
use common::test_cluster::TestCluster;
use common::test_statemachine::KvCommand;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replication_to_all_nodes() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let cluster = TestCluster::new(&["node1", "node2", "node3"]).await;
    cluster.start();

    let leader = cluster.wait_for_leader(Duration::from_secs(3)).await;

    for i in 1..=10 {
        let index = cluster
            .propose(
                &leader,
                KvCommand::Set {
                    key: format!("key{}", i),
                    value: format!("value{}", i),
                },
                Duration::from_secs(2),
            )
            .await
            .expect("propose should commit");
        println!("Committed key{} at log index {}", i, index);
    }

    for i in 1..=10 {
        cluster
            .wait_for_value(&format!("key{}", i), &format!("value{}", i), Duration::from_secs(3))
            .await
            .expect("all nodes should converge");
    }

    // 所有节点的应用历史一致（状态机安全性质）
    let histories: Vec<_> = cluster
        .nodes
        .values()
        .map(|node| node.state_machine.applied_history())
        .collect();
    for history in &histories {
        assert_eq!(history, &histories[0], "apply histories diverged");
    }

    cluster.assert_logs_match().await;
    cluster.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partitioned_minority_catches_up() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let cluster = TestCluster::new(&["node1", "node2", "node3"]).await;
    cluster.start();

    let leader = cluster.wait_for_leader(Duration::from_secs(3)).await;
    let lagging = cluster
        .nodes
        .keys()
        .find(|id| **id != leader)
        .cloned()
        .unwrap();

    // 隔离一个 follower，多数派继续提交
    cluster.hub.isolate(&lagging);
    println!("Isolated {}", lagging);

    for i in 1..=5 {
        cluster
            .propose(
                &leader,
                KvCommand::Set {
                    key: format!("key{}", i),
                    value: format!("value{}", i),
                },
                Duration::from_secs(2),
            )
            .await
            .expect("majority should still commit");
    }
    assert!(cluster.node(&lagging).state_machine.get("key5").is_none());

    // 恢复链路后落后节点补齐
    cluster.hub.heal(&lagging);
    println!("Healed {}", lagging);

    cluster
        .wait_for_value("key5", "value5", Duration::from_secs(3))
        .await
        .expect("lagging node should catch up");

    cluster.assert_logs_match().await;
    cluster.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_suffix_truncated_after_heal() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let cluster = TestCluster::new(&["node1", "node2", "node3"]).await;
    cluster.start();

    let old_leader = cluster.wait_for_leader(Duration::from_secs(3)).await;
    println!("Old leader: {}", old_leader);

    // 基线：一条已提交的日志
    cluster
        .propose(
            &old_leader,
            KvCommand::Set {
                key: "base".to_string(),
                value: "1".to_string(),
            },
            Duration::from_secs(2),
        )
        .await
        .expect("baseline propose should commit");
    cluster
        .wait_for_value("base", "1", Duration::from_secs(3))
        .await
        .unwrap();

    // 隔离旧 Leader 后向它提交：只能本地追加，永远无法提交
    cluster.hub.isolate(&old_leader);
    let stale_result = cluster
        .propose(
            &old_leader,
            KvCommand::Set {
                key: "stale".to_string(),
                value: "never".to_string(),
            },
            Duration::from_millis(800),
        )
        .await;
    assert!(stale_result.is_err(), "isolated leader must not commit");
    let stale_log_len = cluster.node(&old_leader).storage.log_snapshot().len();
    println!(
        "Old leader appended speculative entry (log len {})",
        stale_log_len
    );

    // 多数派选出新 Leader 并在同一索引位置提交不同的条目
    let new_leader = cluster
        .wait_for_other_leader(&old_leader, Duration::from_secs(3))
        .await;
    println!("New leader: {}", new_leader);
    cluster
        .propose(
            &new_leader,
            KvCommand::Set {
                key: "fresh".to_string(),
                value: "2".to_string(),
            },
            Duration::from_secs(2),
        )
        .await
        .expect("majority should commit");

    // 恢复链路：旧 Leader 的冲突后缀被截断，日志收敛
    cluster.hub.heal(&old_leader);
    cluster
        .wait_for_value("fresh", "2", Duration::from_secs(3))
        .await
        .expect("old leader should converge");

    // 被截断的投机写入不存在于任何状态机
    for (id, node) in &cluster.nodes {
        assert!(
            node.state_machine.get("stale").is_none(),
            "speculative write leaked into {}",
            id
        );
    }

    cluster.assert_logs_match().await;
    cluster.stop_all();
}
