//! Brings up a small standalone cluster on localhost: one entry node
//! and three joiners, then has every node broadcast a greeting.

use std::time::Duration;

use meshnet::{Node, NodeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let entry = Node::new(NodeConfig::standalone(("127.0.0.1".to_owned(), 10001)));
    let entry_running = entry.clone();
    tokio::spawn(async move { entry_running.run().await.unwrap() });
    let entry_addr = entry.local_addr().await;
    println!("entry node {} listening on {}", entry.id(), entry_addr);

    let mut joiners = Vec::new();
    for port in [10002u16, 10003, 10004] {
        let node = Node::new(NodeConfig::joining(
            ("127.0.0.1".to_owned(), port),
            ("127.0.0.1".to_owned(), entry_addr.port()),
        ));
        let running = node.clone();
        tokio::spawn(async move { running.run().await.unwrap() });
        node.local_addr().await;
        println!("joiner node {} listening on :{}", node.id(), port);
        joiners.push(node);
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    entry.on("greeting", |origin, payload| async move {
        println!("{} says: {}", origin, String::from_utf8_lossy(&payload));
    });
    for node in &joiners {
        node.on("greeting", |origin, payload| async move {
            println!("{} says: {}", origin, String::from_utf8_lossy(&payload));
        });
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    entry.emit("greeting", b"hello from the entry node").await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("entry peer table: {:?}", entry.peers());
}
