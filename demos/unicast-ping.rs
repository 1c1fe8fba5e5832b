//! Two nodes, one unicast round trip: A pings B's id directly, B
//! answers with pong.

use std::time::Duration;

use meshnet::{Node, NodeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let a = Node::new(NodeConfig::standalone(("127.0.0.1".to_owned(), 10011)));
    let a_running = a.clone();
    tokio::spawn(async move { a_running.run().await.unwrap() });
    let a_addr = a.local_addr().await;

    let b = Node::new(NodeConfig::joining(
        ("127.0.0.1".to_owned(), 10012),
        ("127.0.0.1".to_owned(), a_addr.port()),
    ));
    let b_running = b.clone();
    tokio::spawn(async move { b_running.run().await.unwrap() });
    b.local_addr().await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let b_for_ping = b.clone();
    b.on("ping", move |origin, payload| {
        let b_for_ping = b_for_ping.clone();
        async move {
            println!("b received ping: {}", String::from_utf8_lossy(&payload));
            b_for_ping.send(origin, "pong", b"pong").await.unwrap();
        }
    });
    a.on("pong", |_origin, _payload| async move {
        println!("a received pong");
    });

    let b_id = b.id();
    a.send(b_id, "ping", b"ping").await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
}
