use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshnet::config::AuthConfig;
use meshnet::{Node, NodeConfig};

fn localhost(port: u16) -> (String, u16) {
    ("127.0.0.1".to_owned(), port)
}

async fn spawn_standalone() -> Arc<Node> {
    let node = Node::new(NodeConfig::standalone(localhost(0)));
    let running = node.clone();
    tokio::spawn(async move { running.run().await.unwrap() });
    node.local_addr().await;
    node
}

async fn spawn_joining(entry: (String, u16)) -> Arc<Node> {
    let node = Node::new(NodeConfig::joining(localhost(0), entry));
    let running = node.clone();
    tokio::spawn(async move { running.run().await.unwrap() });
    node.local_addr().await;
    node
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn two_node_join_and_echo() {
    let a = spawn_standalone().await;
    let addr = a.local_addr().await;
    let b = spawn_joining(("127.0.0.1".to_owned(), addr.port())).await;
    settle().await;

    assert_ne!(a.id(), b.id());

    let a_peers: Vec<_> = a.peers().into_iter().map(|p| p.id).collect();
    assert_eq!(a_peers, vec![b.id()]);

    let b_peers: Vec<_> = b.peers().into_iter().map(|p| p.id).collect();
    assert_eq!(b_peers, vec![a.id()]);
}

#[tokio::test]
async fn three_node_announce_propagation() {
    let a = spawn_standalone().await;
    let a_addr = a.local_addr().await;
    let entry = ("127.0.0.1".to_owned(), a_addr.port());

    let b = spawn_joining(entry.clone()).await;
    settle().await;
    let c = spawn_joining(entry).await;
    settle().await;

    let mut a_peers: Vec<_> = a.peers().into_iter().map(|p| p.id).collect();
    a_peers.sort();
    let mut expected = vec![b.id(), c.id()];
    expected.sort();
    assert_eq!(a_peers, expected);

    let mut b_peers: Vec<_> = b.peers().into_iter().map(|p| p.id).collect();
    b_peers.sort();
    let mut expected_b = vec![a.id(), c.id()];
    expected_b.sort();
    assert_eq!(b_peers, expected_b);

    let mut c_peers: Vec<_> = c.peers().into_iter().map(|p| p.id).collect();
    c_peers.sort();
    let mut expected_c = vec![a.id(), b.id()];
    expected_c.sort();
    assert_eq!(c_peers, expected_c);
}

#[tokio::test]
async fn broadcast_loopback_delivers_exactly_once() {
    let a = spawn_standalone().await;

    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    {
        let count = count.clone();
        let seen = seen.clone();
        let my_id = a.id();
        a.on("ping", move |origin, payload| {
            let count = count.clone();
            let seen = seen.clone();
            async move {
                assert_eq!(origin, my_id);
                count.fetch_add(1, Ordering::SeqCst);
                seen.lock().await.push(payload);
            }
        });
    }

    a.emit("ping", b"x").await.unwrap();
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().await.as_slice(), &[b"x".to_vec()]);
}

#[tokio::test]
async fn unicast_round_trip() {
    let a = spawn_standalone().await;
    let addr = a.local_addr().await;
    let b = spawn_joining(("127.0.0.1".to_owned(), addr.port())).await;
    settle().await;

    let pong_count = Arc::new(AtomicUsize::new(0));
    let pong_payload = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    {
        let count = pong_count.clone();
        let payload_store = pong_payload.clone();
        a.on("pong", move |_origin, payload| {
            let count = count.clone();
            let payload_store = payload_store.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                *payload_store.lock().await = payload;
            }
        });
    }

    let b_for_handler = b.clone();
    b.on("ping", move |origin, payload| {
        let b_for_handler = b_for_handler.clone();
        async move {
            let _ = b_for_handler.send(origin, "pong", &payload).await;
        }
    });

    a.send(b.id(), "ping", b"hello").await.unwrap();
    settle().await;

    assert_eq!(pong_count.load(Ordering::SeqCst), 1);
    assert_eq!(*pong_payload.lock().await, b"hello");
}

#[tokio::test]
async fn auth_rejection_keeps_entry_table_unchanged() {
    let mut rng = rand::rngs::OsRng;
    let priv_a = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let pub_a = rsa::RsaPublicKey::from(&priv_a);
    let priv_b = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let pub_b = rsa::RsaPublicKey::from(&priv_b);

    let mut config_a = NodeConfig::standalone(localhost(0));
    config_a.auth_method = AuthConfig::AsymmetricKey {
        public_key: pub_a,
        private_key: priv_a,
    };
    let a = Node::new(config_a);
    let running = a.clone();
    tokio::spawn(async move { running.run().await.unwrap() });
    a.local_addr().await;
    let addr = a.local_addr().await;

    let mut config_b = NodeConfig::joining(localhost(0), ("127.0.0.1".to_owned(), addr.port()));
    config_b.auth_method = AuthConfig::AsymmetricKey {
        public_key: pub_b,
        private_key: priv_b,
    };
    let b = Node::new(config_b);
    let running_b = b.clone();
    tokio::spawn(async move { running_b.run().await.unwrap() });
    b.local_addr().await;
    settle().await;

    // b could not authenticate against a's key, so it fell back to
    // standalone: a never learned about it.
    assert!(a.peers().is_empty());
    assert!(b.peers().is_empty());
}

#[tokio::test]
async fn peer_death_is_evicted_lazily() {
    let a = spawn_standalone().await;
    let addr = a.local_addr().await;

    // Run b on its own runtime, so "killing" it can tear down every
    // task it spawned (the accept loop and each per-connection
    // handler), closing every socket it owns - the same observable
    // effect as the peer's process actually exiting.
    let b_rt = tokio::runtime::Runtime::new().unwrap();
    let b_node = Node::new(NodeConfig::joining(
        localhost(0),
        ("127.0.0.1".to_owned(), addr.port()),
    ));
    b_rt.spawn({
        let b_node = b_node.clone();
        async move { let _ = b_node.run().await; }
    });
    b_node.local_addr().await;
    settle().await;

    assert_eq!(a.peers().len(), 1);

    b_rt.shutdown_background();
    settle().await;

    a.emit("anything", b"x").await.unwrap();
    settle().await;

    assert!(a.peers().is_empty());
}
