//! Integration tests for replistore
//!
//! A real controller and real storage nodes on loopback ports, driven
//! through the blocking client.

use std::fs;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use replistore::network::ShutdownHandle;
use replistore::{
    Client, ControllerConfig, ControllerServer, DstoreConfig, DstoreServer, ProtocolEngine,
    StoreError,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const CONTROLLER_TIMEOUT_MS: u64 = 500;
const CLIENT_TIMEOUT: Duration = Duration::from_millis(2000);

struct TestNode {
    port: u16,
    dir: TempDir,
    shutdown: ShutdownHandle,
}

impl TestNode {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

struct TestCluster {
    addr: SocketAddr,
    engine: Arc<ProtocolEngine>,
    shutdown: ShutdownHandle,
    nodes: Vec<TestNode>,
}

impl TestCluster {
    fn start(r: usize, node_count: usize) -> Self {
        let config = ControllerConfig::builder()
            .listen_addr("127.0.0.1:0")
            .replication_factor(r)
            .timeout_ms(CONTROLLER_TIMEOUT_MS)
            .operation_workers(4)
            .build();
        let server = ControllerServer::bind(config).unwrap();
        let addr = server.local_addr();
        let engine = server.engine();
        let shutdown = server.shutdown_handle();
        server.spawn().unwrap();

        let mut cluster = Self {
            addr,
            engine,
            shutdown,
            nodes: Vec::new(),
        };
        for _ in 0..node_count {
            cluster.add_node();
        }
        cluster.wait_for_nodes(node_count);
        cluster
    }

    fn add_node(&mut self) {
        let dir = TempDir::new().unwrap();
        let config = DstoreConfig::builder()
            .listen_addr("127.0.0.1:0")
            .controller_addr(self.addr.to_string())
            .timeout_ms(CLIENT_TIMEOUT.as_millis() as u64)
            .storage_dir(dir.path())
            .build();
        let server = DstoreServer::bind(config).unwrap();
        let port = server.local_addr().port();
        let shutdown = server.shutdown_handle();
        server.spawn().unwrap();

        self.nodes.push(TestNode { port, dir, shutdown });
    }

    fn stop_node(&mut self, port: u16) {
        let index = self.nodes.iter().position(|n| n.port == port).unwrap();
        let node = self.nodes.remove(index);
        node.shutdown.shutdown();
    }

    fn node(&self, port: u16) -> &TestNode {
        self.nodes.iter().find(|n| n.port == port).unwrap()
    }

    fn wait_for_nodes(&self, count: usize) {
        let engine = Arc::clone(&self.engine);
        wait_until(move || engine.state().membership.live_count() == count);
    }

    fn client(&self) -> Client {
        Client::connect(self.addr, CLIENT_TIMEOUT).unwrap()
    }

    fn replica_ports(&self, name: &str) -> Vec<u16> {
        self.engine
            .state()
            .catalog
            .get(name)
            .unwrap()
            .replicas
            .iter()
            .map(|n| n.port())
            .collect()
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.shutdown.shutdown();
        }
        self.shutdown.shutdown();
    }
}

fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(10));
    }
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[test]
fn test_store_list_load_remove() {
    let cluster = TestCluster::start(3, 3);
    let mut client = cluster.client();

    client.store("notes.txt", b"replicated bytes").unwrap();

    // Every node persisted before STORE_COMPLETE
    for node in &cluster.nodes {
        assert_eq!(fs::read(node.path("notes.txt")).unwrap(), b"replicated bytes");
    }
    assert_eq!(client.list().unwrap(), vec!["notes.txt"]);
    assert_eq!(&client.load("notes.txt").unwrap()[..], b"replicated bytes");

    client.remove("notes.txt").unwrap();
    for node in &cluster.nodes {
        assert!(!node.path("notes.txt").exists());
    }
    assert!(client.list().unwrap().is_empty());
    assert!(matches!(
        client.load("notes.txt"),
        Err(StoreError::FileNotFound(_))
    ));
}

#[test]
fn test_large_file() {
    let cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();
    let data: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

    client.store("blob.bin", &data).unwrap();

    assert_eq!(client.load("blob.bin").unwrap().to_vec(), data);
}

#[test]
fn test_load_streams_into_file() {
    let cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();
    let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 253) as u8).collect();
    client.store("streamed.bin", &data).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("copy.bin");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(b"header").unwrap();

    assert_eq!(client.load_to("streamed.bin", &mut file).unwrap(), data.len() as u64);
    drop(file);

    let written = fs::read(&path).unwrap();
    assert_eq!(&written[..6], b"header");
    assert_eq!(&written[6..], &data[..]);
}

#[test]
fn test_store_again_after_remove() {
    let cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();

    client.store("cycle", b"one").unwrap();
    client.remove("cycle").unwrap();
    client.store("cycle", b"two!").unwrap();

    assert_eq!(&client.load("cycle").unwrap()[..], b"two!");
}

#[test]
fn test_concurrent_clients() {
    let cluster = TestCluster::start(2, 3);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let addr = cluster.addr;
            thread::spawn(move || {
                let mut client = Client::connect(addr, CLIENT_TIMEOUT).unwrap();
                let name = format!("file-{}", i);
                client.store(&name, name.as_bytes()).unwrap();
                assert_eq!(&client.load(&name).unwrap()[..], name.as_bytes());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = cluster.client();
    assert_eq!(client.list().unwrap().len(), 4);
}

// =============================================================================
// Precondition Tests
// =============================================================================

#[test]
fn test_not_enough_dstores() {
    let cluster = TestCluster::start(3, 2);
    let mut client = cluster.client();

    assert!(matches!(
        client.store("x", b"data"),
        Err(StoreError::NotEnoughReplicas)
    ));
    assert!(matches!(client.list(), Err(StoreError::NotEnoughReplicas)));
}

#[test]
fn test_store_existing_file() {
    let cluster = TestCluster::start(1, 1);
    let mut client = cluster.client();
    client.store("dup", b"first").unwrap();

    assert!(matches!(
        client.store("dup", b"second"),
        Err(StoreError::FileAlreadyExists(_))
    ));
    assert_eq!(&client.load("dup").unwrap()[..], b"first");
}

#[test]
fn test_remove_missing_file() {
    let cluster = TestCluster::start(1, 1);
    let mut client = cluster.client();

    assert!(matches!(
        client.remove("never-stored"),
        Err(StoreError::FileNotFound(_))
    ));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_load_fails_over_to_next_replica() {
    let cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();
    client.store("fragile", b"still here").unwrap();

    let replicas = cluster.replica_ports("fragile");
    fs::remove_file(cluster.node(replicas[0]).path("fragile")).unwrap();

    assert_eq!(&client.load("fragile").unwrap()[..], b"still here");

    fs::remove_file(cluster.node(replicas[1]).path("fragile")).unwrap();
    assert!(matches!(
        client.load("fragile"),
        Err(StoreError::LoadFailed(_))
    ));
}

#[test]
fn test_remove_succeeds_when_replica_already_gone() {
    let cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();
    client.store("half", b"bytes").unwrap();

    let replicas = cluster.replica_ports("half");
    fs::remove_file(cluster.node(replicas[0]).path("half")).unwrap();

    client.remove("half").unwrap();
    assert!(!cluster.node(replicas[1]).path("half").exists());
}

#[test]
fn test_node_departure_strikes_replicas() {
    let mut cluster = TestCluster::start(2, 3);
    let mut client = cluster.client();
    client.store("survivor", b"payload").unwrap();

    let replicas = cluster.replica_ports("survivor");
    cluster.stop_node(replicas[0]);
    cluster.wait_for_nodes(2);
    wait_until(|| cluster.replica_ports("survivor").len() == 1);

    assert_eq!(cluster.replica_ports("survivor"), vec![replicas[1]]);
    assert_eq!(&client.load("survivor").unwrap()[..], b"payload");

    // New files go to the two remaining nodes
    client.store("after", b"x").unwrap();
    let mut placed = cluster.replica_ports("after");
    placed.sort();
    let mut live: Vec<u16> = cluster.nodes.iter().map(|n| n.port).collect();
    live.sort();
    assert_eq!(placed, live);
}

#[test]
fn test_store_fails_when_replica_cannot_write() {
    let mut cluster = TestCluster::start(2, 2);
    let mut client = cluster.client();

    // Without its directory the node can never ACK, so the barrier times out
    let victim = cluster.nodes[0].port;
    let victim_dir = cluster.node(victim).dir.path().to_path_buf();
    fs::remove_dir_all(&victim_dir).unwrap();

    assert!(matches!(
        client.store("doomed", b"bytes"),
        Err(StoreError::StoreFailed(_))
    ));
    assert!(cluster.engine.state().catalog.get("doomed").is_none());

    // The other replica's copy is orphaned on disk; the catalog never lists it
    cluster.stop_node(victim);
    cluster.wait_for_nodes(1);
    assert!(client.list().is_err());
}

#[test]
fn test_client_that_never_reads_does_not_stall_controller() {
    let mut cluster = TestCluster::start(1, 1);
    let mut client = cluster.client();

    // Fat LIST replies so the flooder's socket buffers fill quickly
    for i in 0..20 {
        let name = format!("{:0>200}", i);
        client.store(&name, b"x").unwrap();
    }

    let mut flooder = TcpStream::connect(cluster.addr).unwrap();
    let requests = "LIST\n".repeat(10_000);
    flooder.write_all(requests.as_bytes()).unwrap();
    thread::sleep(Duration::from_millis(200));

    let mut other = Client::connect(cluster.addr, Duration::from_secs(5)).unwrap();
    assert_eq!(other.list().unwrap().len(), 20);

    // Node churn is still processed
    let port = cluster.nodes[0].port;
    cluster.stop_node(port);
    cluster.wait_for_nodes(0);

    drop(flooder);
}
