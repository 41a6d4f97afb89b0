//! Full-stack integration tests: UDP/TCP listeners, orchestrator, resolver,
//! tiered cache, and in-memory store wired together.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use loam::handler::AuthorityHandler;
use loam_cache::{LocalCache, LocalCacheConfig, TieredStore};
use loam_model::DnsRecord;
use loam_proto::{Message, Name, Question, RData, Rcode, RecordType};
use loam_resolver::{Resolver, ResolverConfig, SelectorPolicy};
use loam_server::{ServerStats, TcpServer, UdpServer};
use loam_store::{MemoryStore, RecordStore};
use loam_wildcard::{PublicSuffixList, WildcardEngine, WildcardPattern};

// ============================================================================
// Test stack
// ============================================================================

struct TestStack {
    store: Arc<MemoryStore>,
    tiered: Arc<TieredStore>,
    engine: Arc<WildcardEngine>,
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestStack {
    /// Builds the full pipeline on ephemeral ports. A wide rotation bucket
    /// keeps selector output stable for the duration of a test.
    async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let l1 = Arc::new(LocalCache::new(&LocalCacheConfig::default()));
        let tiered = Arc::new(TieredStore::new(Some(l1), None, store.clone()));

        let engine = Arc::new(WildcardEngine::new(Arc::new(PublicSuffixList::builtin())));

        let resolver = Arc::new(Resolver::new(
            tiered.clone() as Arc<dyn RecordStore>,
            Some(engine.clone()),
            &ResolverConfig {
                policy: SelectorPolicy::RoundRobin,
                bucket_secs: 3600,
                ..ResolverConfig::default()
            },
        ));

        let handler = Arc::new(AuthorityHandler::new(
            resolver,
            Arc::new(ServerStats::new()),
            Duration::from_secs(5),
            100,
        ));

        let udp = UdpServer::bind("127.0.0.1:0".parse().unwrap(), handler.clone())
            .await
            .unwrap();
        let tcp = TcpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            handler,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let udp_addr = udp.local_addr();
        let tcp_addr = tcp.local_addr();

        let handles = vec![
            tokio::spawn(async move {
                let _ = udp.run().await;
            }),
            tokio::spawn(async move {
                let _ = tcp.run().await;
            }),
        ];

        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            store,
            tiered,
            engine,
            udp_addr,
            tcp_addr,
            handles,
        }
    }

    async fn seed(&self, record: DnsRecord) -> DnsRecord {
        let mut record = record;
        self.store.create(&mut record).await.unwrap();
        record
    }

    /// Stores a wildcard payload record and registers its pattern.
    async fn seed_wildcard(&self, name: &str, target: &str) -> DnsRecord {
        let record = self
            .seed(DnsRecord::new(name, RecordType::A, target, 300))
            .await;
        let pattern =
            WildcardPattern::from_name(record.id, record.id, name, self.engine.psl()).unwrap();
        self.engine.insert(pattern).unwrap();
        record
    }
}

impl Drop for TestStack {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn make_query(name: &str, qtype: RecordType) -> Message {
    Message::query(
        4242,
        Question::new(Name::from_str(name).unwrap(), qtype),
    )
}

async fn udp_query(addr: SocketAddr, query: &Message) -> std::io::Result<Message> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.send_to(&query.to_wire().unwrap(), addr).await?;

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;
    Message::parse(&buf[..len])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

async fn tcp_query(addr: SocketAddr, query: &Message) -> std::io::Result<Message> {
    let mut stream = TcpStream::connect(addr).await?;
    let wire = query.to_wire().unwrap();
    stream.write_all(&(wire.len() as u16).to_be_bytes()).await?;
    stream.write_all(&wire).await?;

    let mut len_buf = [0u8; 2];
    timeout(Duration::from_secs(5), stream.read_exact(&mut len_buf)).await??;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Message::parse(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

fn answer_target(message: &Message) -> String {
    match &message.answers[0].rdata {
        RData::A(addr) => addr.to_string(),
        RData::Cname(name) | RData::Ns(name) | RData::Ptr(name) => name.to_string(),
        RData::Mx { exchange, .. } => exchange.to_string(),
        other => panic!("unexpected rdata {other:?}"),
    }
}

// ============================================================================
// Basic answering
// ============================================================================

#[tokio::test]
async fn test_udp_a_query() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("www.test.internal", RecordType::A, "10.0.0.1", 300))
        .await;

    let response = udp_query(stack.udp_addr, &make_query("www.test.internal", RecordType::A))
        .await
        .unwrap();

    assert_eq!(response.rcode(), Rcode::NoError);
    assert_eq!(response.header.id, 4242);
    assert!(response.header.response);
    assert!(response.header.authoritative);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(answer_target(&response), "10.0.0.1");
    assert_eq!(response.answers[0].ttl, 300);
}

#[tokio::test]
async fn test_tcp_a_query() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("tcp.test.internal", RecordType::A, "10.0.0.2", 300))
        .await;

    let response = tcp_query(stack.tcp_addr, &make_query("tcp.test.internal", RecordType::A))
        .await
        .unwrap();
    assert_eq!(response.rcode(), Rcode::NoError);
    assert_eq!(answer_target(&response), "10.0.0.2");
}

#[tokio::test]
async fn test_nxdomain() {
    let stack = TestStack::start().await;
    let response = udp_query(
        stack.udp_addr,
        &make_query("missing.test.internal", RecordType::A),
    )
    .await
    .unwrap();
    assert_eq!(response.rcode(), Rcode::NxDomain);
    assert!(response.answers.is_empty());
}

#[tokio::test]
async fn test_case_insensitive_lookup() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("case.test.internal", RecordType::A, "10.0.0.3", 300))
        .await;

    for name in ["case.test.internal", "CASE.TEST.INTERNAL", "Case.Test.Internal"] {
        let response = udp_query(stack.udp_addr, &make_query(name, RecordType::A))
            .await
            .unwrap();
        assert_eq!(response.rcode(), Rcode::NoError, "query for {name}");
    }
}

#[tokio::test]
async fn test_malformed_datagram_ignored() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("alive.test.internal", RecordType::A, "10.0.0.4", 300))
        .await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0, 1, 2, 3], stack.udp_addr).await.unwrap();

    // The server keeps answering after garbage.
    let response = udp_query(
        stack.udp_addr,
        &make_query("alive.test.internal", RecordType::A),
    )
    .await
    .unwrap();
    assert_eq!(response.rcode(), Rcode::NoError);
}

// ============================================================================
// Resolution behavior
// ============================================================================

#[tokio::test]
async fn test_priority_tie_round_robin() {
    let stack = TestStack::start().await;
    for (target, priority) in [
        ("10.0.2.20", 10),
        ("10.0.2.21", 10),
        ("10.0.2.22", 10),
        ("10.0.2.30", 20),
    ] {
        stack
            .seed(
                DnsRecord::new("priority-test.internal", RecordType::A, target, 300)
                    .with_priority(priority),
            )
            .await;
    }

    // Repeated queries within one bucket return one and the same address
    // from the minimum-priority group; the pri=20 record never appears.
    let mut seen = std::collections::HashSet::new();
    for _ in 0..10 {
        let response = udp_query(
            stack.udp_addr,
            &make_query("priority-test.internal", RecordType::A),
        )
        .await
        .unwrap();
        let target = answer_target(&response);
        assert_ne!(target, "10.0.2.30");
        seen.insert(target);
    }
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn test_mx_returns_ordered_group() {
    let stack = TestStack::start().await;
    stack
        .seed(
            DnsRecord::new("test.internal", RecordType::Mx, "mail2.test.internal", 300)
                .with_priority(20),
        )
        .await;
    stack
        .seed(
            DnsRecord::new("test.internal", RecordType::Mx, "mail.test.internal", 300)
                .with_priority(10),
        )
        .await;

    let response = udp_query(stack.udp_addr, &make_query("test.internal", RecordType::Mx))
        .await
        .unwrap();
    assert_eq!(response.answers.len(), 2);
    match (&response.answers[0].rdata, &response.answers[1].rdata) {
        (
            RData::Mx {
                preference: p1,
                exchange: e1,
            },
            RData::Mx {
                preference: p2,
                exchange: e2,
            },
        ) => {
            assert_eq!((*p1, e1.to_string().as_str()), (10, "mail.test.internal."));
            assert_eq!((*p2, e2.to_string().as_str()), (20, "mail2.test.internal."));
        }
        other => panic!("expected MX answers, got {other:?}"),
    }
}

#[tokio::test]
async fn test_soa_hierarchy_walk() {
    let stack = TestStack::start().await;
    let mut soa = DnsRecord::new("test.internal", RecordType::Soa, "ns1.test.internal", 3600);
    soa.mbox = "hostmaster.test.internal".to_string();
    soa.serial = 2024061101;
    soa.refresh = 7200;
    soa.retry = 900;
    soa.expire = 1209600;
    soa.minttl = 300;
    stack.seed(soa).await;

    let response = udp_query(
        stack.udp_addr,
        &make_query("api.v1.test.internal", RecordType::Soa),
    )
    .await
    .unwrap();

    assert_eq!(response.rcode(), Rcode::NoError);
    assert_eq!(response.answers.len(), 1);
    // The SOA is presented as applying to the queried subdomain.
    assert_eq!(response.answers[0].name.to_string(), "api.v1.test.internal.");
    match &response.answers[0].rdata {
        RData::Soa { mname, serial, .. } => {
            assert_eq!(mname.to_string(), "ns1.test.internal.");
            assert_eq!(*serial, 2024061101);
        }
        other => panic!("expected SOA, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wildcard_precedence() {
    let stack = TestStack::start().await;
    // P1 *.service.prod and P2 api.*.prod under example.com. For
    // api.service.prod.example.com both match with two exact labels each;
    // position 0 decides for P2.
    stack
        .seed_wildcard("*.service.prod.example.com", "10.0.3.1")
        .await;
    stack
        .seed_wildcard("api.*.prod.example.com", "10.0.3.2")
        .await;

    let response = udp_query(
        stack.udp_addr,
        &make_query("api.service.prod.example.com", RecordType::A),
    )
    .await
    .unwrap();

    assert_eq!(response.rcode(), Rcode::NoError);
    assert_eq!(answer_target(&response), "10.0.3.2");
    // The answer is presented under the query name.
    assert_eq!(
        response.answers[0].name.to_string(),
        "api.service.prod.example.com."
    );

    // A name only P1 matches.
    let response = udp_query(
        stack.udp_addr,
        &make_query("web.service.prod.example.com", RecordType::A),
    )
    .await
    .unwrap();
    assert_eq!(answer_target(&response), "10.0.3.1");
}

#[tokio::test]
async fn test_cache_hit_second_lookup() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("www.test.internal", RecordType::A, "10.0.0.1", 300))
        .await;

    let query = make_query("www.test.internal", RecordType::A);
    let first = udp_query(stack.udp_addr, &query).await.unwrap();
    let second = udp_query(stack.udp_addr, &query).await.unwrap();

    assert_eq!(first.rcode(), Rcode::NoError);
    assert_eq!(second.rcode(), Rcode::NoError);
    // The second resolve was satisfied from L1: one store call total.
    assert_eq!(stack.store.lookup_count(), 1);
}

#[tokio::test]
async fn test_update_invalidates_cache() {
    let stack = TestStack::start().await;
    let mut record = stack
        .seed(DnsRecord::new("www.test.internal", RecordType::A, "10.0.0.1", 300))
        .await;

    let query = make_query("www.test.internal", RecordType::A);
    let response = udp_query(stack.udp_addr, &query).await.unwrap();
    assert_eq!(answer_target(&response), "10.0.0.1");

    // Update through the facade; the very next resolve reflects it.
    record.target = "10.0.9.9".to_string();
    stack.tiered.update(&record).await.unwrap();

    let response = udp_query(stack.udp_addr, &query).await.unwrap();
    assert_eq!(answer_target(&response), "10.0.9.9");
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_mixed_queries() {
    let stack = TestStack::start().await;
    stack
        .seed(DnsRecord::new("mixed.test.internal", RecordType::A, "10.0.0.5", 300))
        .await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let query = make_query("mixed.test.internal", RecordType::A);
        if i % 2 == 0 {
            let addr = stack.udp_addr;
            handles.push(tokio::spawn(async move { udp_query(addr, &query).await }));
        } else {
            let addr = stack.tcp_addr;
            handles.push(tokio::spawn(async move { tcp_query(addr, &query).await }));
        }
    }

    let mut success = 0;
    for handle in handles {
        if let Ok(Ok(response)) = handle.await {
            if response.rcode() == Rcode::NoError {
                success += 1;
            }
        }
    }
    assert_eq!(success, 50);
}

#[tokio::test]
async fn test_tcp_multiple_queries_one_connection() {
    let stack = TestStack::start().await;
    for (name, target) in [
        ("first.test.internal", "10.1.0.1"),
        ("second.test.internal", "10.1.0.2"),
    ] {
        stack
            .seed(DnsRecord::new(name, RecordType::A, target, 300))
            .await;
    }

    let mut stream = TcpStream::connect(stack.tcp_addr).await.unwrap();
    for (name, expected) in [
        ("first.test.internal", "10.1.0.1"),
        ("second.test.internal", "10.1.0.2"),
    ] {
        let wire = make_query(name, RecordType::A).to_wire().unwrap();
        stream
            .write_all(&(wire.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&wire).await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await.unwrap();

        let response = Message::parse(&buf).unwrap();
        assert_eq!(answer_target(&response), expected);
    }
}
