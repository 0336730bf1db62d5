//! Transport behaviour over real loopback sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nmea_simulator::broadcast::{tcp, udp::DatagramAdapter, ws, Delivery};
use nmea_simulator::inbound::{self, InboundMessage};
use nmea_simulator::sentences::OutboundSentence;
use nmea_simulator::{scenarios, BroadcastHub, BroadcastSettings, OverflowPolicy, Protocol, Simulation, SimulationSettings};
use nmea_types::{FramedSentence, NmeaSentence};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn hub(capacity: usize, write_timeout_ms: u64) -> Arc<BroadcastHub> {
    Arc::new(BroadcastHub::new(BroadcastSettings {
        queue_capacity: capacity,
        overflow_policy: OverflowPolicy::DropOldest,
        write_timeout: Duration::from_millis(write_timeout_ms),
    }))
}

fn inbound() -> (inbound::InboundSender, mpsc::Receiver<InboundMessage>) {
    inbound::channel(64, Arc::new(AtomicU64::new(0)))
}

/// Sentences emitted over `ticks` steps of the tacking scenario.
fn sentences(ticks: u64) -> Vec<OutboundSentence> {
    let mut sim = Simulation::new(scenarios::beat_to_windward(), &SimulationSettings::default()).unwrap();
    (1..=ticks).flat_map(|i| sim.step(0.1, Duration::from_millis(i * 100))).collect()
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < WAIT, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn all_transports_carry_the_same_tick() {
    let hub = hub(256, 1000);
    let (tx, _rx) = inbound();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, hub.clone(), tx.clone()));

    let udp_client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter = DatagramAdapter::new(adapter_socket, hub.clone(), tx.clone(), 4);
    tokio::spawn(adapter.serve(vec![udp_client.local_addr().unwrap()]));

    let mut framed = hub.framed.attach("127.0.0.1:1".parse().unwrap());
    let tcp_client = TcpStream::connect(tcp_addr).await.unwrap();
    let h = hub.clone();
    wait_for("stream + datagram clients", move || h.stream.len() == 1 && h.datagram.len() == 1).await;

    // First tick: every kind is due at once
    let tick: Vec<_> = sentences(1);
    assert_eq!(tick.len(), nmea_simulator::SentenceKind::ALL.len());
    for s in &tick {
        hub.publish(s);
    }

    let mut lines = BufReader::new(tcp_client).lines();
    let mut buf = vec![0u8; 2048];
    for s in &tick {
        let expected: NmeaSentence = nmea_types::decode(s.as_str()).unwrap();

        let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
        assert_eq!(nmea_types::decode(&line).unwrap(), expected);

        let n = timeout(WAIT, udp_client.recv(&mut buf)).await.unwrap().unwrap();
        assert_eq!(nmea_types::decode_bytes(&buf[..n]).unwrap(), expected);

        let Delivery::Send(f) = timeout(WAIT, framed.next()).await.unwrap() else { panic!("framed closed") };
        let json = ws::envelope(&f).unwrap();
        let envelope = FramedSentence::from_json(&json).unwrap();
        assert_eq!(envelope.tag, s.tag());
        assert_eq!(envelope.timestamp, s.timestamp_ms);
        assert_eq!(envelope.decode().unwrap(), expected);
    }
}

#[tokio::test]
async fn stalled_client_does_not_hold_back_others() {
    let hub = hub(32, 200);
    let (tx, _rx) = inbound();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, hub.clone(), tx));

    // Never reads
    let _stalled = TcpStream::connect(addr).await.unwrap();
    let healthy = TcpStream::connect(addr).await.unwrap();
    let h = hub.clone();
    wait_for("both clients", move || h.stream.len() == 2).await;

    let all = sentences(3000);
    // RMC carries the clock, so its text is unique per tick
    let last = all
        .iter()
        .rev()
        .find(|s| s.kind == nmea_simulator::SentenceKind::Rmc)
        .unwrap()
        .as_str()
        .trim_end()
        .to_string();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(healthy).lines();
        let mut received = 0usize;
        while let Ok(Some(line)) = lines.next_line().await {
            received += 1;
            if line == last {
                return received;
            }
        }
        received
    });

    let started = Instant::now();
    for (i, s) in all.iter().enumerate() {
        hub.publish(s);
        if i % 16 == 0 {
            tokio::task::yield_now().await;
        }
    }
    // Publishing never waits on a client
    assert!(started.elapsed() < Duration::from_secs(2));

    let received = timeout(WAIT, reader).await.expect("healthy client starved").unwrap();
    assert!(received > 0);
    for row in hub.stream.connections() {
        assert!(row.delivered + row.dropped <= all.len() as u64);
    }
}

#[tokio::test]
async fn half_closed_client_keeps_receiving() {
    let hub = hub(64, 1000);
    let (tx, _rx) = inbound();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, hub.clone(), tx));

    let client = TcpStream::connect(addr).await.unwrap();
    let h = hub.clone();
    wait_for("stream client", move || h.stream.len() == 1).await;

    // Read-only consumer: nothing more will come from this side
    let (read_half, mut write_half) = client.into_split();
    write_half.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.stream.len(), 1);

    let s = &sentences(1)[0];
    hub.publish(s);
    let mut lines = BufReader::new(read_half).lines();
    let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
    assert_eq!(line, s.as_str().trim_end());
    assert_eq!(hub.stream.len(), 1);
}

#[tokio::test]
async fn oversized_and_binary_lines_do_not_end_the_connection() {
    let hub = hub(64, 1000);
    let dropped = Arc::new(AtomicU64::new(0));
    let (tx, mut rx) = inbound::channel(64, dropped.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, hub.clone(), tx));

    let mut client = TcpStream::connect(addr).await.unwrap();
    let h = hub.clone();
    wait_for("stream client", move || h.stream.len() == 1).await;

    client.write_all(&vec![b'A'; 4 * tcp::MAX_LINE]).await.unwrap();
    client.write_all(b"tail\r\n\xff\xfe\r\n$GPHDT,274.1,T*35\r\n").await.unwrap();

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.line, "\u{FFFD}\u{FFFD}");
    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.line, "$GPHDT,274.1,T*35");
    assert_eq!(dropped.load(Ordering::Relaxed), 1);
    assert_eq!(hub.stream.len(), 1);
}

#[tokio::test]
async fn datagram_peers_are_discovered_and_heard() {
    let hub = hub(64, 500);
    let (tx, mut rx) = inbound();
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_addr = adapter_socket.local_addr().unwrap();
    tokio::spawn(DatagramAdapter::new(adapter_socket, hub.clone(), tx, 4).serve(vec![]));

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    peer.send_to(b"$GPHDT,274.1,T*35\r\n", adapter_addr).await.unwrap();

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.protocol, Protocol::Datagram);
    assert_eq!(msg.peer, peer.local_addr().unwrap());
    assert_eq!(msg.line, "$GPHDT,274.1,T*35");

    let h = hub.clone();
    wait_for("discovered peer", move || h.datagram.len() == 1).await;
    let s = &sentences(1)[0];
    hub.publish(s);
    let mut buf = vec![0u8; 2048];
    let n = timeout(WAIT, peer.recv(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], s.text.as_ref());
}

#[tokio::test]
async fn health_endpoint_answers() {
    let hub = hub(16, 500);
    let (tx, _rx) = inbound();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let app = ws::router(hub, tx);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response)).await.unwrap().unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("nmea-sim ok"), "{response}");
}
