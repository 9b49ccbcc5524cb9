//! End-to-end scenarios against the public API: accept a local connection,
//! dial a stub upstream peer, and observe the events the relay reports.

use std::sync::Arc;
use std::time::Duration;

use compio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use compio::net::{TcpListener, TcpStream};

use relay::{Acceptor, EventLoop, RelayObserver, Session};
use relay_core::config::RelayConfig;
use relay_core::endpoint::Endpoint;

#[derive(Clone, Debug, PartialEq)]
enum Event {
    StateChanged(bool),
    Local(String),
    Remote(String),
}

struct ChannelObserver {
    tx: flume::Sender<Event>,
    echo_local_to_remote: bool,
}

impl RelayObserver for ChannelObserver {
    fn on_local_message(&self, session: &Session, text: &str) {
        let _ = self.tx.send(Event::Local(text.to_string()));
        if self.echo_local_to_remote {
            let _ = session.send_remote(text.as_bytes());
        }
    }

    fn on_remote_message(&self, _session: &Session, text: &str) {
        let _ = self.tx.send(Event::Remote(text.to_string()));
    }

    fn on_client_state_changed(&self, _session: &Session, connected: bool) {
        let _ = self.tx.send(Event::StateChanged(connected));
    }
}

/// Connects with short retries: the acceptor's listener comes up
/// asynchronously on the worker thread, slightly after `bind` returns.
async fn connect_with_retry(addr: std::net::SocketAddr) -> TcpStream {
    for _ in 0..200 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        compio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("could not connect to {addr} after retrying");
}

async fn recv_event(rx: &flume::Receiver<Event>) -> Event {
    compio::time::timeout(Duration::from_secs(2), rx.recv_async())
        .await
        .expect("timed out waiting for event")
        .expect("observer channel closed unexpectedly")
}

fn start_relay(
    local_port: u16,
    remote_port: u16,
    echo_local_to_remote: bool,
) -> (EventLoop, flume::Receiver<Event>, std::net::SocketAddr, std::net::SocketAddr) {
    let (tx, rx) = flume::unbounded();
    let observer = Arc::new(ChannelObserver { tx, echo_local_to_remote });
    let event_loop = EventLoop::new(observer, 5);

    let local = Endpoint::parse(&format!("127.0.0.1:{local_port}")).unwrap();
    let remote = Endpoint::parse(&format!("127.0.0.1:{remote_port}")).unwrap();
    let config = RelayConfig::new(local, remote);
    let local_addr = local.addr();
    let remote_addr = remote.addr();
    Acceptor::new(event_loop.clone()).bind(config).unwrap();

    (event_loop, rx, local_addr, remote_addr)
}

/// S1: client sends "HELLO\0". Expect connected, then the framed message.
#[test]
fn s1_hello_delivers_one_local_message() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19401, 19402, false);
        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        compio::runtime::spawn(async move {
            let _ = remote_listener.accept().await;
        })
        .detach();

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        client.write_all(&b"HELLO\0"[..]).await.0.unwrap();
        assert_eq!(recv_event(&rx).await, Event::Local("HELLO".to_string()));

        event_loop.dispose();
    });
}

/// S2: "AB" then "C\0DE\0" in two writes. Expect "ABC" then "DE", in order.
#[test]
fn s2_split_write_reassembles_and_two_messages_emit_in_order() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19403, 19404, false);
        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        compio::runtime::spawn(async move {
            let _ = remote_listener.accept().await;
        })
        .detach();

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        client.write_all(&b"AB"[..]).await.0.unwrap();
        client.write_all(&b"C\0DE\0"[..]).await.0.unwrap();

        assert_eq!(recv_event(&rx).await, Event::Local("ABC".to_string()));
        assert_eq!(recv_event(&rx).await, Event::Local("DE".to_string()));

        event_loop.dispose();
    });
}

/// S3: remote sends a bare "\0". Expect an empty-text remote message.
#[test]
fn s3_empty_remote_message_delivers_empty_text() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19405, 19406, false);
        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        compio::runtime::spawn(async move {
            let (mut upstream, _) = remote_listener.accept().await.unwrap();
            upstream.write_all(&b"\0"[..]).await.0.unwrap();
        })
        .detach();

        let _client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));
        assert_eq!(recv_event(&rx).await, Event::Remote(String::new()));

        event_loop.dispose();
    });
}

/// S4: embedder echoes every local message to remote. Client sends
/// "PING\0"; the upstream stub must see exactly that on the wire.
#[test]
fn s4_echo_local_to_remote_forwards_exact_bytes() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19407, 19408, true);

        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        let upstream_task = compio::runtime::spawn(async move {
            let (mut upstream, _) = remote_listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16];
            let (n, buf) = upstream.read(buf).await;
            (n.unwrap(), buf)
        });

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        client.write_all(&b"PING\0"[..]).await.0.unwrap();
        assert_eq!(recv_event(&rx).await, Event::Local("PING".to_string()));

        let (n, buf) = upstream_task.await;
        assert_eq!(&buf[..n], b"PING\0");

        event_loop.dispose();
    });
}

/// S6: disposing the loop from an external thread tears down an active
/// session with exactly one disconnected event and closes both sockets.
#[test]
fn s6_external_dispose_tears_down_active_session() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19409, 19410, false);
        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        compio::runtime::spawn(async move {
            let _ = remote_listener.accept().await;
        })
        .detach();

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        event_loop.dispose();
        assert_eq!(recv_event(&rx).await, Event::StateChanged(false));

        // The relay closed its end; further reads observe EOF.
        let mut buf = vec![0u8; 8];
        let (result, _) = client.read(buf.split_off(0)).await;
        assert!(matches!(result, Ok(0) | Err(_)));
    });
}

/// Boundary behavior #11: a connection reset mid-message (no NUL sent)
/// delivers no event for the partial fragment, and `disconnected` fires
/// exactly once.
#[test]
fn reset_mid_message_delivers_no_partial_event() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19411, 19412, false);
        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        compio::runtime::spawn(async move {
            let _ = remote_listener.accept().await;
        })
        .detach();

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        client.write_all(&b"PARTIAL-NO-TERMINATOR"[..]).await.0.unwrap();
        drop(client);

        assert_eq!(recv_event(&rx).await, Event::StateChanged(false));

        // No further events should follow the single disconnected event.
        let outcome = compio::time::timeout(Duration::from_millis(100), rx.recv_async()).await;
        assert!(outcome.is_err(), "no event should follow disconnected for an unterminated fragment");

        event_loop.dispose();
    });
}

/// Round-trip law: if the embedder mirrors every local message to remote,
/// a NUL-terminated message passes through unchanged end to end.
#[test]
fn mirrored_echo_is_a_fixed_point() {
    let rt = compio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (event_loop, rx, local_addr, remote_addr) = start_relay(19413, 19414, true);

        let remote_listener = TcpListener::bind(remote_addr).await.unwrap();
        let upstream_task = compio::runtime::spawn(async move {
            let (mut upstream, _) = remote_listener.accept().await.unwrap();
            let mut buf = vec![0u8; 32];
            let (n, buf) = upstream.read(buf).await;
            (n.unwrap(), buf)
        });

        let mut client = connect_with_retry(local_addr).await;
        assert_eq!(recv_event(&rx).await, Event::StateChanged(true));

        client.write_all(&b"MIRROR-ME\0"[..]).await.0.unwrap();
        assert_eq!(recv_event(&rx).await, Event::Local("MIRROR-ME".to_string()));

        let (n, buf) = upstream_task.await;
        assert_eq!(&buf[..n], b"MIRROR-ME\0", "the echoed frame must be byte-identical on the wire");

        event_loop.dispose();
    });
}

/// S5: tick cadence of 10ms over ~105ms yields at least 10 monotonically
/// non-decreasing ticks.
#[test]
fn s5_tick_cadence_is_monotonic_and_frequent_enough() {
    struct TickObserver {
        tx: flume::Sender<u64>,
    }
    impl RelayObserver for TickObserver {
        fn on_tick(&self, elapsed_ms: u64) {
            let _ = self.tx.send(elapsed_ms);
        }
    }

    let (tx, rx) = flume::unbounded();
    let event_loop = EventLoop::new(Arc::new(TickObserver { tx }), 10);
    std::thread::sleep(Duration::from_millis(105));
    event_loop.dispose();

    let ticks: Vec<u64> = rx.try_iter().collect();
    assert!(ticks.len() >= 10, "expected >= 10 ticks, got {}", ticks.len());
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
}
