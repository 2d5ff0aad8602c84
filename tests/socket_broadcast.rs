//! End-to-end socket broadcasting over loopback

use nbpcast_core::{
    payload_queue, Broadcaster, BroadcasterConfig, BroadcasterHandle, Kpi, PacketKind, Payload,
    PayloadSender, SocketConfig, SocketTransport,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

fn start(interval: Duration) -> (SocketAddr, PayloadSender, BroadcasterHandle) {
    let transport = SocketTransport::bind(
        SocketConfig::new("127.0.0.1", 0).accept_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let addr = transport.local_addr().unwrap();

    let config = BroadcasterConfig::new("Track").min_update_interval(interval);
    let (tx, rx) = payload_queue(None);
    let handle = BroadcasterHandle::spawn(Broadcaster::new(&config, transport), rx).unwrap();
    (addr, tx, handle)
}

fn client(addr: SocketAddr, timeout: Duration) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(timeout)).unwrap();
    stream
}

/// Read one packet (terminated by a blank line), `None` on timeout
fn read_packet(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Option<String> {
    loop {
        if let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
            let packet: Vec<u8> = buffer.drain(..end + 2).collect();
            return Some(String::from_utf8(packet).unwrap());
        }

        let mut chunk = [0u8; 1024];
        match stream.read(&mut chunk) {
            Ok(0) => return None,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return None
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
}

fn update(timestamp: f64, kpis: Vec<Kpi>) -> Payload {
    Payload::new(timestamp, PacketKind::Update, kpis)
}

#[test]
fn broadcasts_update_and_metadata_packets() {
    let (addr, tx, mut handle) = start(Duration::ZERO);
    let mut stream = client(addr, Duration::from_secs(5));
    let mut buffer = Vec::new();

    tx.send(update(
        10.0,
        vec![
            Kpi::new("RPM", "rpm", 4500),
            Kpi::new("RPM", "rpm", 4600),
            Kpi::unitless("AFR", 14.7),
        ],
    ))
    .unwrap();
    assert_eq!(
        read_packet(&mut stream, &mut buffer).unwrap(),
        "*NBP1,UPDATE,10.000000\n\"RPM\",\"rpm\":4600\n\"AFR\":14.7\n#\n\n"
    );

    tx.send(Payload::new(11.0, PacketKind::Metadata, Vec::new())).unwrap();
    assert_eq!(read_packet(&mut stream, &mut buffer).unwrap(), "@NAME:Track\n\n");

    tx.send(update(12.0, vec![Kpi::unitless("AFR", 15.1)])).unwrap();
    assert_eq!(
        read_packet(&mut stream, &mut buffer).unwrap(),
        "*NBP1,UPDATE,12.000000\n\"AFR\":15.1\n#\n\n"
    );

    drop(tx);
    handle.wait();
    assert_eq!(handle.stats().packets_sent, 3);
}

#[test]
fn full_request_is_served_despite_rate_gate() {
    let (addr, tx, mut handle) = start(Duration::from_secs(30));
    let mut stream = client(addr, Duration::from_secs(5));
    let mut buffer = Vec::new();

    tx.send(update(1.0, vec![Kpi::new("RPM", "rpm", 4500), Kpi::unitless("AFR", 14.7)]))
        .unwrap();
    let first = read_packet(&mut stream, &mut buffer).unwrap();
    assert!(first.starts_with("*NBP1,UPDATE,1.000000\n"));

    stream.write_all(b"!ALL\n").unwrap();
    thread::sleep(Duration::from_millis(100));

    tx.send(update(2.0, vec![Kpi::new("MAP", "kPa", 101)])).unwrap();
    assert_eq!(
        read_packet(&mut stream, &mut buffer).unwrap(),
        "*NBP1,ALL,2.000000\n\"RPM\",\"rpm\":4500\n\"AFR\":14.7\n\"MAP\",\"kPa\":101\n#\n\n"
    );

    drop(tx);
    handle.wait();
    let stats = handle.stats();
    assert_eq!(stats.full_requests, 1);
    assert_eq!(stats.rate_limited, 1);
    assert_eq!(stats.packets_sent, 2);
}

#[test]
fn new_client_is_accepted_after_disconnect() {
    let (addr, tx, mut handle) = start(Duration::ZERO);
    let mut buffer = Vec::new();

    let mut first = client(addr, Duration::from_secs(5));
    tx.send(update(1.0, vec![Kpi::new("RPM", "rpm", 1000)])).unwrap();
    assert!(read_packet(&mut first, &mut buffer).is_some());
    drop(first);
    thread::sleep(Duration::from_millis(50));

    let mut second = client(addr, Duration::from_millis(200));
    buffer.clear();
    let mut received = None;
    for i in 0..50i32 {
        tx.send(update(2.0 + f64::from(i), vec![Kpi::new("RPM", "rpm", 2000 + i)]))
            .unwrap();
        if let Some(packet) = read_packet(&mut second, &mut buffer) {
            received = Some(packet);
            break;
        }
    }

    let packet = received.expect("second client never received a packet");
    assert!(packet.starts_with("*NBP1,UPDATE,"));
    assert!(packet.contains("\"RPM\",\"rpm\":"));

    drop(tx);
    handle.wait();
    let stats = handle.stats();
    assert_eq!(stats.connects, 2);
    assert!(stats.disconnects >= 1);
}

#[test]
fn payloads_without_client_are_merged_into_state() {
    let (addr, tx, mut handle) = start(Duration::ZERO);

    // No client yet: each payload waits out the accept timeout
    tx.send(update(1.0, vec![Kpi::new("RPM", "rpm", 1000)])).unwrap();
    tx.send(update(2.0, vec![Kpi::unitless("AFR", 13.9)])).unwrap();
    thread::sleep(Duration::from_millis(600));

    let mut stream = client(addr, Duration::from_secs(5));
    let mut buffer = Vec::new();
    tx.send(update(3.0, vec![Kpi::new("RPM", "rpm", 1100)])).unwrap();

    assert_eq!(
        read_packet(&mut stream, &mut buffer).unwrap(),
        "*NBP1,UPDATE,3.000000\n\"RPM\",\"rpm\":1100\n\"AFR\":13.9\n#\n\n"
    );

    drop(tx);
    handle.wait();
}
