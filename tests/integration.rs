//! Integration tests for commandstation-wifi.
//!
//! These tests drive a whole station against a scripted modem, both through
//! the in-memory modem with a manual clock and through the tokio serial
//! driver over a duplex stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use commandstation_wifi::protocol::build_announcement;
use commandstation_wifi::{
    from_fn, ConnectionId, ManualClock, MemoryModem, RequestKind, Station, StationBuilder,
    TransportState, WifiConfig, WifiError,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

/// Handshake commands and what a healthy modem answers.
const HANDSHAKE: &[(&str, &str)] = &[
    ("AT+RST", "\r\nOK\r\n\r\nready\r\n"),
    ("AT+CWMODE=1", "\r\nOK\r\n"),
    ("AT+CWJAP=", "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"),
    ("AT+CIFSR", "+CIFSR:STAIP,\"192.168.1.20\"\r\n\r\nOK\r\n"),
    ("AT+CIPMUX=1", "\r\nOK\r\n"),
    ("AT+CIPSERVER=1,", "\r\nOK\r\n"),
];

fn config() -> WifiConfig {
    let mut config = WifiConfig::new("Layout", "s3cret");
    config.timeouts.settle_ms = 0;
    config
}

fn scripted_modem() -> MemoryModem {
    let modem = MemoryModem::new();
    for (command, response) in HANDSHAKE {
        modem.on_command(command, response);
    }
    modem
}

fn start(builder: StationBuilder) -> (Station<MemoryModem, ManualClock>, MemoryModem, ManualClock) {
    let modem = scripted_modem();
    let clock = ManualClock::new();
    let mut station = builder.build(modem.clone(), clock.clone()).unwrap();
    station.setup().unwrap();
    modem.take_output();
    (station, modem, clock)
}

fn take_text(modem: &MemoryModem) -> String {
    String::from_utf8(modem.take_output()).unwrap()
}

/// A command request is answered through CIPSEND, the prompt and the reply.
#[test]
fn test_command_request_end_to_end() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let (mut station, modem, _clock) = start(Station::builder(config()).command(from_fn(
        move |ctx| {
            record.lock().unwrap().push((
                ctx.connection_id(),
                ctx.kind(),
                ctx.request_text().unwrap().to_string(),
            ));
            let _ = ctx.reply(b"<p1>");
        },
    )));

    modem.inject(b"+IPD,3,5:<abc>");
    station.tick().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ConnectionId::new(3), RequestKind::Command, "<abc>".to_string())]
    );
    assert_eq!(take_text(&modem), "AT+CIPSEND=3,4\r\n");

    modem.inject(b"\r\nOK\r\n> ");
    station.tick().unwrap();
    assert_eq!(take_text(&modem), "<p1>");

    modem.inject(b"\r\nRecv 4 bytes\r\n\r\nSEND OK\r\n");
    station.tick().unwrap();
    assert!(modem.output().is_empty());
    assert_eq!(station.state(), TransportState::Receiving);
}

/// The same frame delivered one byte per tick reconstructs the same request.
#[test]
fn test_byte_per_tick_delivery() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let (mut station, modem, _clock) = start(Station::builder(config()).command(from_fn(
        move |ctx| {
            record
                .lock()
                .unwrap()
                .push((ctx.connection_id().get(), ctx.request().to_vec()));
        },
    )));

    for byte in build_announcement(ConnectionId::new(6), b"<t 1 3 50 1>") {
        modem.inject(&[byte]);
        station.tick().unwrap();
    }

    assert_eq!(*seen.lock().unwrap(), vec![(6, b"<t 1 3 50 1>".to_vec())]);
}

/// Connections are served in turn and keep separate control sessions.
#[test]
fn test_interleaved_connections() {
    let sessions = Arc::new(AtomicUsize::new(0));
    let created = sessions.clone();
    let (mut station, modem, _clock) = start(Station::builder(config()).control(move |id| {
        created.fetch_add(1, Ordering::SeqCst);
        Box::new(from_fn(move |ctx| {
            let _ = ctx.reply(format!("id{}", id).as_bytes());
        }))
    }));

    for id in [1u8, 2, 1] {
        modem.inject(&build_announcement(ConnectionId::new(id), b"TPA"));
        station.tick().unwrap();
        modem.inject(b">");
        station.tick().unwrap();
        assert_eq!(take_text(&modem), format!("AT+CIPSEND={},3\r\nid{}", id, id));
    }

    assert_eq!(sessions.load(Ordering::SeqCst), 2);
}

/// A lost prompt costs one reply, not the next request.
#[test]
fn test_missing_prompt_times_out() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let (mut station, modem, clock) = start(Station::builder(config()).command(from_fn(
        move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = ctx.reply(b"<X>");
        },
    )));

    modem.inject(b"+IPD,0,3:<s>");
    station.tick().unwrap();
    assert_eq!(station.state(), TransportState::AwaitingPrompt);

    clock.advance(Duration::from_millis(1_500));
    station.tick().unwrap();
    assert_eq!(station.state(), TransportState::AwaitingPrompt);

    clock.advance(Duration::from_millis(600));
    station.tick().unwrap();
    assert_eq!(station.state(), TransportState::Receiving);

    modem.take_output();
    modem.inject(b"+IPD,0,3:<s>");
    station.tick().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(take_text(&modem), "AT+CIPSEND=0,3\r\n");
}

/// HTTP requests without a reply only close the connection.
#[test]
fn test_http_without_reply() {
    let (mut station, modem, _clock) = start(Station::builder(config()));

    modem.inject(&build_announcement(
        ConnectionId::new(4),
        b"GET /favicon.ico HTTP/1.1\r\n\r\n",
    ));
    station.tick().unwrap();

    assert_eq!(take_text(&modem), "AT+CIPCLOSE=4\r\n");
}

/// An announcement larger than the buffer is skipped without losing sync.
#[test]
fn test_oversized_frame_then_normal_frame() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let config = config().with_buffer_capacity(16);
    let (mut station, modem, _clock) = start(Station::builder(config).command(from_fn(
        move |ctx| record.lock().unwrap().push(ctx.request().to_vec()),
    )));

    modem.inject(&build_announcement(ConnectionId::new(0), &[b'x'; 40]));
    modem.inject(&build_announcement(ConnectionId::new(1), b"<s>"));
    station.tick().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![b"<s>".to_vec()]);
}

/// The optional hostname and mDNS steps are sent when enabled.
#[test]
fn test_optional_handshake_steps() {
    let mut config = config();
    config.set_hostname = true;
    config.advertise_mdns = true;
    config.hostname = "layout".into();
    config.servername = "dccex".into();

    let modem = scripted_modem();
    modem.on_command("AT+CWHOSTNAME", "\r\nOK\r\n");
    modem.on_command("AT+MDNS", "\r\nOK\r\n");
    let mut station = Station::builder(config)
        .build(modem.clone(), ManualClock::new())
        .unwrap();

    station.setup().unwrap();
    let sent = take_text(&modem);
    assert!(sent.contains("AT+CWMODE=1\r\nAT+CWHOSTNAME=\"layout\"\r\nAT+CWJAP="));
    assert!(sent.ends_with("AT+MDNS=1,\"layout.local\",\"dccex.local\",2560\r\n"));
}

/// A failed handshake can be retried explicitly.
#[test]
fn test_setup_retry_after_failure() {
    let modem = MemoryModem::new();
    let mut station = Station::builder(config())
        .build(modem.clone(), ManualClock::new())
        .unwrap();

    assert!(matches!(
        station.setup(),
        Err(WifiError::HandshakeFailed { step: "reset", .. })
    ));
    assert!(!station.is_connected());

    for (command, response) in HANDSHAKE {
        modem.on_command(command, response);
    }
    station.setup().unwrap();
    assert!(station.is_connected());
}

// ==================== Serial driver ====================

async fn read_line<R: AsyncReadExt + Unpin>(reader: &mut R) -> String {
    let mut line = Vec::new();
    while !line.ends_with(b"\r\n") {
        let byte = tokio::time::timeout(Duration::from_secs(5), reader.read_u8())
            .await
            .expect("timed out waiting for the station")
            .unwrap();
        line.push(byte);
    }
    String::from_utf8(line).unwrap()
}

/// Full run over the tokio serial driver.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_over_duplex() {
    let (station_side, modem_side) = duplex(4096);
    let (mut from_station, mut to_station) = tokio::io::split(modem_side);

    let handle = Station::builder(config())
        .command(from_fn(|ctx| {
            if ctx.request() == b"<abc>" {
                let _ = ctx.reply(b"<p1>");
            }
        }))
        .serve(station_side)
        .await
        .unwrap();

    for (command, response) in HANDSHAKE {
        let line = read_line(&mut from_station).await;
        assert!(line.starts_with(command), "unexpected {:?}", line);
        to_station.write_all(response.as_bytes()).await.unwrap();
    }

    to_station.write_all(b"0,CONNECT\r\n\r\n+IPD,3,5:<abc>").await.unwrap();
    assert_eq!(read_line(&mut from_station).await, "AT+CIPSEND=3,4\r\n");

    to_station.write_all(b"\r\nOK\r\n> ").await.unwrap();
    let mut reply = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), from_station.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"<p1>");

    handle.shutdown().await.unwrap();
}

/// A silent modem fails the handshake and ends the worker.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_reports_handshake_failure() {
    let (station_side, _modem_side) = duplex(4096);
    let mut config = config();
    config.timeouts.reset_ms = 50;

    let handle = Station::builder(config).serve(station_side).await.unwrap();
    let result = handle.wait().await;

    assert!(matches!(
        result,
        Err(WifiError::HandshakeFailed { step: "reset", .. })
    ));
}

/// Dropping the modem side ends the service loop.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_ends_when_link_closes() {
    let (station_side, modem_side) = duplex(4096);
    let (mut from_station, mut to_station) = tokio::io::split(modem_side);

    let handle = Station::builder(config()).serve(station_side).await.unwrap();
    for (_, response) in HANDSHAKE {
        read_line(&mut from_station).await;
        to_station.write_all(response.as_bytes()).await.unwrap();
    }

    drop(from_station);
    drop(to_station);

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap();
    assert!(matches!(result, Err(WifiError::LinkClosed)));
}
