//! Protocol tests for the MPD client.
//!
//! These tests start a scripted fake server on a loopback TCP socket and
//! verify the lines the client sends and how it interprets the responses.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use mpd_client::{Client, MpdError, SongId, Watcher};

/// Script entry that makes the fake server drop the connection
const HANG_UP: &str = "<hang up>";

/// Scripted fake server: for every entry it reads one request line and
/// writes the canned response. Received lines are forwarded to the returned
/// receiver.
fn fake_server(script: Vec<&'static str>) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake server");
    let address = listener.local_addr().unwrap().to_string();
    let (tx, rx) = channel::unbounded();

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("Failed to accept");
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"OK MPD 0.23.5\n").unwrap();

        for response in script {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let _ = tx.send(line.trim_end().to_string());
            if response == HANG_UP {
                return;
            }
            if writer.write_all(response.as_bytes()).is_err() {
                return;
            }
        }

        // Drain whatever is left until the client hangs up
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 {
            let _ = tx.send(line.trim_end().to_string());
            line.clear();
        }
    });

    (address, rx)
}

fn next_line(rx: &Receiver<String>) -> String {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("Timeout waiting for request line")
}

#[test]
fn test_dial_reads_greeting() {
    let (address, _rx) = fake_server(vec![]);
    let client = Client::dial("tcp", &address).expect("Failed to dial");
    assert_eq!(client.version(), "0.23.5");
}

#[test]
fn test_unsupported_network() {
    let err = Client::dial("carrier-pigeon", "nowhere").unwrap_err();
    assert!(matches!(err, MpdError::UnsupportedNetwork(_)));
}

#[test]
fn test_tcp4_dials_ipv4_address() {
    let (address, _rx) = fake_server(vec![]);
    let client = Client::dial("tcp4", &address).expect("Failed to dial over tcp4");
    assert_eq!(client.version(), "0.23.5");
}

#[test]
fn test_tcp6_rejects_ipv4_address() {
    let err = Client::dial("tcp6", "127.0.0.1:6600").unwrap_err();
    match err {
        MpdError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AddrNotAvailable),
        other => panic!("Expected address family error, got {:?}", other),
    }
}

#[test]
fn test_status_fields() {
    let (address, rx) = fake_server(vec!["volume: 50\nstate: stop\nelapsed: 0.000\nOK\n"]);
    let mut client = Client::dial("tcp", &address).unwrap();

    let status = client.status().expect("status failed");
    assert_eq!(next_line(&rx), "status");
    assert_eq!(status.state(), "stop");
    assert_eq!(status.volume(), "50");
    assert_eq!(status.elapsed(), "0.000");
}

#[test]
fn test_add_id_and_play_id() {
    let (address, rx) = fake_server(vec!["Id: 17\nOK\n", "OK\n", "OK\n"]);
    let mut client = Client::dial("tcp", &address).unwrap();

    let id = client.add_id("http://x/a \"b\".mp3", Some(0)).unwrap();
    assert_eq!(id, SongId(17));
    assert_eq!(next_line(&rx), r#"addid "http://x/a \"b\".mp3" 0"#);

    client.play_id(id).unwrap();
    assert_eq!(next_line(&rx), "playid 17");

    client.delete_id(id).unwrap();
    assert_eq!(next_line(&rx), "deleteid 17");
}

#[test]
fn test_transport_commands() {
    let (address, rx) = fake_server(vec!["OK\n"; 6]);
    let mut client = Client::dial("tcp", &address).unwrap();

    client.pause(true).unwrap();
    client.pause(false).unwrap();
    client.set_volume(130).unwrap();
    client.seek_cur(Duration::from_millis(61_500), false).unwrap();
    client.single(true).unwrap();
    client.ping().unwrap();

    assert_eq!(next_line(&rx), "pause 1");
    assert_eq!(next_line(&rx), "pause 0");
    assert_eq!(next_line(&rx), "setvol 100");
    assert_eq!(next_line(&rx), "seekcur 61.500");
    assert_eq!(next_line(&rx), "single 1");
    assert_eq!(next_line(&rx), "ping");
}

#[test]
fn test_ack_is_reported() {
    let (address, _rx) = fake_server(vec!["ACK [50@0] {playid} No such song\n"]);
    let mut client = Client::dial("tcp", &address).unwrap();

    match client.play_id(SongId(99)) {
        Err(MpdError::Ack { code, command, .. }) => {
            assert_eq!(code, 50);
            assert_eq!(command, "playid");
        }
        other => panic!("Expected ACK error, got {:?}", other),
    }
}

#[test]
fn test_closed_connection() {
    let (address, _rx) = fake_server(vec![HANG_UP]);
    let mut client = Client::dial("tcp", &address).unwrap();

    let err = client.stop().unwrap_err();
    assert!(matches!(err, MpdError::Closed | MpdError::Io(_)));
}

#[test]
fn test_watcher_forwards_changed_subsystems() {
    let (address, rx) = fake_server(vec![
        "changed: player\nchanged: mixer\nOK\n",
        // Second idle stays pending until noidle arrives
    ]);

    let watcher = Watcher::new("tcp", &address, None, &["player", "mixer"]).unwrap();
    let events = watcher.events();

    assert_eq!(next_line(&rx), "idle player mixer");
    assert_eq!(
        events.recv_timeout(Duration::from_secs(2)).unwrap(),
        "player"
    );
    assert_eq!(
        events.recv_timeout(Duration::from_secs(2)).unwrap(),
        "mixer"
    );

    assert_eq!(next_line(&rx), "idle player mixer");
    watcher.close().expect("close failed");
    watcher.close().expect("second close should be a no-op");
    assert!(watcher.errors().try_recv().is_err());
}

#[test]
fn test_watcher_reports_lost_connection() {
    let (address, rx) = fake_server(vec![HANG_UP]);

    let watcher = Watcher::new("tcp", &address, None, &["player"]).unwrap();
    let events = watcher.events();
    assert_eq!(next_line(&rx), "idle player");

    let err = watcher
        .errors()
        .recv_timeout(Duration::from_secs(2))
        .expect("connection loss was not reported");
    assert!(matches!(err, MpdError::Closed | MpdError::Io(_)));
    // The event stream ends with the connection
    assert!(events.recv_timeout(Duration::from_secs(2)).is_err());

    watcher.close().expect("close failed");
}
