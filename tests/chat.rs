use std::net::SocketAddr;
use std::time::Duration;

use fachpi::handshake::SIGNATURE;
use fachpi::message::{self, FrameReader, FrameWriter};
use fachpi::{Client, FlowError, MessageTransform, Server};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct RawPeer {
    reader: FrameReader<ReadHalf<TcpStream>>,
    writer: FrameWriter<WriteHalf<TcpStream>>,
}

impl RawPeer {
    async fn join(addr: SocketAddr, name: &str) -> (RawPeer, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = message::split(stream);
        writer.send_frame(SIGNATURE.to_vec()).await.unwrap();
        assert_eq!(&reader.receive_frame().await[..], &SIGNATURE[..]);
        writer.send_text(name).await.unwrap();
        let server_name = reader.receive_text().await;
        (RawPeer { reader, writer }, server_name)
    }

    async fn say(&mut self, text: &str) {
        self.writer.send_text(text).await.unwrap();
    }

    async fn hear(&mut self) -> String {
        timeout(WAIT, self.reader.receive_text()).await.unwrap()
    }
}

async fn wait_for_flows(server: &Server, count: usize) {
    timeout(WAIT, async {
        while server.router().len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn every_client_hears_every_line() {
    let mut server = Server::with_transform(
        "hub",
        MessageTransform::custom(|from, text| format!("{from}: {text}")),
    );
    let addr = server.start("127.0.0.1:0").await.unwrap();

    let (mut alice, hub) = RawPeer::join(addr, "alice").await;
    let (mut bob, _) = RawPeer::join(addr, "bob").await;
    assert_eq!(hub, "hub");
    wait_for_flows(&server, 2).await;

    alice.say("hello").await;
    assert_eq!(alice.hear().await, "alice: hello");
    assert_eq!(bob.hear().await, "alice: hello");

    bob.say("hi alice").await;
    bob.say("bye").await;
    assert_eq!(alice.hear().await, "bob: hi alice");
    assert_eq!(alice.hear().await, "bob: bye");

    drop(bob);
    wait_for_flows(&server, 1).await;
    server.stop().await;
}

#[tokio::test]
async fn default_server_stamps_lines() {
    let mut server = Server::new("hub");
    let addr = server.start("127.0.0.1:0").await.unwrap();
    let (mut carol, _) = RawPeer::join(addr, "carol").await;
    wait_for_flows(&server, 1).await;

    carol.say("good morning").await;
    let line = carol.hear().await;
    // [yyyy/MM/dd HH:mm:ss.fffffff]<carol>good morning
    assert_eq!(line.len(), "[2024/01/01 00:00:00.0000000]".len() + "<carol>good morning".len());
    assert!(line.starts_with('['));
    assert_eq!(&line[5..6], "/");
    assert_eq!(&line[20..21], ".");
    assert!(line.ends_with("]<carol>good morning"));

    server.stop().await;
}

#[tokio::test]
async fn sifosc_server_relays_results() {
    let mut server = Server::sifosc("calc").unwrap();
    let addr = server.start("127.0.0.1:0").await.unwrap();
    let (mut dave, name) = RawPeer::join(addr, "dave").await;
    assert_eq!(name, "calc");
    wait_for_flows(&server, 1).await;

    dave.say("1 + 2 * 3").await;
    assert_eq!(dave.hear().await, "7");
    dave.say("[1,2] + [3]").await;
    assert_eq!(dave.hear().await, "[1,2,3]");
    dave.say("allobj.0").await;
    assert_eq!(dave.hear().await, "null");
    dave.say("hello").await;
    assert_eq!(dave.hear().await, "(not a valid SIFOSC expression) hello");
    dave.say("1 + 1 oops").await;
    assert_eq!(dave.hear().await, "(not a valid SIFOSC expression) 1 + 1 oops");

    // Absurd nesting is just another invalid line; the server keeps serving.
    let nested = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
    dave.say(&nested).await;
    assert_eq!(
        dave.hear().await,
        format!("(not a valid SIFOSC expression) {}", nested)
    );
    dave.say("5 / 0").await;
    assert_eq!(
        dave.hear().await,
        "(SIFOSC evaluation failed: division by zero) 5 / 0"
    );

    server.stop().await;
}

#[tokio::test]
async fn impostor_is_dropped_without_disturbing_others() {
    let mut server = Server::new("hub");
    let addr = server.start("127.0.0.1:0").await.unwrap();
    let (mut erin, _) = RawPeer::join(addr, "erin").await;
    wait_for_flows(&server, 1).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = message::split(stream);
    let mut forged = SIGNATURE;
    forged[15] ^= 0xFF;
    writer.send_frame(forged.to_vec()).await.unwrap();
    assert_eq!(&reader.receive_frame().await[..], &SIGNATURE[..]);
    assert!(!timeout(WAIT, reader.wait_for_data()).await.unwrap().unwrap());
    assert_eq!(server.router().len(), 1);

    erin.say("still here").await;
    assert!(erin.hear().await.ends_with("<erin>still here"));
    server.stop().await;
}

#[tokio::test]
async fn stopping_the_server_disconnects_clients() {
    let mut server = Server::new("hub");
    let addr = server.start("127.0.0.1:0").await.unwrap();
    let (mut frank, _) = RawPeer::join(addr, "frank").await;
    wait_for_flows(&server, 1).await;

    timeout(WAIT, server.stop()).await.unwrap();
    assert!(server.router().is_empty());
    assert!(!timeout(WAIT, frank.reader.wait_for_data())
        .await
        .unwrap()
        .unwrap());
}

#[tokio::test]
async fn client_prints_lines_from_the_server() {
    let mut server = Server::with_transform(
        "hub",
        MessageTransform::custom(|from, text| format!("{from} said {text}")),
    );
    let addr = server.start("127.0.0.1:0").await.unwrap();

    let (input, lines) = mpsc::unbounded_channel();
    let (output, mut console) = mpsc::unbounded_channel();
    let client = Client::new("gina", lines, output);
    assert_eq!(client.node().name(), "gina");
    let session = tokio::spawn(async move {
        let result = client.connect("127.0.0.1", addr.port()).await;
        (result, client)
    });
    wait_for_flows(&server, 1).await;

    input.send("ping".to_owned()).unwrap();
    let printed = timeout(WAIT, console.recv()).await.unwrap().unwrap();
    assert_eq!(printed, "<hub>gina said ping");

    drop(input);
    let (result, client) = timeout(WAIT, session).await.unwrap().unwrap();
    assert!(result.is_ok());

    // The console input was used up by the first session.
    assert!(matches!(
        client.connect("127.0.0.1", addr.port()).await,
        Err(FlowError::InputUnavailable)
    ));
    server.stop().await;
}
