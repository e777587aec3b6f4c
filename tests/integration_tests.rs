//! Integration tests covering the SMTP dialogue end to end over TCP

use std::net::SocketAddr;
use std::time::Duration;

use jushin::{ChannelStoreFactory, Email, ServerOptions, SmtpLimits, SmtpServer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        self.shutdown.cancel();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop after cancellation")
            .unwrap();
    }
}

async fn start_test_server() -> (TestServer, UnboundedReceiver<Email>) {
    start_test_server_with(|options| options).await
}

async fn start_test_server_with(
    configure: impl FnOnce(ServerOptions) -> ServerOptions,
) -> (TestServer, UnboundedReceiver<Email>) {
    let (store, rx) = ChannelStoreFactory::new();
    let options = configure(ServerOptions::new("test.local").with_message_store(store));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = SmtpServer::new(options);

    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        server
            .serve_with_listeners(vec![listener], token)
            .await
            .unwrap();
    });

    (
        TestServer {
            addr,
            shutdown,
            handle,
        },
        rx,
    )
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect and consume the greeting.
    async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut client = Client {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        let greeting = client.read_reply().await;
        assert!(greeting.starts_with("220"));
        client
    }

    async fn read_reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Read a complete reply, following `250-` continuation lines.
    async fn read_full_reply(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_reply().await;
            let done = line.len() < 4 || line.as_bytes()[3] == b' ';
            lines.push(line);
            if done {
                break;
            }
        }
        lines
    }

    async fn write_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send_command(&mut self, command: &str) -> String {
        self.write_line(command).await;
        self.read_reply().await
    }
}

async fn receive_email(rx: &mut UnboundedReceiver<Email>) -> Email {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for email")
        .expect("email channel closed")
}

#[tokio::test]
async fn test_complete_smtp_session() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    let response = client.send_command("HELO client.local").await;
    assert!(response.starts_with("250"));

    let response = client.send_command("MAIL FROM:<a@x>").await;
    assert!(response.starts_with("250"));

    let response = client.send_command("RCPT TO:<b@y>").await;
    assert!(response.starts_with("250"));

    let response = client.send_command("DATA").await;
    assert!(response.starts_with("354"));

    client.write_line("Hello").await;
    client.write_line(".").await;
    let response = client.read_reply().await;
    assert!(response.starts_with("250"));

    let response = client.send_command("QUIT").await;
    assert!(response.starts_with("221"));

    let email = receive_email(&mut rx).await;
    assert_eq!(email.from.as_deref(), Some("a@x"));
    assert_eq!(email.to, vec!["b@y"]);
    assert_eq!(email.data, "Hello");

    server.stop().await;
}

#[tokio::test]
async fn test_null_reverse_path() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("EHLO c").await;
    let response = client.send_command("MAIL FROM:<>").await;
    assert!(response.starts_with("250"));
    client.send_command("RCPT TO:<b@y>").await;
    client.send_command("DATA").await;
    let response = client.send_command(".").await;
    assert!(response.starts_with("250"));

    let email = receive_email(&mut rx).await;
    assert_eq!(email.from, None);

    server.stop().await;
}

#[tokio::test]
async fn test_dot_stuffing() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO c").await;
    client.send_command("MAIL FROM:<a@x>").await;
    client.send_command("RCPT TO:<b@y>").await;
    client.send_command("DATA").await;
    client.write_line("..hello").await;
    let response = client.send_command(".").await;
    assert!(response.starts_with("250"));

    let email = receive_email(&mut rx).await;
    assert_eq!(email.data, ".hello");

    server.stop().await;
}

#[tokio::test]
async fn test_blank_line_preservation() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO c").await;
    client.send_command("MAIL FROM:<a@x>").await;
    client.send_command("RCPT TO:<b@y>").await;
    client.send_command("DATA").await;
    client.write_line("first").await;
    client.write_line("").await;
    client.write_line("second").await;
    let response = client.send_command(".").await;
    assert!(response.starts_with("250"));

    let email = receive_email(&mut rx).await;
    assert_eq!(email.data, "first\n\nsecond");

    server.stop().await;
}

#[tokio::test]
async fn test_data_without_rcpt_is_bad_sequence() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO c").await;
    let response = client.send_command("DATA").await;
    assert!(response.starts_with("503"));

    server.stop().await;
}

#[tokio::test]
async fn test_size_limit() {
    let (server, _rx) =
        start_test_server_with(|options| options.with_max_message_size(1000)).await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO c").await;
    let response = client.send_command("MAIL FROM:<a@x> SIZE=2000").await;
    assert!(response.starts_with("452"));

    // Still outside a transaction: MAIL is accepted again.
    let response = client.send_command("MAIL FROM:<a@x> SIZE=500").await;
    assert!(response.starts_with("250"));

    server.stop().await;
}

#[tokio::test]
async fn test_ehlo_advertises_size() {
    let (server, _rx) =
        start_test_server_with(|options| options.with_max_message_size(1000)).await;
    let mut client = Client::connect(server.addr).await;

    client.write_line("EHLO client.local").await;
    let reply = client.read_full_reply().await;
    assert_eq!(reply[0], "250-test.local Hello client.local");
    assert_eq!(reply[1], "250 SIZE 1000");

    server.stop().await;
}

#[tokio::test]
async fn test_ipv4_literal_recipient() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO c").await;
    client.send_command("MAIL FROM:<a@x>").await;
    let response = client.send_command("RCPT TO:<u@[127.0.0.1]>").await;
    assert!(response.starts_with("250"));
    client.send_command("DATA").await;
    client.send_command(".").await;

    let email = receive_email(&mut rx).await;
    assert_eq!(email.to, vec!["u@127.0.0.1"]);

    server.stop().await;
}

#[tokio::test]
async fn test_trailing_hyphen_domain_rejected() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    let response = client.send_command("HELO foo-").await;
    assert!(response.starts_with("501"));

    server.stop().await;
}

#[tokio::test]
async fn test_error_handling() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    // Unknown verb
    let response = client.send_command("INVALID").await;
    assert!(response.starts_with("500"));

    // MAIL without HELO
    let response = client.send_command("MAIL FROM:<test@example.com>").await;
    assert!(response.starts_with("503"));

    let response = client.send_command("QUIT").await;
    assert!(response.starts_with("221"));

    server.stop().await;
}

#[tokio::test]
async fn test_command_line_length_limit() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    let long_command = "HELO ".to_string() + &"a".repeat(SmtpLimits::COMMAND_LINE_MAX_LENGTH);
    let response = client.send_command(&long_command).await;
    assert!(response.starts_with("500"));

    // The session survives the oversized line.
    let response = client.send_command("HELO client.local").await;
    assert!(response.starts_with("250"));

    server.stop().await;
}

#[tokio::test]
async fn test_recipient_limit() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO client.local").await;
    client.send_command("MAIL FROM:<sender@example.com>").await;

    for i in 0..SmtpLimits::MAX_RECIPIENTS {
        let response = client
            .send_command(&format!("RCPT TO:<user{i}@example.com>"))
            .await;
        assert!(response.starts_with("250"));
    }

    let response = client.send_command("RCPT TO:<extra@example.com>").await;
    assert!(response.starts_with("452"));

    server.stop().await;
}

#[tokio::test]
async fn test_multiple_recipients() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO client.local").await;
    client.send_command("MAIL FROM:<sender@example.com>").await;
    client.send_command("RCPT TO:<recipient1@example.com>").await;
    client.send_command("RCPT TO:<recipient2@example.com>").await;
    client.send_command("DATA").await;
    client.write_line("Subject: Multiple Recipients").await;
    client.write_line("").await;
    client.write_line("Test message for multiple recipients").await;
    let response = client.send_command(".").await;
    assert!(response.starts_with("250"));

    let email = receive_email(&mut rx).await;
    assert_eq!(email.to.len(), 2);
    assert!(email.has_recipient("recipient1@example.com"));
    assert!(email.has_recipient("recipient2@example.com"));

    server.stop().await;
}

#[tokio::test]
async fn test_rset_command() {
    let (server, mut rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    client.send_command("HELO client.local").await;
    client.send_command("MAIL FROM:<sender@example.com>").await;
    client.send_command("RCPT TO:<recipient@example.com>").await;

    let response = client.send_command("RSET").await;
    assert!(response.starts_with("250"));

    client.send_command("MAIL FROM:<newsender@example.com>").await;
    client
        .send_command("RCPT TO:<newrecipient@example.com>")
        .await;
    client.send_command("DATA").await;
    client.write_line("Subject: After Reset").await;
    client.write_line("").await;
    client.write_line("This message came after RSET").await;
    let response = client.send_command(".").await;
    assert!(response.starts_with("250"));

    client.send_command("QUIT").await;

    // Only the post-RSET transaction was delivered.
    let email = receive_email(&mut rx).await;
    assert_eq!(email.from.as_deref(), Some("newsender@example.com"));
    assert_eq!(email.to, vec!["newrecipient@example.com"]);
    assert!(rx.try_recv().is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_non_utf8_input_handling() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    // An invalid UTF-8 prefix must not break the session.
    client.writer.write_all(&[0xFF, 0xFE, 0xFD]).await.unwrap();
    client
        .writer
        .write_all(b" HELO client.local\r\n")
        .await
        .unwrap();
    client.writer.flush().await.unwrap();

    let response = client.read_reply().await;
    assert!(response.starts_with("500"));

    let response = client.send_command("HELO client.local").await;
    assert!(response.starts_with("250"));

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_connections() {
    let (server, mut rx) = start_test_server().await;

    let mut handles = Vec::new();
    for client_id in 0..5 {
        let addr = server.addr;
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client
                .send_command(&format!("HELO client{client_id}.local"))
                .await;
            client
                .send_command(&format!("MAIL FROM:<sender{client_id}@example.com>"))
                .await;
            client
                .send_command(&format!("RCPT TO:<recipient{client_id}@example.com>"))
                .await;
            client.send_command("DATA").await;
            client
                .write_line(&format!("Subject: Concurrent Test {client_id}"))
                .await;
            client.write_line("").await;
            client
                .write_line(&format!("This is from client {client_id}"))
                .await;
            let response = client.send_command(".").await;
            assert!(response.starts_with("250"));
            client.send_command("QUIT").await;
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let mut emails = Vec::new();
    for _ in 0..5 {
        emails.push(receive_email(&mut rx).await);
    }
    assert_eq!(emails.len(), 5);
    for client_id in 0..5 {
        let sender = format!("sender{client_id}@example.com");
        assert!(emails.iter().any(|e| e.from.as_deref() == Some(&sender)));
    }

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_idle_session() {
    let (server, _rx) = start_test_server().await;
    let mut client = Client::connect(server.addr).await;

    let response = client.send_command("HELO client.local").await;
    assert!(response.starts_with("250"));

    server.shutdown.cancel();

    // The session says goodbye if it still can, then the connection ends.
    let mut line = String::new();
    if client.reader.read_line(&mut line).await.unwrap() > 0 {
        assert!(line.starts_with("221"));
    }

    timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop after cancellation")
        .unwrap();
}
