//! `HttpTransport` against a minimal in-process HTTP server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::{AuthConfig, HttpTransport, HttpTransportConfig, ResponseClass, Transport};

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.split_once(':')
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
}

fn read_http_request(stream: &mut TcpStream) -> CapturedRequest {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let parts: Vec<&str> = request_line.trim().split(' ').collect();
    let method = parts.first().unwrap_or(&"").to_string();
    let path = parts.get(1).unwrap_or(&"").to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = parse_header_line(&line) else {
            continue;
        };
        if key == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((key, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).expect("read body");
    }

    CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Serve one request per entry in `statuses`, answering with that status.
fn spawn_server(
    listener: TcpListener,
    statuses: Vec<u16>,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let captured = read_http_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status,
                status_text(status)
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(captured);
        }
    });

    (addr, rx)
}

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn transport_for(addr: SocketAddr, configure: impl FnOnce(&mut HttpTransportConfig)) -> HttpTransport {
    let mut config = HttpTransportConfig::new(format!("http://{addr}/v1/events"));
    config.connect_timeout = Duration::from_secs(5);
    config.request_timeout = Duration::from_secs(5);
    configure(&mut config);
    HttpTransport::new(config).expect("build transport")
}

#[rstest]
fn posts_payload_with_content_type(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_server(tcp_listener, vec![200]);
    let transport = transport_for(addr, |_| {});

    let result = transport.send(br#"{"events":[]}"#, "application/json");
    assert_eq!(result.class(), ResponseClass::Success);
    assert_eq!(result.status_code, 200);

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/v1/events");
    assert_eq!(captured.header("content-type"), "application/json");
    assert_eq!(captured.body, r#"{"events":[]}"#);
}

#[rstest]
fn sends_basic_auth_header(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_server(tcp_listener, vec![200]);
    let transport = transport_for(addr, |config| {
        config.auth = AuthConfig::Basic {
            username: "user".into(),
            password: "pass".into(),
        };
    });
    transport.send(b"{}", "application/json");

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.header("authorization"), "Basic dXNlcjpwYXNz");
}

#[rstest]
fn sends_bearer_token_and_extra_headers(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_server(tcp_listener, vec![202]);
    let transport = transport_for(addr, |config| {
        config.auth = AuthConfig::Bearer {
            token: "my-secret-token".into(),
        };
        config.headers.insert("X-Api-Key".into(), "abc123".into());
    });
    assert!(transport.send(b"{}", "application/json").success);

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.header("authorization"), "Bearer my-secret-token");
    assert_eq!(captured.header("x-api-key"), "abc123");
}

#[rstest]
#[case(429, ResponseClass::Retryable)]
#[case(500, ResponseClass::Retryable)]
#[case(503, ResponseClass::Retryable)]
#[case(400, ResponseClass::Permanent)]
#[case(401, ResponseClass::Permanent)]
fn classifies_error_statuses(
    tcp_listener: TcpListener,
    #[case] status: u16,
    #[case] expected: ResponseClass,
) {
    let (addr, _rx) = spawn_server(tcp_listener, vec![status]);
    let transport = transport_for(addr, |_| {});
    let result = transport.send(b"{}", "application/json");
    assert_eq!(result.class(), expected);
    assert_eq!(result.status_code, i32::from(status));
}

#[rstest]
fn connection_refused_is_retryable_without_status(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    drop(tcp_listener);
    let transport = transport_for(addr, |_| {});

    let result = transport.send(b"{}", "application/json");
    assert_eq!(result.class(), ResponseClass::Retryable);
    assert_eq!(result.status_code, 0);
    assert!(result.error.is_some());
}
