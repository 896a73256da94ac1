//! Scripted HTTP server for exercising the real backends
//!
//! Answers each request with the first matching [`Route`], writing the body
//! in the given chunks so tests can split NDJSON lines and SSE events across
//! network reads. Responses close the connection, so bodies end at EOF.

#![allow(dead_code)]

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    method: String,
    path: String,
    status: u16,
    content_type: String,
    chunks: Vec<String>,
    delay: Duration,
    once: bool,
}

impl Route {
    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status: 200,
            content_type: "application/json".to_string(),
            chunks: Vec::new(),
            delay: Duration::ZERO,
            once: false,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.content_type = "application/json".to_string();
        self.chunks = vec![body.to_string()];
        self
    }

    /// One JSON document per line, each line its own chunk
    pub fn ndjson(mut self, lines: &[Value]) -> Self {
        self.content_type = "application/x-ndjson".to_string();
        self.chunks = lines.iter().map(|line| format!("{}\n", line)).collect();
        self
    }

    /// One `data:` event per chunk
    pub fn sse(mut self, events: &[&str]) -> Self {
        self.content_type = "text/event-stream".to_string();
        self.chunks = events
            .iter()
            .map(|event| format!("data: {}\n\n", event))
            .collect();
        self
    }

    /// Raw body pieces, written exactly as given
    pub fn chunks(mut self, content_type: &str, chunks: &[&str]) -> Self {
        self.content_type = content_type.to_string();
        self.chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serves a single request, then gives way to later routes
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path == path
    }
}

pub struct FakeServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(routes));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        let _ = serve(socket, routes, requests).await;
                    });
                }
            })
        };

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An endpoint nothing listens on
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let request = read_request(&mut socket).await?;

    let route = {
        let mut routes = routes.lock().unwrap();
        match routes
            .iter()
            .position(|r| r.matches(&request.method, &request.path))
        {
            Some(index) if routes[index].once => Some(routes.remove(index)),
            Some(index) => Some(routes[index].clone()),
            None => None,
        }
    };
    requests.lock().unwrap().push(request);

    let route = route.unwrap_or_else(|| {
        Route::new("ANY", "")
            .status(404)
            .json(serde_json::json!({"error": "not found"}))
    });

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason(route.status),
        route.content_type
    );
    socket.write_all(head.as_bytes()).await?;
    socket.flush().await?;

    for chunk in &route.chunks {
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        socket.write_all(chunk.as_bytes()).await?;
        socket.flush().await?;
    }
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos;
        }
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[head_end + 4..].to_vec();
    while body.len() < content_length {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
