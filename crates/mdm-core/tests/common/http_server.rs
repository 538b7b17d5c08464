//! Minimal HTTP/1.1 server for integration tests.
//!
//! Routes:
//! - `/file`: 200 with the body, written in `chunks` pieces `chunk_delay` apart
//! - `/nolength`: same body without `Content-Length` (ends on close)
//! - `/short`: declares the full length but sends half the body
//! - `/redirect`: 302 to `/file` (relative `Location`)
//! - `/loop`: 302 to itself
//! - anything else: 404
//!
//! Every request is counted per path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub chunks: usize,
    pub chunk_delay: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            chunks: 10,
            chunk_delay: Duration::from_millis(20),
        }
    }
}

pub struct TestServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    /// Full URL for `path` (e.g. `/file`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

/// Starts a server in a background thread serving `body`. Runs until the process exits.
pub fn start(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(Mutex::new(HashMap::new()));
    let hits_srv = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let hits = Arc::clone(&hits_srv);
            thread::spawn(move || handle(stream, &body, opts, &hits));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        hits,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: ServerOptions,
    hits: &Mutex<HashMap<String, usize>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = request
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    match path.as_str() {
        "/file" => send_body(&mut stream, body, Some(body.len()), opts),
        "/nolength" => send_body(&mut stream, body, None, opts),
        "/short" => {
            let half = &body[..body.len() / 2];
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(half);
        }
        "/redirect" => redirect(&mut stream, "/file"),
        "/loop" => redirect(&mut stream, "/loop"),
        _ => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
            );
        }
    }
}

fn redirect(stream: &mut TcpStream, location: &str) {
    let response = format!(
        "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 5\r\nConnection: close\r\n\r\nmoved",
        location
    );
    let _ = stream.write_all(response.as_bytes());
}

fn send_body(stream: &mut TcpStream, body: &[u8], length: Option<usize>, opts: ServerOptions) {
    let length_header = match length {
        Some(len) => format!("Content-Length: {}\r\n", len),
        None => String::new(),
    };
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n{}Connection: close\r\n\r\n",
        length_header
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    let chunk_len = body.len().div_ceil(opts.chunks.max(1)).max(1);
    for (i, chunk) in body.chunks(chunk_len).enumerate() {
        if i > 0 {
            thread::sleep(opts.chunk_delay);
        }
        if stream.write_all(chunk).is_err() || stream.flush().is_err() {
            // Client went away (cancelled).
            return;
        }
    }
}
