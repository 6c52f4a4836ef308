//! Loopback HTTP server for exercising the download and directory clients.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers every request with `Connection: close`, one thread for the
/// server's lifetime. Counts requests received.
pub(crate) struct StubServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    /// Serve each request with `respond(path)`.
    pub(crate) fn start<F>(mut respond: F) -> Self
    where
        F: FnMut(&str) -> (u16, Vec<u8>) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(path) = read_request_path(&mut stream) else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = respond(&path);
                let reason = if status == 200 { "OK" } else { "Stub" };
                let head = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        Self { base, hits }
    }

    /// Serve `responses` in order, repeating the last one once exhausted.
    pub(crate) fn scripted(responses: Vec<(u16, &'static str)>) -> Self {
        let mut next = 0;
        Self::start(move |_| {
            let (status, body) = responses[next.min(responses.len() - 1)];
            next += 1;
            (status, body.as_bytes().to_vec())
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Read the request head and return the request-target.
fn read_request_path(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&head);
    text.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}
