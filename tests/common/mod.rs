//! Throwaway HTTP server for tests that exercise the fetcher.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use clouds_pipeline::RetryPolicy;

/// A server answering request `n` with `responses[n]`, repeating the last
/// response once the script runs out.
pub struct TestServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn serve(responses: Vec<(u16, Vec<u8>)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = responses
                .get(n)
                .or(responses.last())
                .cloned()
                .unwrap_or((404, Vec::new()));
            respond(stream, status, &body);
        }
    });

    TestServer {
        url: format!("http://{addr}/cloud.data"),
        hits,
    }
}

fn respond(mut stream: TcpStream, status: u16, body: &[u8]) {
    // drain the request head; GET requests carry no body
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut line = String::new();
    while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
        if line == "\r\n" || line == "\n" {
            break;
        }
        line.clear();
    }

    let reason = if status < 400 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

/// Retry policy without backoff sleeps.
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_wait: Duration::ZERO,
        backoff_multiplier: 2.0,
        timeout: Duration::from_secs(5),
    }
}

/// Raw cloud records: `n` whitespace-separated rows of `cols` numbers.
///
/// The first half of the rows has small values, the second half large ones,
/// so the two classes are separable.
pub fn raw_records(n: usize, cols: usize) -> String {
    let mut text = String::new();
    for i in 0..n {
        let base = if i < n / 2 { 10.0 } else { 100.0 };
        let row: Vec<String> = (0..cols)
            .map(|c| format!("{:.2}", base + (i % 5) as f64 + c as f64 * 0.5))
            .collect();
        text.push_str("  ");
        text.push_str(&row.join("  "));
        text.push('\n');
    }
    text
}
