//! In-process HTTP server for the end-to-end tests.
//!
//! Answers `HEAD` and `GET` for registered paths with `Content-Length` and
//! `Last-Modified`, counts body requests and can cut a body short.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub const MODIFIED: &str = "Sun, 06 Nov 1994 08:49:37 GMT";
pub const MODIFIED_SECS: i64 = 784111777;
pub const MODIFIED_LATER: &str = "Mon, 07 Nov 1994 08:49:37 GMT";
pub const MODIFIED_LATER_SECS: i64 = 784198177;

#[derive(Clone)]
struct Resource {
    body: Vec<u8>,
    last_modified: String,
    truncate_at: Option<usize>,
}

pub struct TestServer {
    base: String,
    resources: Arc<Mutex<HashMap<String, Resource>>>,
    gets: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let resources: Arc<Mutex<HashMap<String, Resource>>> = Arc::default();
        let gets = Arc::new(AtomicUsize::new(0));

        let shared = resources.clone();
        let counter = gets.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let shared = shared.clone();
                let counter = counter.clone();
                thread::spawn(move || handle(stream, &shared, &counter));
            }
        });

        Self {
            base,
            resources,
            gets,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn put(&self, path: &str, body: Vec<u8>, last_modified: &str) {
        self.resources.lock().unwrap().insert(
            path.to_string(),
            Resource {
                body,
                last_modified: last_modified.to_string(),
                truncate_at: None,
            },
        );
    }

    /// Advertise the full length but close after `n` body bytes.
    pub fn truncate(&self, path: &str, n: usize) {
        if let Some(r) = self.resources.lock().unwrap().get_mut(path) {
            r.truncate_at = Some(n);
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

fn read_request_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

fn handle(mut stream: TcpStream, resources: &Mutex<HashMap<String, Resource>>, gets: &AtomicUsize) {
    let Some(head) = read_request_head(&mut stream) else {
        return;
    };
    let mut parts = head.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let resource = resources.lock().unwrap().get(&path).cloned();
    let Some(resource) = resource else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nLast-Modified: {}\r\nConnection: close\r\n\r\n",
        resource.body.len(),
        resource.last_modified
    );
    let _ = stream.write_all(header.as_bytes());
    if method == "GET" {
        gets.fetch_add(1, Ordering::SeqCst);
        let end = resource
            .truncate_at
            .unwrap_or(resource.body.len())
            .min(resource.body.len());
        let _ = stream.write_all(&resource.body[..end]);
    }
    let _ = stream.flush();
}
