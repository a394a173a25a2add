//! Minimal WebDAV-ish HTTP/1.1 server for integration tests.
//!
//! Understands MKCOL, PROPFIND (existence only) and PUT. Stores everything in
//! memory, keyed by the raw request path. One request per connection.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
pub struct DavState {
    pub collections: Mutex<HashSet<String>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// Number of upcoming PUTs to answer with 503.
    pub fail_puts: AtomicU32,
    pub put_requests: AtomicU32,
}

impl DavState {
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn has_collection(&self, path: &str) -> bool {
        self.collections.lock().unwrap().contains(path)
    }
}

/// Starts a server in a background thread. Returns the base URL
/// (e.g. "http://127.0.0.1:12345/") and the shared state.
pub fn start() -> (String, Arc<DavState>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(DavState::default());
    state.collections.lock().unwrap().insert("/".to_string());
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    (format!("http://127.0.0.1:{}/", port), state)
}

fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => format!("{}/", &trimmed[..i]),
        None => "/".to_string(),
    }
}

fn read_request(stream: &mut TcpStream) -> Option<(String, String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = std::str::from_utf8(&data[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    Some((method, path, body))
}

fn respond(stream: &mut TcpStream, status: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status
    );
    let _ = stream.write_all(response.as_bytes());
}

fn handle(mut stream: TcpStream, state: &DavState) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some((method, path, body)) = read_request(&mut stream) else {
        return;
    };
    match method.as_str() {
        "MKCOL" => {
            let mut cols = state.collections.lock().unwrap();
            if cols.contains(&path) {
                respond(&mut stream, "405 Method Not Allowed");
            } else if !cols.contains(&parent_of(&path)) {
                respond(&mut stream, "409 Conflict");
            } else {
                cols.insert(path);
                respond(&mut stream, "201 Created");
            }
        }
        "PROPFIND" => {
            if state.has_collection(&path) {
                respond(&mut stream, "207 Multi-Status");
            } else {
                respond(&mut stream, "404 Not Found");
            }
        }
        "PUT" => {
            state.put_requests.fetch_add(1, Ordering::SeqCst);
            let fail = state
                .fail_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                respond(&mut stream, "503 Service Unavailable");
                return;
            }
            if !state.has_collection(&parent_of(&path)) {
                respond(&mut stream, "409 Conflict");
                return;
            }
            state.files.lock().unwrap().insert(path, body);
            respond(&mut stream, "201 Created");
        }
        _ => respond(&mut stream, "405 Method Not Allowed"),
    }
}
