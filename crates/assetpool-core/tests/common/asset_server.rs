//! Minimal HTTP/1.1 server that plays a learning site's file endpoints.
//!
//! Serves a fixed set of files under `/pluginfile.php/...`, reachable through
//! the plain, webservice and (optionally) token-path endpoints. Every request
//! line is recorded so tests can count fetches.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct AssetServerOptions {
    /// If false, HEAD returns 405 (servers that block HEAD).
    pub head_allowed: bool,
    /// If false, `/tokenpluginfile.php/...` answers 404.
    pub token_path: bool,
}

impl Default for AssetServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            token_path: true,
        }
    }
}

pub struct AssetServer {
    /// Site URL without trailing slash, e.g. "http://127.0.0.1:12345".
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl AssetServer {
    /// Recorded request lines, e.g. "GET /pluginfile.php/1/a.png?offline=1".
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests with `method` whose target contains `needle`.
    pub fn count(&self, method: &str, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(method) && r.contains(needle))
            .count()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Starts a server in a background thread. `files` maps plain paths such as
/// "/pluginfile.php/1/mod_page/a.png" to bodies. Runs until the process exits.
pub fn start(files: Vec<(&str, Vec<u8>)>, opts: AssetServerOptions) -> AssetServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files: Arc<HashMap<String, Vec<u8>>> =
        Arc::new(files.into_iter().map(|(p, b)| (p.to_string(), b)).collect());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &files, &log, opts));
        }
    });
    AssetServer {
        base: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

/// Map any endpoint form back to the plain `/pluginfile.php/...` path.
fn plain_path(target: &str, opts: AssetServerOptions) -> Option<String> {
    let path = target.split('?').next().unwrap_or("");
    if let Some(rest) = path.strip_prefix("/webservice/pluginfile.php/") {
        return Some(format!("/pluginfile.php/{rest}"));
    }
    if let Some(rest) = path.strip_prefix("/tokenpluginfile.php/") {
        if !opts.token_path {
            return None;
        }
        let (_key, rest) = rest.split_once('/')?;
        return Some(format!("/pluginfile.php/{rest}"));
    }
    Some(path.to_string())
}

fn handle(
    mut stream: std::net::TcpStream,
    files: &HashMap<String, Vec<u8>>,
    log: &Mutex<Vec<String>>,
    opts: AssetServerOptions,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut first = request.lines().next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_string();
    let target = first.next().unwrap_or("").to_string();
    let ranged = request
        .lines()
        .any(|l| l.to_ascii_lowercase().starts_with("range: bytes=0-0"));
    log.lock().unwrap().push(format!("{method} {target}"));

    if method == "HEAD" && !opts.head_allowed {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let body = match plain_path(&target, opts).and_then(|p| files.get(&p)) {
        Some(body) => body,
        None => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
            return;
        }
    };
    let (status, slice) = if ranged && !body.is_empty() {
        ("206 Partial Content", &body[..1])
    } else {
        ("200 OK", &body[..])
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        slice.len()
    );
    let _ = stream.write_all(head.as_bytes());
    if method == "GET" {
        let _ = stream.write_all(slice);
    }
}
