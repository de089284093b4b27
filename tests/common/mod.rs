use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread::JoinHandle;

use rusqlite::Connection;
use tempfile::TempDir;

/// Create a fresh temporary database, returning the connection, dir handle,
/// and db path. The caller must hold onto `TempDir` to keep the temp
/// directory alive.
#[allow(dead_code)]
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = depgate::db::open(&db_path).unwrap();
    depgate::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

/// Spawn a loopback HTTP stub that answers `requests` connections with the
/// given status and body, capturing each raw request (head + body). Returns
/// the base URL and a handle yielding the captured requests on join.
#[allow(dead_code)]
pub fn stub_http(
    status: u16,
    reason: &'static str,
    body: &'static str,
    requests: usize,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let mut captured = Vec::new();
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            captured.push(read_request(&mut stream));
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        }
        captured
    });

    (base_url, handle)
}

/// Read one HTTP request: headers, then a Content-Length body if present.
#[allow(dead_code)]
fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(str::to_owned))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}

#[allow(dead_code)]
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
