//! Shared fixtures for unit tests: synthetic zip archives, a one-shot
//! HTTP responder and a server that never answers.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =============================================================================
// Archives
// =============================================================================

/// Content of one synthetic archive entry.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    /// A directory entry (name should end with `/`).
    Dir,
    /// A file with the given bytes.
    Bytes(&'a [u8]),
    /// A file of `n` zero bytes.
    Zeros(usize),
}

/// Writes a zip archive with the given entries, in order.
pub fn write_zip(path: &Path, entries: &[(&str, Entry<'_>)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for (name, entry) in entries {
        match entry {
            Entry::Dir => zip.add_directory(*name, options).unwrap(),
            Entry::Bytes(data) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            Entry::Zeros(len) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(&vec![0u8; *len]).unwrap();
            }
        }
    }

    zip.finish().unwrap();
}

/// Builds a zip archive in memory.
pub fn zip_bytes(entries: &[(&str, Entry<'_>)]) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("fixture.zip");
    write_zip(&path, entries);
    std::fs::read(path).unwrap()
}

// =============================================================================
// HTTP
// =============================================================================

/// Canned response served by [`serve_once`].
#[derive(Debug, Clone)]
pub struct HttpFixture {
    status: u16,
    reason: &'static str,
    body: Vec<u8>,
    send_length: bool,
}

impl HttpFixture {
    /// `200 OK` with a `Content-Length` header.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            body,
            send_length: true,
        }
    }

    /// `200 OK` without a length; the body ends when the connection closes.
    pub fn without_length(body: Vec<u8>) -> Self {
        Self {
            send_length: false,
            ..Self::ok(body)
        }
    }

    /// An empty response with the given status.
    pub fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            body: Vec::new(),
            send_length: true,
        }
    }
}

/// Serves `fixture` to the first connection on a random local port and
/// returns the URL to request.
pub async fn serve_once(fixture: HttpFixture) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        // Consume the request head.
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let mut head = format!(
            "HTTP/1.1 {} {}\r\nConnection: close\r\n",
            fixture.status, fixture.reason
        );
        if fixture.send_length {
            head.push_str(&format!("Content-Length: {}\r\n", fixture.body.len()));
        }
        head.push_str("\r\n");

        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&fixture.body).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/game_archive.zip", addr)
}

/// Accepts one connection, reads the request and never answers. Returns
/// the URL to request.
pub async fn serve_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 1024];
        // Hold the socket open until the client hangs up.
        while let Ok(n) = socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    });

    format!("http://{}/game_archive.zip", addr)
}
