// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A raw HTTP server that promises more body than it delivers.

use std::{
    path::Path,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Size the response headers announce.
pub const DECLARED_LEN: usize = 100_000;
/// Bytes actually sent before the connection goes quiet.
pub const SENT_LEN: usize = 5_000;

/// Serves every request with [`DECLARED_LEN`] announced bytes,
/// sends [`SENT_LEN`] of them, keeps the connection open for `hold`,
/// and then closes it.
///
/// Returns the base URL of the server.
pub async fn serve(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(answer(stream, hold));
        }
    });
    format!("http://{addr}")
}

async fn answer(mut stream: TcpStream, hold: Duration) {
    let mut request = Vec::new();
    let mut buf = [0_u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(read) => request.extend_from_slice(&buf[..read]),
        }
    }
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {DECLARED_LEN}\r\n\r\n"
    );
    if stream.write_all(head.as_bytes()).await.is_err()
        || stream.write_all(&[b'x'; SENT_LEN]).await.is_err()
        || stream.flush().await.is_err()
    {
        return;
    }
    tokio::time::sleep(hold).await;
    let _ = stream.shutdown().await;
}

/// Polls until `path` exists, for at most `limit`.
pub async fn appears(path: &Path, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
