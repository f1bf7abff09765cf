//! Local HTTP/1.1 responder for client tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the server does with one connection.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Read the request, then never answer.
    Silent,
    /// Answer with a status and body, then close.
    Status(u16, Vec<u8>),
}

/// Serve `replies` in order, one per accepted connection; later connections
/// are closed unanswered. Returns the base URL.
pub async fn serve(replies: Vec<Reply>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let replies = Arc::new(Mutex::new(VecDeque::from(replies)));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let reply = replies.lock().unwrap().pop_front();
            tokio::spawn(respond(stream, reply));
        }
    });
    format!("http://{addr}/")
}

async fn respond(mut stream: TcpStream, reply: Option<Reply>) {
    read_request(&mut stream).await;
    match reply {
        Some(Reply::Status(status, body)) => {
            let head = format!("HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n", body.len());
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
        Some(Reply::Silent) => std::future::pending::<()>().await,
        None => {}
    }
}

/// Consume the request head and its `content-length` body.
async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + body_len {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
