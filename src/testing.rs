use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Server that accepts one request and never finishes answering it.
pub struct HangingServer {
    pub base_url: String,
    /// Resolves once the client closes the connection.
    pub closed: oneshot::Receiver<()>,
}

async fn read_request_head(socket: &mut TcpStream) -> Option<()> {
    let mut buf = [0u8; 4096];
    let mut received = Vec::new();
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        received.extend_from_slice(&buf[..n]);
        if received.windows(4).any(|w| w == b"\r\n\r\n") {
            return Some(());
        }
    }
}

/// Start a local server that reads the request and then holds the
/// connection open without responding, reporting when the client hangs up.
pub async fn start_hanging_server() -> HangingServer {
    hold_open(None).await
}

/// Start a local server that answers with `head` (status line and headers)
/// and then stalls before sending the body it announced.
pub async fn start_stalled_response_server(head: &'static str) -> HangingServer {
    hold_open(Some(head)).await
}

async fn hold_open(head: Option<&'static str>) -> HangingServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        if read_request_head(&mut socket).await.is_none() {
            let _ = tx.send(());
            return;
        }
        if let Some(head) = head {
            if socket.write_all(head.as_bytes()).await.is_err() {
                let _ = tx.send(());
                return;
            }
        }
        // Drain until EOF or reset; the body (if any) is ignored.
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = tx.send(());
    });

    HangingServer {
        base_url: format!("http://{}", addr),
        closed: rx,
    }
}

/// Start a local server that streams chunked NDJSON lines with delays.
pub async fn start_chunked_server(
    steps: Vec<(Duration, String)>,
    finish_after: Option<Duration>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        if read_request_head(&mut socket).await.is_none() {
            return;
        }

        let headers = concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: application/x-ndjson\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n"
        );
        if socket.write_all(headers.as_bytes()).await.is_err() {
            return;
        }

        for (delay, line) in steps {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let payload = format!("{line}\n");
            let chunk = format!("{:X}\r\n{}\r\n", payload.len(), payload);
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
        }

        if let Some(delay) = finish_after {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let _ = socket.write_all(b"0\r\n\r\n").await;
    });

    format!("http://{}", addr)
}
