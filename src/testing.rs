use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::config::Settings;

/// Start a server answering every request with `respond(path)`; returns its address.
pub async fn serve<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + Clone + 'static,
{
    start(respond, false).await
}

/// Like [`serve`], but the connection stays open for a minute after the answer.
pub async fn serve_lingering<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + Clone + 'static,
{
    start(respond, true).await
}

async fn start<F>(respond: F, linger: bool) -> SocketAddr
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + Clone + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move { handle(socket, respond, linger).await });
        }
    });
    addr
}

async fn handle<F>(mut socket: TcpStream, respond: F, linger: bool)
where
    F: Fn(&str) -> Vec<u8>,
{
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
    let _ = socket.write_all(&respond(&path)).await;
    if linger {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    let _ = socket.shutdown().await;
}

/// A complete response with `Content-Length` and `Connection: close`.
pub fn response(status_line: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status_line);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    out.into_bytes()
}

/// Settings pointing the geolocation lookup at `/geo` on the given server.
pub fn settings_for(addr: SocketAddr) -> Settings {
    Settings {
        ipinfo_url: format!("http://{}/geo", addr),
        ..Settings::default()
    }
}
