//! Mock servers for the end-to-end scenarios in spec §8. These are
//! deliberately minimal: just enough protocol to let `desync`'s transports
//! complete a handshake and observe a scripted delay/response/hang-up.

pub mod h2_mock;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What one connection to the mock should do.
pub enum Script {
    /// Wait past any reasonable test timeout without responding.
    HangUp,
    /// Wait `delay`, then write `bytes` verbatim and close.
    Respond { delay: Duration, bytes: Vec<u8> },
}

impl Script {
    pub fn ok(delay: Duration) -> Self {
        Script::Respond {
            delay,
            bytes: b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK".to_vec(),
        }
    }
}

/// Spawn a plaintext HTTP/1.1 mock that serves `scripts` in order, one per
/// accepted connection. Every probe opens a fresh connection (spec §3
/// invariant), so a scenario with N requests needs N scripted entries.
pub async fn spawn_http1_mock(scripts: Vec<Script>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock listener");
    let addr = listener.local_addr().expect("local addr");
    let queue = Arc::new(Mutex::new(VecDeque::from(scripts)));

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::time::timeout(Duration::from_millis(500), socket.read(&mut buf)).await;

                let script = queue.lock().expect("lock script queue").pop_front();
                match script {
                    Some(Script::Respond { delay, bytes }) => {
                        tokio::time::sleep(delay).await;
                        let _ = socket.write_all(&bytes).await;
                    }
                    Some(Script::HangUp) | None => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
