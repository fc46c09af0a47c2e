use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Script step for the mock server.
pub enum ServerOp {
    /// Write raw bytes to the connected client.
    Reply(Vec<u8>),
    /// Drop the current socket (peer close). The server keeps accepting,
    /// so a client may reconnect afterwards.
    Close,
}

/// Scripted stand-in for a real server: accepts connections sequentially,
/// forwards every received request chunk, and writes whatever the test
/// scripts through the `ServerOp` channel.
///
/// Returns the listening port, the script sender, and the request stream.
pub async fn spawn_server() -> (u16, UnboundedSender<ServerOp>, UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (script_tx, mut script_rx) = mpsc::unbounded_channel::<ServerOp>();
    let (request_tx, request_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    op = script_rx.recv() => match op {
                        Some(ServerOp::Reply(data)) => {
                            if socket.write_all(&data).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerOp::Close) => break,
                        // Test is done with us.
                        None => return,
                    },
                    read = socket.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let _ = request_tx.send(buf[..n].to_vec());
                        }
                    },
                }
            }
        }
    });

    (port, script_tx, request_rx)
}

pub fn reply(script: &UnboundedSender<ServerOp>, data: &[u8]) {
    script.send(ServerOp::Reply(data.to_vec())).unwrap();
}

/// Accumulate request chunks until `expected` bytes have arrived and assert
/// they match. Requests may coalesce or fragment arbitrarily in transit.
pub async fn expect_request(requests: &mut UnboundedReceiver<Vec<u8>>, expected: &[u8]) {
    let mut received = Vec::new();
    while received.len() < expected.len() {
        let chunk = tokio::time::timeout(Duration::from_secs(5), requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("mock server stopped");
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, expected);
}
