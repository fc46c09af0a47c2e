use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Decoder;
use tracing::{debug, error, warn};

use crate::codec::ReplyCodec;
use crate::command::{Command, ReplySink};
use crate::reply::Reply;
use crate::subscriptions::Subscriptions;
use crate::{Error, Result};

/// Invoked once when the driver task ends, however it ends.
pub type CloseHandler = Box<dyn FnOnce() + Send>;

const READ_CHUNK: usize = 4096;

enum Outbound {
    Write(Command),
    Close(oneshot::Sender<()>),
}

/// Handle to one TCP connection. All socket I/O, parsing, and dispatch run
/// on a single spawned driver task; the handle just feeds it.
pub struct Connection {
    driver: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Establish the socket and start the driver task.
    pub async fn connect(
        host: &str,
        port: u16,
        subscriptions: Arc<Subscriptions>,
        on_close: CloseHandler,
    ) -> Result<Connection> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|err| Error::Connect(err.to_string()))?;
        let (reader, writer) = stream.into_split();

        let (driver, outbound) = mpsc::unbounded_channel();
        tokio::spawn(run_driver(reader, writer, outbound, subscriptions, on_close));

        Ok(Connection { driver })
    }

    /// Queue a command for writing. Write order is call order. Returns the
    /// command when the driver is already gone so the caller can fail its
    /// sink (or retry on a fresh connection).
    pub fn send(&self, command: Command) -> std::result::Result<(), Command> {
        self.driver
            .send(Outbound::Write(command))
            .map_err(|rejected| match rejected.0 {
                Outbound::Write(command) => command,
                Outbound::Close(_) => unreachable!("send only submits writes"),
            })
    }

    /// Close the socket gracefully. Commands still awaiting replies are
    /// completed with `ConnectionClosed`. Resolves once the driver is done.
    pub async fn disconnect(&self) {
        let (done, finished) = oneshot::channel();
        if self.driver.send(Outbound::Close(done)).is_ok() {
            let _ = finished.await;
        }
    }
}

/// A queue entry: the head of the queue owns the next non-push reply.
struct InFlight {
    remaining: u32,
    sink: ReplySink,
}

async fn run_driver(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    subscriptions: Arc<Subscriptions>,
    on_close: CloseHandler,
) {
    let mut codec = ReplyCodec;
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut pending: VecDeque<InFlight> = VecDeque::new();

    loop {
        // The codec's advance() consumes write capacity that never comes
        // back on its own; with a full buffer, read_buf reports Ok(0) and
        // a healthy peer would look closed.
        buffer.reserve(READ_CHUNK);
        tokio::select! {
            message = outbound.recv() => match message {
                Some(Outbound::Write(command)) => {
                    let frame = command.encode();
                    // Enqueue before the bytes can hit the wire: a reply
                    // must always find its command already pending.
                    pending.push_back(InFlight {
                        remaining: command.expected_replies.max(1),
                        sink: command.sink,
                    });
                    if let Err(err) = writer.write_all(&frame).await {
                        warn!(%err, "socket write failed");
                        break;
                    }
                }
                Some(Outbound::Close(done)) => {
                    let _ = writer.shutdown().await;
                    let _ = done.send(());
                    break;
                }
                // Every handle dropped; nothing more to write.
                None => {
                    let _ = writer.shutdown().await;
                    break;
                }
            },
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => {
                    warn!("connection has been closed by peer");
                    break;
                }
                Ok(_) => {
                    if let Err(err) = drain_replies(&mut codec, &mut buffer, &mut pending, &subscriptions) {
                        error!(%err, "closing connection");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "socket read failed");
                    break;
                }
            },
        }
    }

    // FIFO drain: whatever was in flight fails in send order.
    for entry in pending {
        let _ = entry.sink.send(Err(Error::ConnectionClosed));
    }
    on_close();
}

fn drain_replies(
    codec: &mut ReplyCodec,
    buffer: &mut BytesMut,
    pending: &mut VecDeque<InFlight>,
    subscriptions: &Subscriptions,
) -> Result<()> {
    while let Some(reply) = codec.decode(buffer)? {
        dispatch(reply, pending, subscriptions);
    }
    Ok(())
}

/// Route one reply: server pushes go to the subscription registry, anything
/// else pays down the head of the pending queue.
fn dispatch(reply: Reply, pending: &mut VecDeque<InFlight>, subscriptions: &Subscriptions) {
    if let Some(push) = Push::classify(&reply) {
        let delivered = match &push {
            Push::Message { channel, parts } => subscriptions.dispatch_channel(channel, parts),
            Push::PatternMessage { pattern, parts } => {
                subscriptions.dispatch_pattern(pattern, parts)
            }
        };
        if !delivered {
            debug!(?push, "discarding push without a registered handler");
        }
        return;
    }

    let finished = match pending.front_mut() {
        Some(entry) => {
            entry.remaining -= 1;
            entry.remaining == 0
        }
        None => {
            debug!(?reply, "reply with no command in flight");
            return;
        }
    };

    if finished {
        if let Some(entry) = pending.pop_front() {
            // The final confirmation resolves the sink; the receiver may
            // have given up waiting, which is fine.
            let _ = entry.sink.send(Ok(reply));
        }
    }
}

enum Push<'a> {
    Message {
        channel: String,
        parts: &'a [Reply],
    },
    PatternMessage {
        pattern: String,
        parts: &'a [Reply],
    },
}

impl<'a> Push<'a> {
    /// `["message", channel, payload]` and
    /// `["pmessage", pattern, channel, payload]` are unsolicited pushes;
    /// everything else belongs to the pending queue.
    fn classify(reply: &'a Reply) -> Option<Push<'a>> {
        let Reply::Array(Some(parts)) = reply else {
            return None;
        };
        let kind = parts.first()?.as_text()?;
        match (kind.as_str(), parts.len()) {
            ("message", 3) => Some(Push::Message {
                channel: parts[1].as_text()?,
                parts,
            }),
            ("pmessage", 4) => Some(Push::PatternMessage {
                pattern: parts[1].as_text()?,
                parts,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Push<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Push::Message { channel, .. } => write!(f, "message on {:?}", channel),
            Push::PatternMessage { pattern, .. } => write!(f, "pmessage for {:?}", pattern),
        }
    }
}
