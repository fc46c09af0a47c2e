use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::warn;

use crate::bus::NotificationSink;
use crate::command::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::reply::Reply;
use crate::response::{project, ReturnKind, Transform};
use crate::subscriptions::{PushHandler, Subscriptions};
use crate::{Error, Result};

/// Asynchronous client over one long-lived connection. Cheap to clone;
/// clones share the connection, the subscription registry, and the
/// notification sink.
///
/// Commands may be issued before any connection exists: they are buffered
/// and written, in order, once the lazily-initiated connect succeeds.
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    subscriptions: Arc<Subscriptions>,
    sink: Arc<dyn NotificationSink>,
    state: Arc<Mutex<ClientState>>,
    generation: Arc<AtomicU64>,
}

enum ClientState {
    Disconnected,
    Connecting(ConnectAttempt),
    Connected {
        generation: u64,
        connection: Connection,
    },
}

/// One in-flight connect. The generation ties async completions (connect
/// resolution, close notification) back to the attempt that spawned them,
/// so a stale completion cannot clobber a newer connection.
struct ConnectAttempt {
    generation: u64,
    buffered: Vec<Command>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Client {
    pub fn new(config: Config, sink: Arc<dyn NotificationSink>) -> Client {
        config.warn_unsupported();
        Client {
            config: Arc::new(config),
            subscriptions: Arc::new(Subscriptions::new()),
            sink,
            state: Arc::new(Mutex::new(ClientState::Disconnected)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Connect eagerly. Resolves once the socket is up, or with the
    /// connect error. A no-op when already connected.
    pub async fn start(&self) -> Result<()> {
        let (ready, initiated) = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                ClientState::Connected { .. } => return Ok(()),
                ClientState::Connecting(attempt) => {
                    let (tx, rx) = oneshot::channel();
                    attempt.waiters.push(tx);
                    (rx, None)
                }
                ClientState::Disconnected => {
                    let (tx, rx) = oneshot::channel();
                    let generation = self.next_generation();
                    *state = ClientState::Connecting(ConnectAttempt {
                        generation,
                        buffered: Vec::new(),
                        waiters: vec![tx],
                    });
                    (rx, Some(generation))
                }
            }
        };
        if let Some(generation) = initiated {
            self.spawn_connect(generation);
        }
        ready.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Disconnect gracefully. Succeeds immediately when never connected.
    /// Commands buffered behind an unfinished connect fail with
    /// `ConnectionClosed`.
    pub async fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut *state, ClientState::Disconnected)
        };
        match previous {
            ClientState::Connected { connection, .. } => connection.disconnect().await,
            ClientState::Connecting(attempt) => {
                for command in attempt.buffered {
                    let _ = command.sink.send(Err(Error::ConnectionClosed));
                }
                for waiter in attempt.waiters {
                    let _ = waiter.send(Err(Error::ConnectionClosed));
                }
            }
            ClientState::Disconnected => {}
        }
        Ok(())
    }

    /// Issue one command and shape its reply to `kind`. This is the single
    /// entry point every per-verb wrapper funnels through.
    pub async fn send(&self, verb: &str, args: Vec<Bytes>, kind: ReturnKind) -> Result<Value> {
        let transform = Transform::for_verb(verb);
        let (sink, completion) = oneshot::channel();
        let mut command = Command::new(verb, args, sink);
        self.apply_subscription_accounting(&mut command)?;
        self.dispatch(command);

        let reply = completion.await.map_err(|_| Error::ConnectionClosed)??;
        project(reply, kind, transform)
    }

    pub async fn send_text(&self, verb: &str, args: Vec<Bytes>) -> Result<Option<String>> {
        match self.send(verb, args, ReturnKind::Text).await? {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Err(Error::Projection(format!("{} is not text", other))),
        }
    }

    pub async fn send_integer(&self, verb: &str, args: Vec<Bytes>) -> Result<i64> {
        match self.send(verb, args, ReturnKind::Integer).await? {
            Value::Number(number) => number
                .as_i64()
                .ok_or_else(|| Error::Projection(format!("{} is not an i64", number))),
            other => Err(Error::Projection(format!("{} is not an integer", other))),
        }
    }

    pub async fn send_void(&self, verb: &str, args: Vec<Bytes>) -> Result<()> {
        self.send(verb, args, ReturnKind::Void).await?;
        Ok(())
    }

    /// JSON array of the reply elements, or JSON null for a null array.
    pub async fn send_list(&self, verb: &str, args: Vec<Bytes>) -> Result<Value> {
        self.send(verb, args, ReturnKind::List).await
    }

    /// JSON object keyed by alternating field/value pairs (or the INFO
    /// section map), or JSON null.
    pub async fn send_map(&self, verb: &str, args: Vec<Bytes>) -> Result<Value> {
        self.send(verb, args, ReturnKind::Map).await
    }

    /// The sink address receiving pushes for `channel` (or a pattern):
    /// `"{config.address}.{channel}"`.
    pub fn notification_address(&self, channel: &str) -> String {
        format!("{}.{}", self.config.address, channel)
    }

    /// The subscribe/unsubscribe family completes after a variable number
    /// of replies, and its handlers must be (de)registered before the
    /// request is written. Getting this wrong would desynchronize the
    /// pending queue and corrupt every later reply.
    fn apply_subscription_accounting(&self, command: &mut Command) -> Result<()> {
        match command.verb.to_ascii_lowercase().as_str() {
            "subscribe" => {
                if command.args.is_empty() {
                    return Err(Error::Usage("at least one channel is required".to_string()));
                }
                command.expected_replies = command.args.len() as u32;
                for arg in &command.args {
                    let channel = String::from_utf8_lossy(arg).into_owned();
                    self.subscriptions
                        .register_channel(&channel, self.channel_handler(&channel));
                }
            }
            "psubscribe" => {
                if command.args.is_empty() {
                    return Err(Error::Usage("at least one pattern is required".to_string()));
                }
                command.expected_replies = command.args.len() as u32;
                for arg in &command.args {
                    let pattern = String::from_utf8_lossy(arg).into_owned();
                    self.subscriptions
                        .register_pattern(&pattern, self.pattern_handler(&pattern));
                }
            }
            "unsubscribe" => {
                if command.args.is_empty() {
                    // The server acknowledges a bare unsubscribe even with
                    // nothing subscribed, hence the floor of one.
                    command.expected_replies = self.subscriptions.channel_size().max(1) as u32;
                    self.subscriptions.unregister_channel(None);
                } else {
                    command.expected_replies = command.args.len() as u32;
                    for arg in &command.args {
                        let channel = String::from_utf8_lossy(arg);
                        self.subscriptions.unregister_channel(Some(&channel));
                    }
                }
            }
            "punsubscribe" => {
                if command.args.is_empty() {
                    command.expected_replies = self.subscriptions.pattern_size().max(1) as u32;
                    self.subscriptions.unregister_pattern(None);
                } else {
                    command.expected_replies = command.args.len() as u32;
                    for arg in &command.args {
                        let pattern = String::from_utf8_lossy(arg);
                        self.subscriptions.unregister_pattern(Some(&pattern));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ["message", channel, payload]
    fn channel_handler(&self, channel: &str) -> PushHandler {
        let address = self.notification_address(channel);
        let channel = channel.to_string();
        let sink = Arc::clone(&self.sink);
        Box::new(move |parts| {
            let Some(message) = parts.get(2).and_then(Reply::as_text) else {
                return;
            };
            sink.publish(
                &address,
                json!({
                    "status": "ok",
                    "value": { "channel": channel, "message": message },
                }),
            );
        })
    }

    // ["pmessage", pattern, channel, payload]
    fn pattern_handler(&self, pattern: &str) -> PushHandler {
        let address = self.notification_address(pattern);
        let pattern = pattern.to_string();
        let sink = Arc::clone(&self.sink);
        Box::new(move |parts| {
            let Some(channel) = parts.get(2).and_then(Reply::as_text) else {
                return;
            };
            let Some(message) = parts.get(3).and_then(Reply::as_text) else {
                return;
            };
            sink.publish(
                &address,
                json!({
                    "status": "ok",
                    "value": { "pattern": pattern, "channel": channel, "message": message },
                }),
            );
        })
    }

    /// Hand a command to the live connection, or buffer it and kick off a
    /// lazy connect.
    fn dispatch(&self, command: Command) {
        let initiated = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                ClientState::Connected { connection, .. } => match connection.send(command) {
                    Ok(()) => None,
                    // Driver is gone but its close notification has not
                    // landed yet; reconnect with this command first in line.
                    Err(command) => {
                        let generation = self.next_generation();
                        *state = ClientState::Connecting(ConnectAttempt {
                            generation,
                            buffered: vec![command],
                            waiters: Vec::new(),
                        });
                        Some(generation)
                    }
                },
                ClientState::Connecting(attempt) => {
                    attempt.buffered.push(command);
                    None
                }
                ClientState::Disconnected => {
                    let generation = self.next_generation();
                    *state = ClientState::Connecting(ConnectAttempt {
                        generation,
                        buffered: vec![command],
                        waiters: Vec::new(),
                    });
                    Some(generation)
                }
            }
        };
        if let Some(generation) = initiated {
            self.spawn_connect(generation);
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn_connect(&self, generation: u64) {
        let client = self.clone();
        tokio::spawn(async move {
            client.run_connect(generation).await;
        });
    }

    async fn run_connect(self, generation: u64) {
        let on_close = {
            let state = Arc::clone(&self.state);
            Box::new(move || {
                let mut state = state.lock().unwrap();
                if matches!(
                    &*state,
                    ClientState::Connected { generation: current, .. } if *current == generation
                ) {
                    warn!("connection has been closed by peer");
                    *state = ClientState::Disconnected;
                }
            })
        };

        let result = Connection::connect(
            &self.config.host,
            self.config.port,
            Arc::clone(&self.subscriptions),
            on_close,
        )
        .await;

        let attempt = {
            let mut state = self.state.lock().unwrap();
            match std::mem::replace(&mut *state, ClientState::Disconnected) {
                ClientState::Connecting(attempt) if attempt.generation == generation => {
                    Some(attempt)
                }
                other => {
                    // A stop or a newer attempt owns the state now; this
                    // connect is an orphan.
                    *state = other;
                    None
                }
            }
        };

        let attempt = match attempt {
            Some(attempt) => attempt,
            None => {
                if let Ok(connection) = result {
                    connection.disconnect().await;
                }
                return;
            }
        };

        match result {
            Ok(connection) => {
                for command in attempt.buffered {
                    if let Err(command) = connection.send(command) {
                        let _ = command.sink.send(Err(Error::ConnectionClosed));
                    }
                }
                {
                    let mut state = self.state.lock().unwrap();
                    *state = ClientState::Connected {
                        generation,
                        connection,
                    };
                }
                for waiter in attempt.waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(err) => {
                for command in attempt.buffered {
                    let _ = command.sink.send(Err(err.clone()));
                }
                for waiter in attempt.waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }
}
