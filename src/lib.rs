//! Asynchronous Redis client over a single pipelined connection.
//!
//! Request/reply traffic and server-pushed pub/sub messages share one
//! socket: replies resolve in-flight commands in strict FIFO order, while
//! `message`/`pmessage` pushes are routed to a [`NotificationSink`] under
//! `"{address}.{channel}"` addresses.
//!
//! ```no_run
//! use std::sync::Arc;
//! use redbus::{args, Client, Config, EventBus};
//!
//! # async fn run() -> redbus::Result<()> {
//! let bus = Arc::new(EventBus::new());
//! let client = Client::new(Config::default(), bus.clone());
//!
//! client.send_void("set", args!["greeting", "hello"]).await?;
//! let value = client.send_text("get", args!["greeting"]).await?;
//! assert_eq!(value.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod reply;
pub mod response;
pub mod subscriptions;

pub use bus::{EventBus, NotificationSink};
pub use client::Client;
pub use command::ToArg;
pub use config::Config;
pub use error::{Error, Result};
pub use reply::Reply;
pub use response::ReturnKind;
