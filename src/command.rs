use bytes::Bytes;
use tokio::sync::oneshot;

use crate::reply::Reply;
use crate::Result;

static CRLF: &[u8; 2] = b"\r\n";

/// Completion side of a command: resolved exactly once, with the final
/// reply or an error. The caller awaits the paired receiver, so completion
/// lands back on the caller's task.
pub type ReplySink = oneshot::Sender<Result<Reply>>;

/// An outbound request: written once, then parked in the connection's
/// pending queue until all expected replies have arrived.
#[derive(Debug)]
pub struct Command {
    pub verb: String,
    pub args: Vec<Bytes>,
    /// How many protocol replies complete this command. 1 for everything
    /// except the subscribe/unsubscribe family.
    pub expected_replies: u32,
    pub sink: ReplySink,
}

impl Command {
    pub fn new(verb: impl Into<String>, args: Vec<Bytes>, sink: ReplySink) -> Command {
        Command {
            verb: verb.into(),
            args,
            expected_replies: 1,
            sink,
        }
    }

    /// RESP request frame: an array of bulk strings, verb first.
    pub fn encode(&self) -> Vec<u8> {
        let count = (self.args.len() + 1).to_string();
        let mut bytes = Vec::with_capacity(16 + self.verb.len());
        bytes.push(b'*');
        bytes.extend_from_slice(count.as_bytes());
        bytes.extend_from_slice(CRLF);
        write_bulk(&mut bytes, self.verb.as_bytes());
        for arg in &self.args {
            write_bulk(&mut bytes, arg);
        }
        bytes
    }
}

fn write_bulk(bytes: &mut Vec<u8>, data: &[u8]) {
    let length = data.len().to_string();
    bytes.push(b'$');
    bytes.extend_from_slice(length.as_bytes());
    bytes.extend_from_slice(CRLF);
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(CRLF);
}

/// Conversion of command arguments to wire bytes. Numbers render base-10.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

/// Build an argument vector for [`Client::send`](crate::Client::send):
/// `args!["key", 42i64]`.
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::new()
    };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::command::ToArg::to_arg(&$arg)),+]
    };
}
