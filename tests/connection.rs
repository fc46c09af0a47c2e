mod common;

use std::sync::Arc;

use bytes::Bytes;
use redbus::{args, Client, Config, Error, EventBus, Reply};

use common::{expect_request, reply, spawn_server, ServerOp};

fn test_client(port: u16) -> (Client, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let config = Config {
        host: "127.0.0.1".to_string(),
        port,
        ..Config::default()
    };
    (Client::new(config, bus.clone()), bus)
}

#[tokio::test]
async fn pipelined_replies_resolve_in_send_order() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(
            &mut requests,
            b"*2\r\n$3\r\nget\r\n$1\r\na\r\n\
              *2\r\n$3\r\nget\r\n$1\r\nb\r\n\
              *2\r\n$3\r\nget\r\n$1\r\nc\r\n",
        )
        .await;
        reply(&script, b"$5\r\nfirst\r\n");
        reply(&script, b"$6\r\nsecond\r\n");
        reply(&script, b"$5\r\nthird\r\n");
    };

    let (a, b, c, _) = tokio::join!(
        client.send_text("get", args!["a"]),
        client.send_text("get", args!["b"]),
        client.send_text("get", args!["c"]),
        feed,
    );

    assert_eq!(a.unwrap().as_deref(), Some("first"));
    assert_eq!(b.unwrap().as_deref(), Some("second"));
    assert_eq!(c.unwrap().as_deref(), Some("third"));
}

#[tokio::test]
async fn server_error_only_affects_its_own_command() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(
            &mut requests,
            b"*3\r\n$3\r\nset\r\n$1\r\na\r\n$1\r\n1\r\n\
              *3\r\n$3\r\nset\r\n$1\r\nb\r\n$1\r\n2\r\n\
              *1\r\n$4\r\nexec\r\n",
        )
        .await;
        reply(&script, b"+OK\r\n");
        reply(&script, b"-ERR something went wrong\r\n");
        reply(&script, b"+OK\r\n");
    };

    let (a, b, c, _) = tokio::join!(
        client.send_text("set", args!["a", "1"]),
        client.send_text("set", args!["b", "2"]),
        client.send_text("exec", args![]),
        feed,
    );

    assert_eq!(a.unwrap().as_deref(), Some("OK"));
    assert_eq!(
        b.unwrap_err(),
        Error::Server("ERR something went wrong".to_string())
    );
    assert_eq!(c.unwrap().as_deref(), Some("OK"));
}

#[tokio::test]
async fn unsolicited_push_does_not_consume_a_pending_reply() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(&mut requests, b"*2\r\n$3\r\nget\r\n$1\r\nk\r\n").await;
        // A push for a channel nobody subscribed to, then the real reply.
        reply(
            &script,
            b"*3\r\n$7\r\nmessage\r\n$6\r\norphan\r\n$2\r\nhi\r\n",
        );
        reply(&script, b"$5\r\nvalue\r\n");
    };

    let (value, _) = tokio::join!(client.send_text("get", args!["k"]), feed);
    assert_eq!(value.unwrap().as_deref(), Some("value"));
}

#[tokio::test]
async fn peer_close_fails_every_pending_command() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(
            &mut requests,
            b"*2\r\n$3\r\nget\r\n$1\r\na\r\n*2\r\n$3\r\nget\r\n$1\r\nb\r\n",
        )
        .await;
        script.send(ServerOp::Close).unwrap();
    };

    let (a, b, _) = tokio::join!(
        client.send_text("get", args!["a"]),
        client.send_text("get", args!["b"]),
        feed,
    );

    assert_eq!(a.unwrap_err(), Error::ConnectionClosed);
    assert_eq!(b.unwrap_err(), Error::ConnectionClosed);
}

#[tokio::test]
async fn sends_after_peer_close_reconnect_lazily() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(&mut requests, b"*2\r\n$3\r\nget\r\n$1\r\na\r\n").await;
        script.send(ServerOp::Close).unwrap();
    };
    let (lost, _) = tokio::join!(client.send_text("get", args!["a"]), feed);
    assert_eq!(lost.unwrap_err(), Error::ConnectionClosed);

    // The next send connects again, on the same script channel.
    let feed = async {
        expect_request(&mut requests, b"*2\r\n$3\r\nget\r\n$1\r\nb\r\n").await;
        reply(&script, b"$5\r\nfresh\r\n");
    };
    let (value, _) = tokio::join!(client.send_text("get", args!["b"]), feed);
    assert_eq!(value.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn undecodable_bytes_close_the_connection() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(&mut requests, b"*2\r\n$3\r\nget\r\n$1\r\nk\r\n").await;
        reply(&script, b"!this is not resp\r\n");
    };

    let (value, _) = tokio::join!(client.send_text("get", args!["k"]), feed);
    assert_eq!(value.unwrap_err(), Error::ConnectionClosed);
}

#[tokio::test]
async fn long_lived_connection_survives_large_cumulative_traffic() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    // Total reply volume well past any single read-buffer allocation; a
    // driver that lets its buffer capacity run dry would misread the full
    // buffer as a peer close partway through.
    let payload = "x".repeat(512);
    for i in 0..20 {
        let key = format!("k{i}");
        let feed = async {
            let expected = format!("*2\r\n$3\r\nget\r\n${}\r\n{}\r\n", key.len(), key);
            expect_request(&mut requests, expected.as_bytes()).await;
            let frame = Reply::Bulk(Some(Bytes::from(payload.clone()))).encode();
            reply(&script, &frame);
        };
        let (value, _) = tokio::join!(client.send_text("get", args![key.as_str()]), feed);
        assert_eq!(value.unwrap().as_deref(), Some(payload.as_str()));
    }
}

#[tokio::test]
async fn replies_split_across_reads_are_reassembled() {
    let (port, script, mut requests) = spawn_server().await;
    let (client, _bus) = test_client(port);

    let feed = async {
        expect_request(&mut requests, b"*2\r\n$3\r\nget\r\n$1\r\nk\r\n").await;
        // One bulk reply dribbled out in three writes.
        reply(&script, b"$11\r\nhel");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        reply(&script, b"lo wo");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        reply(&script, b"rld\r\n");
    };

    let (value, _) = tokio::join!(client.send_text("get", args!["k"]), feed);
    assert_eq!(value.unwrap().as_deref(), Some("hello world"));
}
