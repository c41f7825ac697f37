//! End-to-end tests of the client against in-process peers.

mod harness;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use harness::{TestServer, echo, next_event, open_pair, open_pair_raw, ws_url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wsengine::connection::Incoming;
use wsengine::protocol::{AssembledMessage, Frame, OpCode};
use wsengine::{
    BinaryData, BinaryType, CloseCode, CloseEvent, CloseFrame, Config, ConnectionState, Data,
    Error, Event, Message, MessageData, Role, WebSocket, WebSocketCodec,
};

fn text(event: Option<Event>) -> String {
    match event {
        Some(Event::Message(MessageData::Text(s))) => s,
        other => panic!("expected a text message, got {other:?}"),
    }
}

fn binary(event: Option<Event>) -> BinaryData {
    match event {
        Some(Event::Message(MessageData::Binary(b))) => b,
        other => panic!("expected a binary message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_text_round_trip_over_tcp() {
    let (server, addr) = TestServer::spawn().await;
    let (ws, mut events) = WebSocket::connect(&ws_url(addr), Config::new()).unwrap();
    assert_eq!(next_event(&mut events).await, Some(Event::Open));
    assert_eq!(ws.ready_state(), ConnectionState::Open);

    ws.send("hello, world").unwrap();
    assert_eq!(text(next_event(&mut events).await), "hello, world");

    // ISO-8859-1 source bytes for "café ñ"
    ws.send(Data::from_latin1(b"caf\xe9 \xf1")).unwrap();
    assert_eq!(text(next_event(&mut events).await), "café ñ");

    let unicode = "Привет, мир! 你好 🎉";
    ws.send(unicode).unwrap();
    let echoed = text(next_event(&mut events).await);
    assert_eq!(echoed, unicode);
    assert_eq!(echoed.as_bytes(), unicode.as_bytes());

    ws.close().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1000, "", true)))
    );
    server.shutdown();
}

#[tokio::test]
async fn test_binary_inputs_are_byte_exact() {
    let (server, addr) = TestServer::spawn().await;
    let (ws, mut events) = WebSocket::connect(&ws_url(addr), Config::new()).unwrap();
    assert_eq!(next_event(&mut events).await, Some(Event::Open));

    let expected: &[u8] = &[0x00, 0xff, 0x80, 0x7f, 0xc3];
    ws.send(expected.to_vec()).unwrap();
    ws.send(BytesMut::from(expected)).unwrap();
    ws.send(Bytes::copy_from_slice(expected)).unwrap();
    ws.send([0x00u8, 0xff, 0x80, 0x7f, 0xc3]).unwrap();
    ws.send(expected).unwrap();

    for _ in 0..5 {
        let data = binary(next_event(&mut events).await);
        assert_eq!(data.binary_type(), BinaryType::Buffer);
        assert_eq!(data.as_slice(), expected);
    }

    ws.terminate();
    server.shutdown();
}

#[tokio::test]
async fn test_ping_pong_payloads_over_tcp() {
    let (server, addr) = TestServer::spawn().await;
    let (ws, mut events) = WebSocket::connect(&ws_url(addr), Config::new()).unwrap();
    assert_eq!(next_event(&mut events).await, Some(Event::Open));

    ws.ping(Data::default()).unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => assert!(data.is_empty()),
        other => panic!("expected pong, got {other:?}"),
    }

    ws.ping("héllo").unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => assert_eq!(data.as_slice(), "héllo".as_bytes()),
        other => panic!("expected pong, got {other:?}"),
    }

    ws.ping(vec![1u8, 2, 3]).unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => assert_eq!(data.as_slice(), &[1, 2, 3]),
        other => panic!("expected pong, got {other:?}"),
    }

    assert!(matches!(
        ws.ping(vec![0u8; 126]),
        Err(Error::ControlFrameTooLarge(126))
    ));
    assert!(matches!(
        ws.pong("x".repeat(200)),
        Err(Error::ControlFrameTooLarge(200))
    ));

    ws.terminate();
    server.shutdown();
}

#[tokio::test]
async fn test_peer_ping_is_answered_and_reported() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;

    peer.send(Message::ping(Vec::new())).await.unwrap();
    match next_event(&mut events).await {
        Some(Event::Ping(data)) => {
            assert!(data.is_empty());
            assert_eq!(data.binary_type(), BinaryType::Buffer);
        }
        other => panic!("expected ping, got {other:?}"),
    }
    assert_eq!(peer.recv().await.unwrap(), Incoming::Pong(Vec::new()));

    ws.set_binary_type(BinaryType::ArrayBuffer);
    peer.send(Message::ping(b"data".to_vec())).await.unwrap();
    match next_event(&mut events).await {
        Some(Event::Ping(data)) => {
            assert_eq!(data, BinaryData::ArrayBuffer(Bytes::from_static(b"data")));
        }
        other => panic!("expected ping, got {other:?}"),
    }
    assert_eq!(peer.recv().await.unwrap(), Incoming::Pong(b"data".to_vec()));

    ws.pong("unsolicited").unwrap();
    assert_eq!(peer.recv().await.unwrap(), Incoming::Pong(b"unsolicited".to_vec()));
    ws.terminate();
}

#[tokio::test]
async fn test_pong_follows_binary_type() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;

    peer.send(Message::pong(b"one".to_vec())).await.unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => {
            assert_eq!(data, BinaryData::Buffer(BytesMut::from(&b"one"[..])));
        }
        other => panic!("expected pong, got {other:?}"),
    }

    ws.set_binary_type(BinaryType::ArrayBuffer);
    peer.send(Message::pong(b"two".to_vec())).await.unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => {
            assert_eq!(data, BinaryData::ArrayBuffer(Bytes::from_static(b"two")));
        }
        other => panic!("expected pong, got {other:?}"),
    }

    peer.send(Message::pong(Vec::new())).await.unwrap();
    match next_event(&mut events).await {
        Some(Event::Pong(data)) => {
            assert!(data.is_empty());
            assert_eq!(data.binary_type(), BinaryType::ArrayBuffer);
        }
        other => panic!("expected pong, got {other:?}"),
    }
    ws.terminate();
}

#[tokio::test]
async fn test_binary_type_controls_materialization() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;
    assert_eq!(ws.binary_type(), BinaryType::Buffer);

    peer.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let data = binary(next_event(&mut events).await);
    assert!(matches!(data, BinaryData::Buffer(_)));

    ws.try_set_binary_type("arraybuffer").unwrap();
    peer.send(Message::binary(vec![4u8, 5, 6])).await.unwrap();
    let data = binary(next_event(&mut events).await);
    assert_eq!(data, BinaryData::ArrayBuffer(Bytes::from_static(&[4, 5, 6])));

    assert!(matches!(
        ws.try_set_binary_type("blob"),
        Err(Error::InvalidBinaryType(name)) if name == "blob"
    ));
    assert!(ws.try_set_binary_type("").is_err());
    assert_eq!(ws.binary_type(), BinaryType::ArrayBuffer);
    ws.terminate();
}

#[tokio::test]
async fn test_event_order_follows_peer() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;

    peer.send(Message::text("first")).await.unwrap();
    peer.send(Message::binary(vec![0xde, 0xad])).await.unwrap();
    peer.send(Message::ping(b"p".to_vec())).await.unwrap();
    peer.send(Message::pong(b"q".to_vec())).await.unwrap();
    peer.send(Message::text("last")).await.unwrap();

    assert_eq!(text(next_event(&mut events).await), "first");
    assert_eq!(binary(next_event(&mut events).await).as_slice(), &[0xde, 0xad]);
    assert!(matches!(next_event(&mut events).await, Some(Event::Ping(p)) if p.as_slice() == b"p"));
    assert!(matches!(next_event(&mut events).await, Some(Event::Pong(p)) if p.as_slice() == b"q"));
    assert_eq!(text(next_event(&mut events).await), "last");
    ws.terminate();
}

#[tokio::test]
async fn test_close_default_is_normal_and_clean() {
    let (ws, mut events, peer) = open_pair(Config::new()).await;
    let peer = tokio::spawn(echo(peer));

    ws.close().unwrap();
    assert_eq!(ws.ready_state(), ConnectionState::Closing);
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1000, "", true)))
    );
    assert_eq!(next_event(&mut events).await, None);
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
    assert_eq!(ws.close_event(), Some(CloseEvent::new(1000, "", true)));

    let seen = peer.await.unwrap();
    assert_eq!(
        seen.last(),
        Some(&Incoming::Close(Some(CloseFrame::new(CloseCode::Normal, ""))))
    );
}

#[tokio::test]
async fn test_close_with_code_and_reason() {
    let (ws, mut events, peer) = open_pair(Config::new()).await;
    let peer = tokio::spawn(echo(peer));

    ws.close_with(1001, "going away").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1001, "going away", true)))
    );
    let seen = peer.await.unwrap();
    assert_eq!(
        seen.last(),
        Some(&Incoming::Close(Some(CloseFrame::new(
            CloseCode::GoingAway,
            "going away"
        ))))
    );
}

#[tokio::test]
async fn test_close_without_status() {
    let (ws, mut events, peer) = open_pair(Config::new()).await;
    let peer = tokio::spawn(echo(peer));

    ws.close_with_code(None).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1005, "", true)))
    );
    assert_eq!(peer.await.unwrap().last(), Some(&Incoming::Close(None)));
}

#[tokio::test]
async fn test_peer_initiated_close() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;

    peer.close(Some(CloseFrame::new(CloseCode::Other(4000), "bye")))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(4000, "bye", true)))
    );
    assert_eq!(ws.ready_state(), ConnectionState::Closed);

    assert_eq!(
        peer.recv().await.unwrap(),
        Incoming::Close(Some(CloseFrame::new(CloseCode::Other(4000), "")))
    );
}

#[tokio::test]
async fn test_terminate_after_open() {
    let (ws, mut events, mut peer) = open_pair(Config::new()).await;

    ws.terminate();
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(next_event(&mut events).await, None);
    assert!(matches!(peer.recv().await, Err(Error::ConnectionClosed(None))));

    ws.terminate();
    ws.close().unwrap();
    assert_eq!(ws.close_event(), Some(CloseEvent::abnormal()));
}

#[tokio::test]
async fn test_calls_after_close_are_silent() {
    let config = Config::new().with_close_timeout(Duration::from_millis(100));
    let (ws, mut events, _peer) = open_pair_raw(config).await;

    ws.close().unwrap();
    assert_eq!(ws.ready_state(), ConnectionState::Closing);
    ws.send("ignored").unwrap();
    ws.ping(Data::default()).unwrap();
    ws.pong(Data::default()).unwrap();
    ws.close_with(4001, "again").unwrap();

    assert_eq!(next_event(&mut events).await, Some(Event::Error(Error::CloseTimeout)));
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(next_event(&mut events).await, None);

    ws.send("still ignored").unwrap();
    ws.ping(vec![1u8]).unwrap();
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let (client_io, _server_io) = tokio::io::duplex(4096);
    let config = Config::new().with_handshake_timeout(Duration::from_millis(50));
    let (ws, mut events) = WebSocket::with_stream("ws://localhost/", client_io, config).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Error(Error::HandshakeTimeout))
    );
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(next_event(&mut events).await, None);
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_handshake_rejected() {
    let (client_io, mut server_io) = tokio::io::duplex(4096);
    let (ws, mut events) =
        WebSocket::with_stream("ws://localhost/", client_io, Config::new()).unwrap();

    let mut buf = [0u8; 1024];
    let n = server_io.read(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"GET / HTTP/1.1\r\n"));
    server_io
        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        Some(Event::Error(Error::InvalidHandshake(_)))
    ));
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_ws, mut events) = WebSocket::connect(&ws_url(addr), Config::new()).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        Some(Event::Error(Error::Io(_)))
    ));
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
}

#[tokio::test]
async fn test_subprotocol_negotiation() {
    let config = Config::new().with_protocols(["chat", "superchat"]);
    let (ws, _events, _peer) = open_pair(config).await;
    assert_eq!(ws.protocol(), "chat");
    ws.terminate();
}

#[tokio::test]
async fn test_masked_server_frame_closes_with_1002() {
    let (ws, mut events, mut peer) = open_pair_raw(Config::new()).await;

    // masked TEXT "x"
    peer.write_all(&[0x81, 0x81, 0x01, 0x02, 0x03, 0x04, b'x' ^ 0x01])
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Error(Error::MaskedServerFrame))
    );
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1002, "", false)))
    );
    assert_eq!(ws.ready_state(), ConnectionState::Closed);

    let mut codec = WebSocketCodec::new(peer, Role::Server, &Config::new());
    assert_eq!(codec.read_frame().await.unwrap(), Frame::close(Some(1002), ""));
}

#[tokio::test]
async fn test_invalid_utf8_closes_with_1007() {
    let (_ws, mut events, peer) = open_pair_raw(Config::new()).await;
    let mut codec = WebSocketCodec::new(peer, Role::Server, &Config::new());

    codec.write_frame(&Frame::text(vec![0xc3, 0x28])).await.unwrap();
    codec.flush().await.unwrap();

    assert_eq!(next_event(&mut events).await, Some(Event::Error(Error::InvalidUtf8)));
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1007, "", false)))
    );
    assert_eq!(codec.read_frame().await.unwrap(), Frame::close(Some(1007), ""));
}

#[tokio::test]
async fn test_outgoing_messages_are_fragmented() {
    let (ws, _events, peer) = open_pair_raw(Config::new().with_fragment_size(4)).await;
    let mut codec = WebSocketCodec::new(peer, Role::Server, &Config::new());

    ws.send("abcdefghij").unwrap();

    let first = codec.read_frame().await.unwrap();
    assert_eq!((first.opcode, first.fin), (OpCode::Text, false));
    assert_eq!(first.payload(), b"abcd");
    let second = codec.read_frame().await.unwrap();
    assert_eq!((second.opcode, second.fin), (OpCode::Continuation, false));
    assert_eq!(second.payload(), b"efgh");
    let last = codec.read_frame().await.unwrap();
    assert_eq!((last.opcode, last.fin), (OpCode::Continuation, true));
    assert_eq!(last.payload(), b"ij");
    ws.terminate();
}

#[tokio::test]
async fn test_incoming_fragments_are_reassembled() {
    let (ws, mut events, peer) = open_pair_raw(Config::new()).await;
    let mut codec = WebSocketCodec::new(peer, Role::Server, &Config::new());

    let utf8 = "héllo wörld".as_bytes();
    codec.write_frame(&Frame::new(false, OpCode::Text, utf8[..2].to_vec())).await.unwrap();
    codec.write_frame(&Frame::ping(b"mid".to_vec())).await.unwrap();
    codec
        .write_frame(&Frame::new(false, OpCode::Continuation, utf8[2..9].to_vec()))
        .await
        .unwrap();
    codec
        .write_frame(&Frame::new(true, OpCode::Continuation, utf8[9..].to_vec()))
        .await
        .unwrap();
    codec.flush().await.unwrap();

    assert!(matches!(next_event(&mut events).await, Some(Event::Ping(p)) if p.as_slice() == b"mid"));
    assert_eq!(text(next_event(&mut events).await), "héllo wörld");
    assert_eq!(codec.read_frame().await.unwrap(), Frame::pong(b"mid".to_vec()));
    ws.terminate();
}

#[tokio::test]
async fn test_peer_eof_is_abnormal() {
    let (ws, mut events, peer) = open_pair(Config::new()).await;
    drop(peer);

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_data_after_local_close_is_delivered() {
    let (ws, mut events, peer) = open_pair_raw(Config::new()).await;
    let mut codec = WebSocketCodec::new(peer, Role::Server, &Config::new());

    ws.close().unwrap();
    assert_eq!(codec.read_frame().await.unwrap(), Frame::close(Some(1000), ""));
    codec.write_frame(&Frame::text(b"late".to_vec())).await.unwrap();
    codec.write_frame(&Frame::close(Some(1000), "")).await.unwrap();
    codec.flush().await.unwrap();

    assert_eq!(text(next_event(&mut events).await), "late");
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::new(1000, "", true)))
    );
}

#[tokio::test]
async fn test_message_received_as_assembled() {
    let (ws, _events, mut peer) = open_pair(Config::new()).await;
    ws.send(vec![9u8; 70_000]).unwrap();
    assert_eq!(
        peer.recv().await.unwrap(),
        Incoming::Message(AssembledMessage::Binary(vec![9u8; 70_000]))
    );
    ws.terminate();
}

#[tokio::test]
async fn test_close_times_out_behind_stalled_write() {
    let config = Config::new().with_close_timeout(Duration::from_millis(100));
    let (ws, mut events, _peer) = open_pair_raw(config).await;

    // the peer never reads, so this fills the pipe and the write stalls
    ws.send(vec![0u8; 1024 * 1024]).unwrap();
    ws.close().unwrap();

    assert_eq!(next_event(&mut events).await, Some(Event::Error(Error::CloseTimeout)));
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );
    assert_eq!(next_event(&mut events).await, None);
    assert_eq!(ws.ready_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_terminate_releases_stalled_transport() {
    let (ws, mut events, mut peer) = open_pair_raw(Config::new()).await;

    ws.send(vec![0u8; 1024 * 1024]).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    ws.terminate();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Close(CloseEvent::abnormal()))
    );

    let severed = tokio::time::timeout(Duration::from_secs(5), async {
        while peer.write_all(b"x").await.is_ok() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(severed.is_ok(), "client end of the transport is still alive");
}
