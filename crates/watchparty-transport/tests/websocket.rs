//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with both a raw `tokio-tungstenite` client and our own
//! [`ClientConnection`].

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use watchparty_transport::{
        ClientConnection, Connection, Transport, WebSocketTransport,
    };

    async fn bind_random() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    async fn connect_client(
        addr: &str,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_random().await;
        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");
        assert!(server_conn.id().into_inner() > 0);

        // JSON is UTF-8, so it should arrive as a text frame.
        server_conn
            .send(br#"{"type":"heartbeat-ack"}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "expected a text frame, got {msg:?}");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"type":"heartbeat-ack"}"#);

        client_ws
            .send(Message::text("hello from client".to_string()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_non_utf8_goes_out_as_binary() {
        let (mut transport, addr) = bind_random().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        server_conn.send(&[0xff, 0xfe, 0x00]).await.unwrap();
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_binary());
        assert_eq!(msg.into_data().as_ref(), &[0xff, 0xfe, 0x00]);
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_random().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_pending_recv() {
        let (mut transport, addr) = bind_random().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = Arc::new(server_handle.await.unwrap());

        // Park a reader on the connection; nothing is coming in.
        let reader = Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server_conn.send(b"ping"))
            .await
            .expect("send must not wait for the reader")
            .unwrap();
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");

        pending.abort();
    }

    #[tokio::test]
    async fn test_client_connection_round_trip() {
        let (mut transport, addr) = bind_random().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });

        let client = ClientConnection::connect(&format!("ws://{addr}"))
            .await
            .expect("client should dial");
        let server_conn = server_handle.await.unwrap();
        assert_ne!(client.id(), server_conn.id());

        client.send(b"from client").await.unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"from client");

        server_conn.send(b"from server").await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"from server");
    }

    #[tokio::test]
    async fn test_websocket_ping_counts_as_activity() {
        let (mut transport, addr) = bind_random().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = Arc::new(server_handle.await.unwrap());
        let opened = server_conn.last_activity();

        let reader = Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        client_ws.send(Message::Ping(Vec::new().into())).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while server_conn.last_activity() == opened {
            assert!(
                tokio::time::Instant::now() < deadline,
                "ping was not recorded"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(server_conn.last_activity() > opened);
        assert!(!pending.is_finished(), "ping must not surface as a frame");

        pending.abort();
    }

    #[tokio::test]
    async fn test_client_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let (transport, addr) = bind_random().await;
        drop(transport);

        let result = ClientConnection::connect(&format!("ws://{addr}")).await;
        assert!(result.is_err());
    }
}
