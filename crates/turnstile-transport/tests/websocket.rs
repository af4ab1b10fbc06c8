//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener and a tokio-tungstenite client to verify
//! that frames flow in both directions and that `send` is not blocked by
//! a pending `recv`.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use turnstile_transport::{Connection, Transport, WebSocketTransport};

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    /// Binds to an OS-assigned port and returns the transport with its address.
    async fn bind_any() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_any().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);

        // Server → client goes out as a text frame.
        server_conn
            .send(br#"{"op":"err","message":"hi"}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_data().as_ref(), br#"{"op":"err","message":"hi"}"#);

        // Client → server, text and binary are both accepted.
        client_ws
            .send(Message::Text("from client".into()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().expect("data");
        assert_eq!(received, b"from client");

        client_ws
            .send(Message::Binary(b"raw".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().expect("data");
        assert_eq!(received, b"raw");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending() {
        let (mut transport, addr) = bind_any().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = Arc::new(server_handle.await.unwrap());

        // Park a reader on the connection.
        let reader = {
            let conn = Arc::clone(&server_conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Writing must still go through.
        tokio::time::timeout(Duration::from_secs(1), server_conn.send(b"ping"))
            .await
            .expect("send must not wait for recv")
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");

        client_ws.send(Message::Text("pong".into())).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some(&b"pong"[..]));
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_any().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
