//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket server and client to verify that
//! packets actually flow over the network, one binary message per packet.

#[cfg(feature = "websocket")]
mod websocket {
    use duelhall_transport::{
        Connection, FrameReader, FrameWriter, Transport, TransportError, WebSocketTransport,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn pair() -> (ClientWs, <WebSocketTransport as Transport>::Connection) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have address");
        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        (client, server.await.expect("task should complete"))
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut client, server) = pair().await;
        assert!(server.id().into_inner() > 0);
        let (mut reader, mut writer) = server.into_split();

        // --- Server sends, client receives ---
        writer.send(&[1, 0, 0x15]).await.expect("send should succeed");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), &[1, 0, 0x15]);

        // --- Client sends, server receives ---
        client
            .send(Message::Binary(vec![2, 0, 0x24, 1].into()))
            .await
            .unwrap();
        let received = reader
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, vec![2, 0, 0x24, 1]);

        writer.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_rejects_length_mismatch() {
        let (mut client, server) = pair().await;
        let (mut reader, _writer) = server.into_split();

        // Header declares 3 body bytes but only 1 follows.
        client
            .send(Message::Binary(vec![4, 0, 0x16, 0].into()))
            .await
            .unwrap();
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut client, server) = pair().await;
        let (mut reader, _writer) = server.into_split();

        client.send(Message::Close(None)).await.unwrap();
        let result = reader.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
