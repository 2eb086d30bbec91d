//! Integration tests for the WebSocket transport.
//!
//! These spin up a real [`WebSocketListener`] and a tokio-tungstenite
//! client to verify that frames actually cross the network in both
//! directions, and that a clean close surfaces as `Ok(None)`.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use novachess_transport::{Link, Listener, WebSocketLink, WebSocketListener};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a listener on an ephemeral port and connects one client to
    /// it, returning both ends.
    async fn connected_pair() -> (WebSocketLink, ClientWs) {
        let mut listener = WebSocketListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have a local addr");

        let accept = tokio::spawn(async move {
            listener.accept().await.expect("should accept")
        });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let link = accept.await.expect("accept task should complete");
        (link, client)
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive_round_trip() {
        let (link, mut client) = connected_pair().await;
        assert!(link.id().into_inner() > 0);

        // --- Server sends, client receives (as a Text frame) ---
        link.send(b"hello from server")
            .await
            .expect("send should succeed");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        // --- Client sends Text, server receives ---
        client
            .send(Message::text("hello from client"))
            .await
            .unwrap();
        let received = link
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        link.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_accepts_binary_frames() {
        let (link, mut client) = connected_pair().await;

        client
            .send(Message::Binary(b"raw bytes".to_vec().into()))
            .await
            .unwrap();

        let received = link.recv().await.unwrap().unwrap();
        assert_eq!(received, b"raw bytes");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (link, mut client) = connected_pair().await;

        client.send(Message::Close(None)).await.unwrap();

        let result = link.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on clean close");
    }

    #[tokio::test]
    async fn test_websocket_accepted_links_get_distinct_ids() {
        let (first, _client_a) = connected_pair().await;
        let (second, _client_b) = connected_pair().await;

        assert_ne!(first.id(), second.id());
    }
}
