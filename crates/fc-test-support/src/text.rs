//! Mock text (WebSocket) dialect service endpoint (spec §4.A, §4.F).

use fc_protocol::codec::text::encode_text;
use fc_protocol::{Decoder, FcType, Packet, TextCodec};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

/// Binds a WebSocket listener at the service's fixed `/fcsl` path equivalent
/// — tests dial the bound address directly rather than going through
/// `serverconfig::resolve`, so the path itself is irrelevant here.
pub struct MockTextServer {
    listener: TcpListener,
}

impl MockTextServer {
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("bound listener has a local addr")
    }

    /// Accept the next client connection and complete the WebSocket
    /// handshake.
    pub async fn accept(&self) -> std::io::Result<MockTextConn> {
        let (stream, _peer) = self.listener.accept().await?;
        let ws = accept_async(stream)
            .await
            .expect("mock server WebSocket handshake failed");
        Ok(MockTextConn { ws, codec: TextCodec::new() })
    }
}

/// One accepted WebSocket connection.
pub struct MockTextConn {
    ws: WebSocketStream<TcpStream>,
    codec: TextCodec,
}

impl MockTextConn {
    /// Read and discard the client's `hello fcserver` greeting sent right
    /// after the WebSocket opens (spec §4.F, "Pending → Active").
    pub async fn recv_hello(&mut self) -> std::io::Result<()> {
        if let Some(Ok(Message::Text(_))) = self.ws.next().await {
            return Ok(());
        }
        Ok(())
    }

    /// Read the next decoded packet the client sent. Returns `Ok(None)` once
    /// the client closes the connection.
    pub async fn recv(&mut self) -> std::io::Result<Option<Packet>> {
        loop {
            if let Some(packet) = self
                .codec
                .decode_next()
                .expect("mock server received a malformed text frame")
            {
                return Ok(Some(packet));
            }
            match self.ws.next().await {
                Some(Ok(Message::Text(t))) => self.codec.feed(t.as_bytes()),
                Some(Ok(Message::Binary(b))) => self.codec.feed(&b),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(_)) => return Ok(None),
            }
        }
    }

    /// Send one frame down to the client, carrying the service's own 4-digit
    /// length tag ahead of the body (spec §4.A, "Text dialect") — the
    /// client's own encoder omits this prefix on *outbound* frames since the
    /// WebSocket message boundary already delimits those, but the decoder on
    /// the receiving end always expects it.
    pub async fn send(
        &mut self,
        fc_type: FcType,
        n_from: i32,
        n_to: i32,
        n_arg1: i32,
        n_arg2: i32,
        payload: Option<&str>,
    ) -> std::io::Result<()> {
        let body = encode_text(fc_type, n_from, n_to, n_arg1, n_arg2, payload);
        let framed = format!("{:04}{body}", body.len());
        self.ws
            .send(Message::Text(framed.into()))
            .await
            .map_err(std::io::Error::other)
    }

    /// Convenience for the most common scripted response: a successful
    /// LOGIN ack assigning `session_id`/`uid`/`username` (spec §4.E, LOGIN).
    pub async fn send_login_ack(
        &mut self,
        session_id: i32,
        uid: i32,
        username: &str,
    ) -> std::io::Result<()> {
        self.send(FcType::Login, 0, session_id, 0, uid, Some(username)).await
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
