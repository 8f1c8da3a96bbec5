//! Dialect-agnostic transport: a raw socket for the binary dialect, a
//! WebSocket for the text dialect, behind one `recv`/`send` surface so the
//! connection manager doesn't need two code paths (spec §4.A, §4.F).

use fc_protocol::{BinaryCodec, Decoder, FcType, Packet, TextCodec};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Codec(#[from] fc_protocol::CodecError),
}

/// An established connection to the service, in whichever dialect the
/// configuration selected.
pub enum Transport {
    Binary { stream: TcpStream, codec: BinaryCodec },
    Text { stream: WsStream, codec: TextCodec },
}

impl Transport {
    pub async fn dial_binary(host: &str, port: u16) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Transport::Binary { stream, codec: BinaryCodec::new() })
    }

    pub async fn dial_text(scheme: &str, host: &str, path: &str) -> Result<Self, TransportError> {
        let url = format!("{scheme}://{host}{path}");
        let (stream, _response) = connect_async(url).await?;
        Ok(Transport::Text { stream, codec: TextCodec::new() })
    }

    /// Send the WebSocket-dialect greeting required before LOGIN (spec
    /// §4.F, "Pending → Active"). A no-op for the binary dialect.
    pub async fn send_hello(&mut self) -> Result<(), TransportError> {
        if let Transport::Text { stream, .. } = self {
            stream.send(Message::Text("hello fcserver\n\0".into())).await?;
        }
        Ok(())
    }

    pub async fn send(
        &mut self,
        fc_type: FcType,
        session_id: i32,
        n_to: i32,
        n_arg1: i32,
        n_arg2: i32,
        payload: Option<&str>,
    ) -> Result<(), TransportError> {
        match self {
            Transport::Binary { stream, .. } => {
                let bytes =
                    fc_protocol::codec::binary::encode_binary(fc_type, session_id, n_to, n_arg1, n_arg2, payload);
                stream.write_all(&bytes).await?;
                Ok(())
            }
            Transport::Text { stream, .. } => {
                let text = fc_protocol::codec::text::encode_text(
                    fc_type, session_id, n_to, n_arg1, n_arg2, payload,
                );
                stream.send(Message::Text(text.into())).await?;
                Ok(())
            }
        }
    }

    /// Receive the next complete packet, reading from the socket as needed.
    /// Returns `Ok(None)` once the peer has closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        loop {
            match self {
                Transport::Binary { stream, codec } => {
                    if let Some(packet) = codec.decode_next()? {
                        return Ok(Some(packet));
                    }
                    let mut buf = [0u8; 4096];
                    let n = stream.read(&mut buf).await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    codec.feed(&buf[..n]);
                }
                Transport::Text { stream, codec } => {
                    if let Some(packet) = codec.decode_next()? {
                        return Ok(Some(packet));
                    }
                    match stream.next().await {
                        Some(Ok(Message::Text(t))) => codec.feed(t.as_bytes()),
                        Some(Ok(Message::Binary(b))) => codec.feed(&b),
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => return Ok(None),
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    pub async fn close(&mut self) {
        match self {
            Transport::Binary { stream, .. } => {
                let _ = stream.shutdown().await;
            }
            Transport::Text { stream, .. } => {
                let _ = stream.close(None).await;
            }
        }
    }
}
