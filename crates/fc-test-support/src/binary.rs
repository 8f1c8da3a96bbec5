//! Mock binary-dialect service endpoint (spec §4.A, §4.F).

use fc_protocol::codec::binary::encode_binary;
use fc_protocol::{BinaryCodec, Decoder, FcType, Packet};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Binds a raw TCP listener and hands out [`MockBinaryConn`]s as clients dial
/// in, mirroring the one binary port `fc_chat_core::serverconfig` resolves a
/// real connection against.
pub struct MockBinaryServer {
    listener: TcpListener,
}

impl MockBinaryServer {
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("bound listener has a local addr")
    }

    /// Accept the next client connection.
    pub async fn accept(&self) -> std::io::Result<MockBinaryConn> {
        let (stream, _peer) = self.listener.accept().await?;
        Ok(MockBinaryConn { stream, codec: BinaryCodec::new() })
    }
}

/// One accepted connection, decoding/encoding frames with the same codec the
/// client itself uses.
pub struct MockBinaryConn {
    stream: TcpStream,
    codec: BinaryCodec,
}

impl MockBinaryConn {
    /// Read the next decoded packet the client sent, blocking on more bytes
    /// as needed. Returns `Ok(None)` once the client closes the socket.
    pub async fn recv(&mut self) -> std::io::Result<Option<Packet>> {
        loop {
            if let Some(packet) = self
                .codec
                .decode_next()
                .expect("mock server received a malformed binary frame")
            {
                return Ok(Some(packet));
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.codec.feed(&buf[..n]);
        }
    }

    /// Send one frame down to the client. `n_from` is whatever the scenario
    /// needs in that header slot — real servers don't stamp their own
    /// identity there the way a client stamps its session id on outbound
    /// frames.
    pub async fn send(
        &mut self,
        fc_type: FcType,
        n_from: i32,
        n_to: i32,
        n_arg1: i32,
        n_arg2: i32,
        payload: Option<&str>,
    ) -> std::io::Result<()> {
        let bytes = encode_binary(fc_type, n_from, n_to, n_arg1, n_arg2, payload);
        self.stream.write_all(&bytes).await
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
        let _ = self.stream.shutdown().await;
    }
}
