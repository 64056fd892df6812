//! WebSocket counterparts for tests: in-memory pairs for paused-clock
//! meter tests and loopback TCP servers for whole-cycle tests.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpListener;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::params;
use crate::session::TransportSession;

/// Accept a WebSocket handshake, echoing the ndt7 sub-protocol header.
pub async fn accept_ndt7<S>(stream: S) -> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio_tungstenite::accept_hdr_async(stream, |_req: &Request, mut resp: Response| {
        resp.headers_mut().append(
            "sec-websocket-protocol",
            params::SEC_WEBSOCKET_PROTOCOL.parse().unwrap(),
        );
        Ok(resp)
    })
    .await
    .unwrap()
}

/// An in-memory session and its peer, handshake already complete.
///
/// `buffer` is the pipe capacity in each direction; keep it small to
/// exercise backpressure.
pub async fn ws_pair(
    buffer: usize,
) -> (TransportSession<DuplexStream>, WebSocketStream<DuplexStream>) {
    // The client must request the sub-protocol or the handshake rejects
    // the server's echo of it.
    let mut request = "ws://testpeer/ndt/v7/test".into_client_request().unwrap();
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        params::SEC_WEBSOCKET_PROTOCOL.parse().unwrap(),
    );

    let (client_io, server_io) = tokio::io::duplex(buffer);
    let (client, server) = tokio::join!(
        tokio_tungstenite::client_async(request, client_io),
        accept_ndt7(server_io),
    );
    let (ws, _response) = client.unwrap();
    (TransportSession::from_websocket(ws), server)
}

/// A stream that accepts every write instantly and never delivers
/// anything back. The zero-backpressure extreme for send-path tests.
pub struct BlackHole;

impl AsyncWrite for BlackHole {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for BlackHole {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

/// A session over [`BlackHole`], handshake skipped.
pub async fn black_hole_session() -> TransportSession<BlackHole> {
    let ws = WebSocketStream::from_raw_socket(BlackHole, Role::Client, None).await;
    TransportSession::from_websocket(ws)
}

/// How a loopback server treats each connection.
#[derive(Debug, Clone, Copy)]
pub enum ServerMode {
    /// Stream binary frames of `frame_size` bytes every `interval` until
    /// the peer goes away.
    Blast {
        frame_size: usize,
        interval: Duration,
    },
    /// Read and discard whatever arrives.
    Drain,
    /// Accept the TCP connection, then hang up before upgrading.
    RefuseUpgrade,
}

/// Spawn a loopback measurement server and return its `ws://` URL.
pub async fn spawn_server(mode: ServerMode) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(stream, mode));
        }
    });
    format!("ws://{addr}/ndt/v7/test")
}

async fn serve_connection(stream: tokio::net::TcpStream, mode: ServerMode) {
    match mode {
        ServerMode::RefuseUpgrade => drop(stream),
        ServerMode::Blast {
            frame_size,
            interval,
        } => {
            let mut ws = accept_ndt7(stream).await;
            let frame = Bytes::from(vec![7u8; frame_size]);
            loop {
                if ws.send(Message::Binary(frame.clone())).await.is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }
        ServerMode::Drain => {
            let mut ws = accept_ndt7(stream).await;
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        }
    }
}
