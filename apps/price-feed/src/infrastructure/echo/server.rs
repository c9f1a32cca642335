//! Local Echo Server
//!
//! A WebSocket server that writes every text and binary frame back to the
//! connection it arrived on. Used in place of the public echo endpoint for
//! offline runs and integration tests.
//!
//! Shutting the server down drops every open connection without a close
//! handshake, which clients observe as a transport failure.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Echo server errors.
#[derive(Debug, thiserror::Error)]
pub enum EchoServerError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// WebSocket echo server.
#[derive(Debug)]
pub struct EchoServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl EchoServer {
    /// Bind the server. Use port 0 to pick a free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, EchoServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            cancel: CancellationToken::new(),
        })
    }

    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL clients can connect to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Token that shuts the server down when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept connections until shut down.
    pub async fn run(self) {
        tracing::info!(addr = %self.local_addr, "Echo server listening");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(serve_connection(stream, peer, self.cancel.child_token()));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Echo server accept failed");
                        }
                    }
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "Echo server stopped");
    }

    /// Run the server on a new task.
    #[must_use]
    pub fn spawn(self) -> RunningEchoServer {
        let url = self.url();
        let local_addr = self.local_addr;
        let cancel = self.shutdown_token();
        let handle = tokio::spawn(self.run());

        RunningEchoServer {
            url,
            local_addr,
            cancel,
            handle,
        }
    }
}

/// An echo server running on its own task.
#[derive(Debug)]
pub struct RunningEchoServer {
    url: String,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningEchoServer {
    /// `ws://` URL clients can connect to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop every open connection and wait for the
    /// accept loop to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Echo server task failed");
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
    match echo_frames(stream, cancel).await {
        Ok(()) => tracing::debug!(%peer, "Echo client disconnected"),
        Err(e) => tracing::debug!(%peer, error = %e, "Echo client failed"),
    }
}

async fn echo_frames(stream: TcpStream, cancel: CancellationToken) -> Result<(), EchoServerError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => write.send(Message::Text(text)).await?,
                    Some(Ok(Message::Binary(data))) => write.send(Message::Binary(data)).await?,
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = write.close().await;
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn echoes_text_frames() {
        let server = EchoServer::bind("127.0.0.1:0").await.unwrap().spawn();

        let (mut ws, _) = connect_async(server.url()).await.unwrap();
        ws.send(Message::Text("hello".into())).await.unwrap();

        match ws.next().await {
            Some(Ok(Message::Text(text))) => assert_eq!(text.as_str(), "hello"),
            other => panic!("expected echoed text, got {other:?}"),
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drops_open_connections() {
        let server = EchoServer::bind("127.0.0.1:0").await.unwrap().spawn();
        let (mut ws, _) = connect_async(server.url()).await.unwrap();

        server.shutdown().await;

        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => panic!("expected abrupt drop, got close frame"),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    }

    #[tokio::test]
    async fn url_uses_bound_port() {
        let server = EchoServer::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.url(), format!("ws://{}", server.local_addr()));
    }
}
