//! WebSocket transport.
//!
//! The socket is split on connect: the write half stays behind a mutex for
//! [`Connection::send`], the read half is owned by a reader task that
//! forwards every inbound frame into a bounded channel. When the channel is
//! full the reader waits; frames are never dropped.

use std::fmt;

use anyhow::{Context, anyhow};
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
}

impl MessageType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Request" => Ok(Self::Request),
            "Response" => Ok(Self::Response),
            other => Err(Error::UnsupportedMessageType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("Request"),
            Self::Response => f.write_str("Response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub data: String,
}

impl Message {
    pub fn request(data: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Request,
            data: data.into(),
        }
    }

    pub fn response(data: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Response,
            data: data.into(),
        }
    }
}

/// What commands need from a live connection.
///
/// Inbound messages are not part of the trait: they arrive on the channel
/// returned alongside the connection.
pub trait Connection: Send + Sync {
    /// Sends a request, returning it wrapped as an outgoing message.
    fn send<'a>(&'a self, request: &'a str) -> BoxFuture<'a, Result<Message>>;

    fn hostname(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    /// Extra handshake headers as `Name: value`.
    pub headers: Vec<String>,
    /// Accept invalid certificates and host names.
    pub insecure: bool,
    /// Capacity of the inbound message channel.
    pub buffer: usize,
    /// Print the handshake request and response to stderr.
    pub verbose: bool,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsConnection {
    hostname: String,
    sink: Mutex<SplitSink<WsStream, tungstenite::Message>>,
    reader: JoinHandle<()>,
}

impl WsConnection {
    pub async fn connect(opts: &ConnectOptions) -> Result<(Self, mpsc::Receiver<Message>)> {
        let mut request = opts.url.as_str().into_client_request()?;
        for header in &opts.headers {
            let (name, value) = parse_header(header)?;
            request.headers_mut().append(name, value);
        }
        let hostname = request.uri().host().unwrap_or_default().to_string();

        let connector = if opts.insecure {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .context("Failed to build TLS connector")?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        if opts.verbose {
            eprintln!("> {} {}", request.method(), request.uri());
            for (name, value) in request.headers() {
                eprintln!("> {}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
        }

        let (stream, response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await?;

        if opts.verbose {
            eprintln!("< {:?} {}", response.version(), response.status());
            for (name, value) in response.headers() {
                eprintln!("< {}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            eprintln!();
        }
        info!(host = %hostname, status = %response.status(), "connected");

        let (sink, stream) = stream.split();
        let (tx, rx) = mpsc::channel(opts.buffer.max(1));
        let reader = tokio::spawn(read_loop(stream, tx));

        Ok((
            Self {
                hostname,
                sink: Mutex::new(sink),
                reader,
            },
            rx,
        ))
    }

    /// Sends a close frame and stops the reader.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(tungstenite::Message::Close(None)).await {
            debug!("close frame not sent: {}", e);
        }
        let _ = sink.close().await;
        self.reader.abort();
    }
}

impl Connection for WsConnection {
    fn send<'a>(&'a self, request: &'a str) -> BoxFuture<'a, Result<Message>> {
        async move {
            let mut sink = self.sink.lock().await;
            sink.send(tungstenite::Message::Text(request.into())).await?;
            debug!(bytes = request.len(), "request sent");
            Ok(Message::request(request))
        }
        .boxed()
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<Message>) {
    while let Some(frame) = stream.next().await {
        let data = match frame {
            Ok(tungstenite::Message::Text(text)) => text.as_str().to_owned(),
            Ok(tungstenite::Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(tungstenite::Message::Close(frame)) => {
                debug!(?frame, "server closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("websocket read failed: {}", e);
                break;
            }
        };
        if tx.send(Message::response(data)).await.is_err() {
            break;
        }
    }
    debug!("reader finished");
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid header {raw:?}: expected \"Name: value\""))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in {raw:?}"))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in {raw:?}"))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Accepts one WebSocket client on a loopback port and hands it to `handler`.
    async fn serve<F, Fut>(handler: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}/")
    }

    fn options(url: String, buffer: usize) -> ConnectOptions {
        ConnectOptions {
            url,
            headers: vec!["X-Test: 1".to_string()],
            insecure: false,
            buffer,
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_full_channel_holds_frames_in_order() {
        let url = serve(|mut ws| async move {
            for text in ["one", "two", "three"] {
                ws.send(tungstenite::Message::text(text)).await.unwrap();
            }
            while ws.next().await.is_some() {}
        })
        .await;

        let (conn, mut rx) = WsConnection::connect(&options(url, 1)).await.unwrap();
        assert_eq!(conn.hostname(), "127.0.0.1");

        // Let the reader fill the channel and park on the next frame.
        tokio::time::sleep(Duration::from_millis(100)).await;
        for text in ["one", "two", "three"] {
            assert_eq!(rx.recv().await, Some(Message::response(text)));
        }
        conn.close().await;
    }

    #[tokio::test]
    async fn test_server_close_ends_message_stream() {
        let url = serve(|mut ws| async move {
            ws.send(tungstenite::Message::text("bye")).await.unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        })
        .await;

        let (_conn, mut rx) = WsConnection::connect(&options(url, 4)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Message::response("bye")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_returns_request_message() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = serve(|mut ws| async move {
            if let Some(Ok(tungstenite::Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.as_str().to_owned());
            }
            while ws.next().await.is_some() {}
        })
        .await;

        let (conn, _rx) = WsConnection::connect(&options(url, 4)).await.unwrap();
        let message = conn.send(r#"{"op": "ping"}"#).await.unwrap();

        assert_eq!(message, Message::request(r#"{"op": "ping"}"#));
        assert_eq!(seen_rx.await.unwrap(), r#"{"op": "ping"}"#);
        conn.close().await;
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!(MessageType::parse("Request").unwrap(), MessageType::Request);
        assert_eq!(MessageType::parse("Response").unwrap(), MessageType::Response);
        assert!(matches!(
            MessageType::parse("request"),
            Err(Error::UnsupportedMessageType(_))
        ));
    }

    #[test]
    fn test_message_type_display_roundtrip() {
        for kind in [MessageType::Request, MessageType::Response] {
            assert_eq!(MessageType::parse(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("Authorization: Bearer abc:def").unwrap();
        assert_eq!(name.as_str(), "authorization");
        assert_eq!(value.to_str().unwrap(), "Bearer abc:def");
    }

    #[test]
    fn test_parse_header_rejects_missing_colon() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header("bad name: x").is_err());
    }
}
