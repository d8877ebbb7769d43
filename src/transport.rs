// file: src/transport.rs
// description: connection seam between the event client and the network, plus the WebSocket implementation
// reference: https://docs.rs/fastwebsockets/latest/fastwebsockets/

use crate::error::DashstreamError;
use fastwebsockets::{
    FragmentCollectorRead, Frame, OpCode, Payload, Role, WebSocket, WebSocketWrite,
};
use rustls::pki_types::ServerName;
use std::{future::Future, sync::Arc};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use url::{Position, Url};

const MAX_HANDSHAKE_BYTES: usize = 16 * 1024;
const INBOUND_QUEUE: usize = 256;

/// Opens connections to the streaming endpoint.
///
/// The client clones the transport into each connection attempt, so
/// implementations should be cheap to clone.
pub trait Transport: Clone + Send + Sync + 'static {
    type Conn: Connection;

    fn connect(
        &self,
        url: &Url,
    ) -> impl Future<Output = Result<Self::Conn, DashstreamError>> + Send;
}

/// One established, message-framed, full-duplex connection.
pub trait Connection: Send + 'static {
    /// Next text message. `None` means the peer closed the connection.
    ///
    /// Must be cancel-safe: the client races it against outbound commands.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, DashstreamError>>> + Send;

    fn send(&mut self, text: String) -> impl Future<Output = Result<(), DashstreamError>> + Send;

    /// Best-effort graceful close.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for S {}

type BoxedStream = Box<dyn AsyncStream>;
type WsStream = BufReader<BoxedStream>;

/// WebSocket transport over plain TCP (`ws://`) or rustls (`wss://`).
#[derive(Clone)]
pub struct WsTransport {
    tls: TlsConnector,
}

impl WsTransport {
    pub fn new() -> Result<Self, DashstreamError> {
        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        })
        .with_no_client_auth();

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn open_stream(&self, url: &Url, host: &str, port: u16) -> Result<BoxedStream, DashstreamError> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;

        if url.scheme() == "wss" {
            let domain = ServerName::try_from(host.to_string())
                .map_err(|e| DashstreamError::InvalidEndpoint(format!("{host}: {e}")))?;
            let tls = self.tls.connect(domain, tcp).await?;
            Ok(Box::new(tls))
        } else {
            Ok(Box::new(tcp))
        }
    }
}

impl Transport for WsTransport {
    type Conn = WsConnection;

    async fn connect(&self, url: &Url) -> Result<WsConnection, DashstreamError> {
        let host = url
            .host_str()
            .ok_or_else(|| DashstreamError::InvalidEndpoint(format!("missing host in {url}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DashstreamError::InvalidEndpoint(format!("missing port in {url}")))?;

        let stream = self.open_stream(url, host, port).await?;
        let stream = handshake(stream, url, host, port).await?;

        let mut ws = WebSocket::after_handshake(stream, Role::Client);
        ws.set_writev(true);
        ws.set_auto_close(true);
        ws.set_auto_pong(true);

        debug!(%url, "WebSocket handshake complete");
        Ok(WsConnection::spawn(ws))
    }
}

/// Sends the HTTP upgrade request and consumes the response head.
///
/// The reader stays buffered so frames the server pushes right behind the
/// `101` response are not lost.
async fn handshake(
    stream: BoxedStream,
    url: &Url,
    host: &str,
    port: u16,
) -> Result<WsStream, DashstreamError> {
    let mut stream = BufReader::new(stream);
    let key = fastwebsockets::handshake::generate_key();
    let host_header = match url.port() {
        Some(_) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let request = format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        &url[Position::BeforePath..Position::AfterQuery],
        host_header,
        key
    );
    stream.get_mut().write_all(request.as_bytes()).await?;
    stream.get_mut().flush().await?;

    let mut consumed = 0;
    let status = read_head_line(&mut stream, &mut consumed).await?;
    if !status.starts_with("HTTP/1.1 101") {
        return Err(DashstreamError::HandshakeRejected {
            status: status.trim_end().to_string(),
        });
    }

    loop {
        let line = read_head_line(&mut stream, &mut consumed).await?;
        if line == "\r\n" || line == "\n" {
            break;
        }
        trace!(header = line.trim_end(), "Handshake response header");
    }

    Ok(stream)
}

/// Reads one response head line without letting the whole head grow past
/// `MAX_HANDSHAKE_BYTES`, newline or not.
async fn read_head_line(stream: &mut WsStream, consumed: &mut usize) -> Result<String, DashstreamError> {
    let budget = MAX_HANDSHAKE_BYTES.saturating_sub(*consumed) as u64;
    let mut line = String::new();
    let n = (&mut *stream).take(budget).read_line(&mut line).await?;
    *consumed += n;

    if line.ends_with('\n') {
        Ok(line)
    } else if *consumed >= MAX_HANDSHAKE_BYTES {
        Err(DashstreamError::InvalidMessage(
            "handshake response too large".to_string(),
        ))
    } else {
        Err(DashstreamError::ConnectionClosed)
    }
}

enum Outgoing {
    Text(String),
    /// Pong or close reply owed to the server.
    Control(OpCode, Vec<u8>),
    Close,
}

/// An open WebSocket split across two tasks.
///
/// The reader task owns the read half and is never cancelled mid-frame;
/// complete text messages reach [`Connection::recv`] through a channel.
/// Everything written to the socket, including pongs and close replies, goes
/// through the writer task.
pub struct WsConnection {
    inbound: mpsc::Receiver<Result<String, DashstreamError>>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsConnection {
    fn spawn(ws: WebSocket<WsStream>) -> Self {
        let (read_half, write_half) = ws.split(tokio::io::split);
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            FragmentCollectorRead::new(read_half),
            inbound_tx,
            outgoing.clone(),
        ));
        let writer = tokio::spawn(write_loop(write_half, outgoing_rx));

        Self {
            inbound,
            outgoing,
            reader,
            writer,
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop(
    mut ws: FragmentCollectorRead<ReadHalf<WsStream>>,
    inbound: mpsc::Sender<Result<String, DashstreamError>>,
    replies: mpsc::UnboundedSender<Outgoing>,
) {
    let mut reply = move |frame: Frame<'_>| {
        let queued = replies
            .send(Outgoing::Control(frame.opcode, frame.payload.to_vec()))
            .map_err(|_| DashstreamError::ConnectionClosed);
        async move { queued }
    };

    loop {
        let text = match ws.read_frame(&mut reply).await {
            Ok(frame) => match frame.opcode {
                OpCode::Text => String::from_utf8_lossy(&frame.payload).into_owned(),
                OpCode::Close => {
                    debug!("Received close frame");
                    return;
                }
                OpCode::Binary => {
                    debug!("Ignoring binary message of {} bytes", frame.payload.len());
                    continue;
                }
                // pings are answered through `reply`; continuations are reassembled by the collector
                _ => continue,
            },
            Err(e) => {
                let _ = inbound.send(Err(e.into())).await;
                return;
            }
        };

        if inbound.send(Ok(text)).await.is_err() {
            return;
        }
    }
}

async fn write_loop(
    mut ws: WebSocketWrite<WriteHalf<WsStream>>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(message) = outgoing.recv().await {
        let (frame, last) = match message {
            Outgoing::Text(text) => (Frame::text(Payload::Owned(text.into_bytes())), false),
            Outgoing::Control(opcode, payload) => {
                let last = matches!(opcode, OpCode::Close);
                (Frame::new(true, opcode, None, Payload::Owned(payload)), last)
            }
            Outgoing::Close => (Frame::close(1000, b""), true),
        };

        if let Err(e) = ws.write_frame(frame).await {
            debug!("WebSocket write failed: {}", e);
            return;
        }
        if last {
            return;
        }
    }
}

impl Connection for WsConnection {
    async fn recv(&mut self) -> Option<Result<String, DashstreamError>> {
        self.inbound.recv().await
    }

    async fn send(&mut self, text: String) -> Result<(), DashstreamError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| DashstreamError::ConnectionClosed)
    }

    async fn close(&mut self) {
        self.reader.abort();
        if self.outgoing.send(Outgoing::Close).is_err() {
            return;
        }
        // the writer exits right after the close frame
        if let Err(e) = (&mut self.writer).await {
            debug!("Close frame not sent: {}", e);
        }
    }
}
