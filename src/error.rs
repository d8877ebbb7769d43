use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashstreamError {
    #[error("WebSocket protocol error: {0}")]
    WebSocketError(#[from] fastwebsockets::WebSocketError),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    TlsError(#[from] rustls::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Handshake rejected: {status}")]
    HandshakeRejected { status: String },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}
