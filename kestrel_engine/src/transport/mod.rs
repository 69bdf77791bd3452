//! Line-oriented connections to IRC servers.
//!
//! A [`Connector`] opens a stream to an [`Endpoint`] and hands it to a
//! [`ConnectionTask`], which owns the socket. The rest of the engine only sees
//! the resulting [`Transport`]: a [`LineSender`] for outbound lines and a
//! receiver for inbound ones.

use crate::config::{ConfigError, Endpoint, NetworkIdentity};
use crate::ctcp;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{channel, unbounded_channel, Receiver, UnboundedSender};

mod codec;

mod connection_task;
use connection_task::ConnectionTask;

mod tcp;
pub use tcp::TcpConnector;

/// Inbound lines buffered between the socket and the read loop
const RECV_QUEUE_LEN: usize = 256;

/// An error that might occur while opening or using a connection
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("Invalid TLS server name {0}")]
    InvalidServerName(String),
    #[error("Client certificate: {0}")]
    ClientCertificate(#[from] ConfigError),
    #[error("Connection attempt timed out")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    #[error("Line contains a line break")]
    InvalidLine,
}

#[derive(Debug)]
pub(crate) enum ConnectionControl {
    Send(String),
    Close,
}

/// Cloneable handle for writing to a connection.
///
/// Sends never block; lines are queued for the connection task in order.
#[derive(Clone, Debug)]
pub struct LineSender {
    control: UnboundedSender<ConnectionControl>,
}

impl LineSender {
    /// Queue one protocol line. The line terminator is added here, and
    /// embedded line breaks are refused so that a caller can't inject a
    /// second command.
    pub fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        if line.contains(['\r', '\n']) {
            return Err(TransportError::InvalidLine);
        }

        tracing::trace!(%line, "send");
        self.control
            .send(ConnectionControl::Send(format!("{}\r\n", line)))
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the connection task to shut the socket. Lines queued before this
    /// call are still written.
    pub fn close(&self) {
        let _ = self.control.send(ConnectionControl::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    pub fn nick(&self, nickname: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("NICK {}", nickname))
    }

    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<(), TransportError> {
        match key {
            Some(key) => self.send_raw(&format!("JOIN {} {}", channel, key)),
            None => self.send_raw(&format!("JOIN {}", channel)),
        }
    }

    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), TransportError> {
        match reason {
            Some(reason) => self.send_raw(&format!("PART {} :{}", channel, reason)),
            None => self.send_raw(&format!("PART {}", channel)),
        }
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("PRIVMSG {} :{}", target, text))
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("NOTICE {} :{}", target, text))
    }

    /// Send a CTCP query inside a PRIVMSG
    pub fn ctcp(&self, target: &str, command: &str, params: &str) -> Result<(), TransportError> {
        self.privmsg(target, &ctcp::encode(command, params))
    }

    /// Send a CTCP reply inside a NOTICE
    pub fn ctcp_reply(&self, target: &str, command: &str, params: &str) -> Result<(), TransportError> {
        self.notice(target, &ctcp::encode(command, params))
    }

    pub fn topic(&self, channel: &str, topic: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("TOPIC {} :{}", channel, topic))
    }

    pub fn whois(&self, nickname: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("WHOIS {}", nickname))
    }

    pub fn quit(&self, reason: Option<&str>) -> Result<(), TransportError> {
        match reason {
            Some(reason) => self.send_raw(&format!("QUIT :{}", reason)),
            None => self.send_raw("QUIT"),
        }
    }
}

/// An open connection: a way to write lines, and the lines read so far.
///
/// The receiver yields `None` once the connection has closed, for whatever
/// reason.
#[derive(Debug)]
pub struct Transport {
    pub sender: LineSender,
    pub lines: Receiver<String>,
}

impl Transport {
    /// Start a connection task driving `stream`, returning the handles used
    /// to talk to it
    pub fn spawn<S>(label: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (control_send, control_recv) = unbounded_channel();
        let (line_send, line_recv) = channel(RECV_QUEUE_LEN);

        let task = ConnectionTask::new(label.into(), stream, control_recv, line_send);
        tokio::spawn(task.run());

        Self {
            sender: LineSender {
                control: control_send,
            },
            lines: line_recv,
        }
    }
}

/// Opens transports to endpoints. Implemented over TCP by [`TcpConnector`];
/// tests substitute in-memory streams.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint, identity: &NetworkIdentity) -> Result<Transport, TransportError>;
}
