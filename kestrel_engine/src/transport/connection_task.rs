use super::codec::LineCodec;
use super::ConnectionControl;

use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc::{Sender, UnboundedReceiver},
};
use tokio_util::codec::FramedRead;

/// Owns one socket. Writes whatever arrives on the control channel and
/// forwards every line read to the line channel, until either side closes.
pub(super) struct ConnectionTask<S> {
    label: String,
    conn: S,
    control_channel: UnboundedReceiver<ConnectionControl>,
    line_channel: Sender<String>,
}

impl<S> ConnectionTask<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(
        label: String,
        stream: S,
        control: UnboundedReceiver<ConnectionControl>,
        lines: Sender<String>,
    ) -> Self {
        Self {
            label,
            conn: stream,
            control_channel: control,
            line_channel: lines,
        }
    }

    pub async fn run(mut self) {
        let (reader, mut writer) = tokio::io::split(self.conn);
        let mut lines = FramedRead::new(reader, LineCodec::new());

        loop {
            select! {
                control = self.control_channel.recv() => match control {
                    None | Some(ConnectionControl::Close) => break,
                    Some(ConnectionControl::Send(msg)) => {
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            tracing::warn!(connection = %self.label, "write failed: {}", e);
                            break;
                        }
                    }
                },
                message = lines.next() => match message {
                    None => break,
                    Some(Ok(raw)) => {
                        // Servers aren't obliged to send UTF-8
                        let line = String::from_utf8_lossy(&raw);
                        let line = line.trim_end_matches('\r');
                        if line.is_empty() {
                            continue;
                        }
                        tracing::trace!(connection = %self.label, %line, "recv");
                        if self.line_channel.send(line.to_string()).await.is_err() {
                            tracing::debug!(connection = %self.label, "reader gone");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection = %self.label, "read failed: {}", e);
                        break;
                    }
                }
            }
        }

        let _ = writer.shutdown().await;
        tracing::info!(connection = %self.label, "closing");
    }
}
