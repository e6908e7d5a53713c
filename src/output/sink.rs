use super::record::OutputRecord;
use crate::configuration::OutputFormat;
use crate::error_handling::types::{OutputError, SessionError};
use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Producer handle given to every session handler.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::Sender<OutputRecord>,
}

/// The single consumer that owns the output destination.
#[derive(Debug)]
pub struct OutputSink {
    pub(crate) rx: mpsc::Receiver<OutputRecord>,
    format: OutputFormat,
}

/// Creates the fan-in channel. `capacity` bounds how many finished records may wait.
pub fn output_channel(capacity: usize, format: OutputFormat) -> (OutputSender, OutputSink) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutputSender { tx }, OutputSink { rx, format })
}

impl OutputSender {
    pub async fn emit(&self, record: OutputRecord) -> Result<(), SessionError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| SessionError::OutputClosed)
    }
}

impl OutputSink {
    /// Writes records in arrival order until every [`OutputSender`] is gone.
    ///
    /// Each record is written with a single `write_all`, so the text of two records never
    /// interleaves. Returns the number of records written.
    pub async fn run<W>(mut self, mut writer: W) -> Result<u64, OutputError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(record) = self.rx.recv().await {
            let block = match self.format {
                OutputFormat::Framed => record.frame(),
                OutputFormat::Json => record.json_line()?,
            };
            writer.write_all(block.as_bytes()).await?;
            writer.flush().await?;
            written += 1;
            trace!("[{}] record written", record.session_id());
        }
        writer.shutdown().await?;
        debug!("output sink closed after {} records", written);
        Ok(written)
    }
}
