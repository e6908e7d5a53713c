use crate::controller::shutdown::ShutdownSignal;
use crate::error_handling::types::SessionError;
use crate::network::{ReassembledStream, Reassembly};
use log::trace;
use tokio::sync::mpsc;

type Chunk = Result<Vec<u8>, SessionError>;

/// Writable end of a session, owned by the reassembler.
///
/// Writes never block: the reassembler runs on the capture loop and must not wait on a handler.
pub struct SessionInput {
    tx: Option<mpsc::UnboundedSender<Chunk>>,
    report_gaps: bool,
}

/// Readable end of a session, owned by its handler.
pub struct SessionReader {
    rx: mpsc::UnboundedReceiver<Chunk>,
}

/// Creates the pipe handed to the reassembler for one flow.
///
/// With `report_gaps`, the first chunk preceded by missing bytes turns into a read error on the
/// reader side and the input stops forwarding.
pub fn session_stream(report_gaps: bool) -> (SessionInput, SessionReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SessionInput {
            tx: Some(tx),
            report_gaps,
        },
        SessionReader { rx },
    )
}

impl SessionInput {
    fn send(&mut self, chunk: Chunk) {
        let failed = chunk.is_err();
        if let Some(tx) = &self.tx {
            if tx.send(chunk).is_err() {
                trace!("session reader gone, discarding input");
                self.tx = None;
            }
        }
        if failed {
            self.tx = None;
        }
    }
}

impl ReassembledStream for SessionInput {
    fn reassembled(&mut self, chunk: Reassembly) {
        if chunk.skip > 0 && self.report_gaps {
            self.send(Err(SessionError::DataLost(chunk.skip)));
            return;
        }
        if !chunk.bytes.is_empty() {
            self.send(Ok(chunk.bytes));
        }
    }

    fn reassembly_complete(&mut self) {
        self.tx = None;
    }
}

impl SessionReader {
    /// Collects the whole stream.
    ///
    /// Returns once the input end is closed, or fails on a read error or when `shutdown` fires.
    pub async fn read_to_end(
        &mut self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Vec<u8>, SessionError> {
        let mut data = Vec::new();
        loop {
            // Cancellation wins over a stream closed by the capture loop tearing down.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
                chunk = self.rx.recv() => match chunk {
                    Some(Ok(bytes)) => data.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(data),
                },
            }
        }
    }
}
