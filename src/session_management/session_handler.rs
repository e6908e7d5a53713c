use super::stream::SessionReader;
use crate::controller::shutdown::ShutdownSignal;
use crate::error_handling::types::SessionError;
use crate::inspection::classify;
use crate::output::{OutputRecord, OutputSender, Renderer};
use crate::session_management::session::Session;
use crate::SessionState;
use log::{debug, error, info};
use std::sync::Arc;

/// Consumes one session: drains its stream, classifies it and reports it to the output sink.
pub struct SessionHandler {
    session: Session,
    reader: SessionReader,
    renderer: Arc<dyn Renderer>,
    output: OutputSender,
    shutdown: ShutdownSignal,
}

impl SessionHandler {
    pub fn new(
        session: Session,
        reader: SessionReader,
        renderer: Arc<dyn Renderer>,
        output: OutputSender,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            session,
            reader,
            renderer,
            output,
            shutdown,
        }
    }

    /// Runs the session to completion and returns it in its final state.
    ///
    /// A read error or a shutdown ends the session without a record. Neither is reported as an
    /// error to the caller: they are contained here.
    pub async fn run(mut self) -> Session {
        if let Err(e) = self.process().await {
            match e {
                SessionError::Cancelled => {
                    debug!("[{}] abandoned on shutdown", self.session.id)
                }
                e => error!(
                    "[{}] {} -> {}: {}",
                    self.session.id, self.session.source, self.session.destination, e
                ),
            }
        }
        if self.session.state() != SessionState::Closed {
            let _ = self.session.advance(SessionState::Closed);
        }
        self.session
    }

    async fn process(&mut self) -> Result<(), SessionError> {
        let data = self.reader.read_to_end(&mut self.shutdown).await?;
        self.session.advance(SessionState::Draining)?;

        let classification = classify(&data);
        info!(
            "[{}] {} -> {}: {} bytes in {} ms, {}",
            self.session.id,
            self.session.source,
            self.session.destination,
            data.len(),
            self.session.elapsed().num_milliseconds(),
            classification
        );

        let record = OutputRecord::new(
            &self.session,
            classification,
            &data,
            self.renderer.as_ref(),
        );
        self.output.emit(record).await?;
        self.session.advance(SessionState::Closed)
    }
}
