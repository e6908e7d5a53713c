use super::session::Session;
use super::session_handler::SessionHandler;
use super::stream::{session_stream, SessionInput};
use crate::controller::shutdown::ShutdownSignal;
use crate::network::{FlowKey, StreamFactory};
use crate::output::{OutputSender, Renderer};
use log::{debug, error};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Source of session ids. The first id is 1, ids are never reused.
#[derive(Debug, Default)]
pub struct SessionCounter {
    last: AtomicU64,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// The reassembler's stream factory: one session, and one handler task, per new flow.
///
/// # Fields Overview
///
/// - `counter`: id source, owned here and nowhere else
/// - `sessions`: running handler tasks
/// - `renderer`, `output`, `shutdown`: handed to every handler
/// - `report_gaps`: whether session inputs turn skipped bytes into read errors
pub struct FlowDispatcher {
    counter: SessionCounter,
    sessions: JoinSet<Session>,
    renderer: Arc<dyn Renderer>,
    output: OutputSender,
    shutdown: ShutdownSignal,
    report_gaps: bool,
}

impl FlowDispatcher {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        output: OutputSender,
        shutdown: ShutdownSignal,
        report_gaps: bool,
    ) -> Self {
        Self {
            counter: SessionCounter::new(),
            sessions: JoinSet::new(),
            renderer,
            output,
            shutdown,
            report_gaps,
        }
    }

    pub fn sessions_created(&self) -> u64 {
        self.counter.issued()
    }

    /// Handler tasks not yet reaped. Finished tasks are reaped as new flows arrive.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Waits for every handler to finish. The output sender is dropped afterwards, so the sink
    /// can end once the last record is written.
    pub async fn wait_for_sessions(mut self) -> u64 {
        let mut finished = 0;
        while let Some(res) = self.sessions.join_next().await {
            match res {
                Ok(session) => {
                    debug!("[{}] joined in state {:?}", session.id, session.state());
                    finished += 1;
                }
                Err(e) => error!("[!] session task failed: {}", e),
            }
        }
        finished
    }

    fn reap_finished(&mut self) {
        while let Some(res) = self.sessions.try_join_next() {
            if let Err(e) = res {
                error!("[!] session task failed: {}", e);
            }
        }
    }
}

impl StreamFactory for FlowDispatcher {
    type Stream = SessionInput;

    fn new_stream(&mut self, key: &FlowKey) -> SessionInput {
        self.reap_finished();

        let session = Session::new(self.counter.next_id(), key);
        debug!("[{}] new session {}", session.id, session);

        let (input, reader) = session_stream(self.report_gaps);
        let handler = SessionHandler::new(
            session,
            reader,
            Arc::clone(&self.renderer),
            self.output.clone(),
            self.shutdown.clone(),
        );
        self.sessions.spawn(handler.run());
        input
    }
}
