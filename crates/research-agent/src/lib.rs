pub mod command;
pub mod sweeper;

use research_config::AssistantConfig;
use research_core::{Answerer, ResearchError, ResearchQuery, Result};
use research_metrics::{
    measure, measure_with_timeout, LatencyCollector, LatencySummary, ProcessingTimer, RequestOutcome, Timed,
};
use research_session::{ConversationTurn, ExportWriter, SessionStats, SessionStore, TurnOutcome, TurnRecorder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

pub use command::CommandAnswerer;
pub use sweeper::spawn_cleanup_task;

/// Ties the session store to an answering collaborator.
///
/// The store lock is held only for bookkeeping; the external query runs
/// without it.
pub struct ResearchAssistant {
    config: Arc<AssistantConfig>,
    answerer: Arc<dyn Answerer>,
    store: Arc<Mutex<SessionStore>>,
    exporter: ExportWriter,
    latency: Arc<Mutex<LatencyCollector>>,
}

impl ResearchAssistant {
    pub fn new(config: AssistantConfig, answerer: Arc<dyn Answerer>) -> Self {
        let store = SessionStore::new(config.session);
        let exporter = ExportWriter::new(config.paths.data_dir.clone());

        Self {
            config: Arc::new(config),
            answerer,
            store: Arc::new(Mutex::new(store)),
            exporter,
            latency: Arc::new(Mutex::new(LatencyCollector::new())),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<Mutex<SessionStore>> {
        Arc::clone(&self.store)
    }

    pub async fn ensure_session(&self) -> String {
        self.store.lock().await.ensure_session()
    }

    /// Answer `query` and record the exchange as a turn of the active session.
    ///
    /// Failures of the answerer (including timeouts) do not fail the call:
    /// they are recorded as error-marked turns and returned like any other.
    #[instrument(skip(self, query))]
    pub async fn ask(&self, query: &str) -> Result<ConversationTurn> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::EmptyQuery);
        }
        info!("Processing research query");

        let history = {
            let mut store = self.store.lock().await;
            store.ensure_session();
            store.conversation_history()
        };
        let request = ResearchQuery::new(query).with_history(history);

        let mut pending = PendingTurn::new(self.store(), query);
        let timed = self.run_query(request).await;

        let request_outcome = match &timed.output {
            Ok(_) => RequestOutcome::Success,
            Err(ResearchError::Timeout(_)) => RequestOutcome::TimedOut,
            Err(_) => RequestOutcome::Failure,
        };
        let duration = timed.duration;
        let seconds = timed.seconds();
        let outcome = match timed.output {
            Ok(answer) => TurnOutcome::success(answer, seconds),
            Err(e) => {
                error!("Research query failed after {:.2}s: {}", seconds, e);
                TurnOutcome::failure(e.to_string(), seconds)
            }
        };
        // From here on a dropped `ask` still records the real outcome.
        pending.answered(outcome.clone());

        self.latency
            .lock()
            .await
            .record_request(duration, request_outcome);

        let mut store = self.store.lock().await;
        pending.disarm();
        // The session may have been cleared while the query was running.
        store.ensure_session();
        TurnRecorder::new(&mut store).record(query, outcome)
    }

    async fn run_query(&self, request: ResearchQuery) -> Timed<Result<String>> {
        let answer = self.answerer.answer(request);
        match self.config.query_timeout() {
            Some(limit) => measure_with_timeout(answer, limit)
                .await
                .map(|result| result.unwrap_or_else(|_| Err(ResearchError::Timeout(limit)))),
            None => measure(answer).await,
        }
    }

    pub async fn format_history(&self) -> String {
        self.store.lock().await.format_active_history()
    }

    pub async fn stats(&self) -> Option<SessionStats> {
        self.store.lock().await.active_stats()
    }

    pub async fn clear(&self) -> bool {
        self.store.lock().await.clear_session()
    }

    /// Export the active session, by default into the configured data directory.
    pub async fn export(&self, destination: Option<&Path>) -> Result<PathBuf> {
        let export = self
            .store
            .lock()
            .await
            .export_active()
            .ok_or(ResearchError::NoActiveSession)?;
        self.exporter.write(&export, destination)
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store.lock().await.cleanup_expired_sessions()
    }

    pub async fn latency_summary(&self) -> LatencySummary {
        self.latency.lock().await.get_summary()
    }

    /// Start the periodic sweeper if the configuration enables one.
    pub fn spawn_cleanup(&self) -> Option<JoinHandle<()>> {
        self.config
            .session
            .cleanup_interval()
            .map(|period| spawn_cleanup_task(self.store(), period))
    }
}

/// Records a best-effort turn if `ask` is dropped before its turn is stored:
/// the real outcome once the query has answered, otherwise a cancellation.
struct PendingTurn {
    store: Arc<Mutex<SessionStore>>,
    query: String,
    state: PendingState,
}

enum PendingState {
    InFlight(ProcessingTimer),
    Answered(TurnOutcome),
    Recorded,
}

impl PendingTurn {
    fn new(store: Arc<Mutex<SessionStore>>, query: &str) -> Self {
        Self {
            store,
            query: query.to_string(),
            state: PendingState::InFlight(ProcessingTimer::start("in-flight query")),
        }
    }

    fn answered(&mut self, outcome: TurnOutcome) {
        self.state = PendingState::Answered(outcome);
    }

    fn disarm(&mut self) {
        self.state = PendingState::Recorded;
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        let outcome = match std::mem::replace(&mut self.state, PendingState::Recorded) {
            PendingState::Recorded => return,
            PendingState::Answered(outcome) => {
                warn!("Research query dropped before its turn was stored");
                outcome
            }
            PendingState::InFlight(timer) => {
                let seconds = timer.stop().as_secs_f64();
                warn!("Research query cancelled after {:.2}s", seconds);
                TurnOutcome::failure("Query cancelled", seconds)
            }
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, pending turn not recorded");
            return;
        };
        let store = Arc::clone(&self.store);
        let query = std::mem::take(&mut self.query);
        handle.spawn(async move {
            let mut store = store.lock().await;
            store.ensure_session();
            if let Err(e) = TurnRecorder::new(&mut store).record(query, outcome) {
                warn!("Failed to record pending turn: {}", e);
            }
        });
    }
}
