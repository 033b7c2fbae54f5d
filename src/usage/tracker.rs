use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};

/// One tracked task invocation. Opened at router entry, finalized exactly
/// once at router exit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSession {
    pub session_id: String,
    pub identity: String,
    pub provider: String,
    pub task: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub input_chars: u64,
    pub output_chars: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub duration_ms: u64,
    pub success: bool,
}

/// Metrics supplied when a session is finalized.
#[derive(Debug, Clone, Default)]
pub struct UsageMetrics {
    pub input_chars: u64,
    pub output_chars: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    /// Measured duration; when absent the tracker uses its own clock.
    pub duration_ms: Option<u64>,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBreakdown {
    pub session_count: u64,
    pub input_chars: u64,
    pub output_chars: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub duration_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
}

impl UsageBreakdown {
    fn record(&mut self, session: &UsageSession) {
        self.session_count += 1;
        self.input_chars += session.input_chars;
        self.output_chars += session.output_chars;
        self.tokens_in += session.tokens_in.unwrap_or(0);
        self.tokens_out += session.tokens_out.unwrap_or(0);
        self.duration_ms += session.duration_ms;
        if session.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub identity: String,
    pub session_count: u64,
    pub total_input_chars: u64,
    pub total_output_chars: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_duration_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub by_provider: BTreeMap<String, UsageBreakdown>,
    pub by_task: BTreeMap<String, UsageBreakdown>,
}

impl UsageSummary {
    fn empty(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, session: &UsageSession) {
        self.session_count += 1;
        self.total_input_chars += session.input_chars;
        self.total_output_chars += session.output_chars;
        self.total_tokens_in += session.tokens_in.unwrap_or(0);
        self.total_tokens_out += session.tokens_out.unwrap_or(0);
        self.total_duration_ms += session.duration_ms;
        if session.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        self.by_provider
            .entry(session.provider.clone())
            .or_default()
            .record(session);
        self.by_task
            .entry(session.task.clone())
            .or_default()
            .record(session);
    }
}

#[derive(Default)]
struct TrackerState {
    active: HashMap<String, UsageSession>,
    summaries: HashMap<String, UsageSummary>,
}

/// In-memory accounting of call volume, latency and outcome per identity.
///
/// State lives for the process lifetime only. Session finalization removes
/// the session from the active set and folds it into the identity's summary
/// under a single lock, so a session can never be counted twice.
pub struct UsageTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

fn to_datetime(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

impl UsageTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn start_session(&self, identity: &str, provider: &str, task: &str) -> Result<String> {
        if provider.trim().is_empty() {
            return Err(Error::invalid_input("Provider must be a non-empty string"));
        }
        if task.trim().is_empty() {
            return Err(Error::invalid_input("Task must be a non-empty string"));
        }

        let session_id = Uuid::new_v4().to_string();
        let session = UsageSession {
            session_id: session_id.clone(),
            identity: identity.to_string(),
            provider: provider.to_string(),
            task: task.to_string(),
            start_time: to_datetime(self.clock.now_millis()),
            end_time: None,
            input_chars: 0,
            output_chars: 0,
            tokens_in: None,
            tokens_out: None,
            duration_ms: 0,
            success: false,
        };

        self.state.lock().active.insert(session_id.clone(), session);
        debug!("Started usage session {} for {} ({}/{})", session_id, identity, provider, task);
        Ok(session_id)
    }

    /// Finalize a session. Unknown or already-finalized ids are ignored.
    pub fn end_session(&self, session_id: &str, metrics: UsageMetrics) -> Option<UsageSession> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let mut session = match state.active.remove(session_id) {
            Some(session) => session,
            None => {
                debug!("Ignoring end of unknown usage session {}", session_id);
                return None;
            }
        };

        let started = session.start_time.timestamp_millis().max(0) as u64;
        session.end_time = Some(to_datetime(now));
        session.input_chars = metrics.input_chars;
        session.output_chars = metrics.output_chars;
        session.tokens_in = metrics.tokens_in;
        session.tokens_out = metrics.tokens_out;
        session.duration_ms = metrics
            .duration_ms
            .unwrap_or_else(|| now.saturating_sub(started));
        session.success = metrics.success;

        let identity = session.identity.clone();
        state
            .summaries
            .entry(identity.clone())
            .or_insert_with(|| UsageSummary::empty(&identity))
            .record(&session);

        debug!(
            "Finalized usage session {} (success={}, {}ms)",
            session.session_id, session.success, session.duration_ms
        );
        Some(session)
    }

    /// Aggregate for `identity`; zeroed when nothing has been recorded.
    pub fn get_summary(&self, identity: &str) -> UsageSummary {
        self.state
            .lock()
            .summaries
            .get(identity)
            .cloned()
            .unwrap_or_else(|| UsageSummary::empty(identity))
    }

    pub fn active_session_count(&self) -> usize {
        self.state.lock().active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn tracker() -> (UsageTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (UsageTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_start_session_rejects_empty_names() {
        let (tracker, _) = tracker();
        assert!(tracker.start_session("local-dev", "", "TEXT_GENERATION").is_err());
        assert!(tracker.start_session("local-dev", "OPENAI", " ").is_err());
        assert_eq!(tracker.active_session_count(), 0);
    }

    #[test]
    fn test_summary_aggregates_by_provider_and_task() {
        let (tracker, clock) = tracker();

        let first = tracker.start_session("alice", "OPENAI", "TEXT_GENERATION").unwrap();
        clock.advance(Duration::from_millis(40));
        tracker.end_session(
            &first,
            UsageMetrics {
                input_chars: 12,
                output_chars: 30,
                success: true,
                ..Default::default()
            },
        );

        let second = tracker.start_session("alice", "GEMINI", "TEXT_GENERATION").unwrap();
        tracker.end_session(
            &second,
            UsageMetrics {
                input_chars: 5,
                duration_ms: Some(7),
                tokens_in: Some(3),
                success: false,
                ..Default::default()
            },
        );

        let summary = tracker.get_summary("alice");
        assert_eq!(summary.session_count, 2);
        assert_eq!(summary.total_input_chars, 17);
        assert_eq!(summary.total_output_chars, 30);
        assert_eq!(summary.total_tokens_in, 3);
        assert_eq!(summary.total_duration_ms, 47);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.by_provider["OPENAI"].success_count, 1);
        assert_eq!(summary.by_provider["GEMINI"].failure_count, 1);
        assert_eq!(summary.by_task["TEXT_GENERATION"].session_count, 2);
    }

    #[test]
    fn test_double_end_is_ignored() {
        let (tracker, _) = tracker();
        let id = tracker.start_session("bob", "OPENAI", "TEXT_GENERATION").unwrap();

        assert!(tracker.end_session(&id, UsageMetrics::default()).is_some());
        assert!(tracker.end_session(&id, UsageMetrics::default()).is_none());
        assert!(tracker.end_session("no-such-session", UsageMetrics::default()).is_none());

        assert_eq!(tracker.get_summary("bob").session_count, 1);
        assert_eq!(tracker.active_session_count(), 0);
    }

    #[test]
    fn test_unknown_identity_is_zeroed() {
        let (tracker, _) = tracker();
        let summary = tracker.get_summary("nobody");

        assert_eq!(summary.identity, "nobody");
        assert_eq!(summary.session_count, 0);
        assert_eq!(summary.total_duration_ms, 0);
        assert!(summary.by_provider.is_empty());
        assert!(summary.by_task.is_empty());
    }
}
