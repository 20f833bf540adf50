use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use innkeep_shared::{LogMessage, LoggedEvent, MessageCode};
use tracing::debug;

use crate::consumer::{HandleError, MessageHandler, Persisted};
use crate::error::{DecodeError, PersistenceError};
use crate::repository::EventLogRepository;

/// Persists control messages from the `event_log` topic as a flat log.
pub struct LogSinkHandler {
    events: Arc<dyn EventLogRepository>,
}

impl LogSinkHandler {
    pub fn new(events: Arc<dyn EventLogRepository>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl MessageHandler for LogSinkHandler {
    async fn handle(&self, payload: &[u8]) -> Result<Persisted, HandleError> {
        let message: LogMessage =
            serde_json::from_slice(payload).map_err(|e| DecodeError::Envelope(e.to_string()))?;

        let event = LoggedEvent {
            message_info: message.message_info,
            message_code: message.message_code,
            timestamp: Utc::now(),
        };
        self.events.insert_event(&event).await?;

        Ok(Persisted {
            description: format!("event log message {} ({})", event.message_code, event.message_info),
        })
    }
}

/// Folds grouped row counts into a fixed mapping over every known code.
/// Returns `None` when no rows exist at all.
pub fn fill_code_counts(rows: &[(String, i64)]) -> Option<BTreeMap<String, u64>> {
    if rows.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<String, u64> = MessageCode::ALL
        .iter()
        .map(|code| (code.code().to_string(), 0))
        .collect();

    for (code, count) in rows {
        match counts.get_mut(code.as_str()) {
            Some(slot) => *slot += (*count).max(0) as u64,
            None => debug!("Ignoring rows with unknown message code {}", code),
        }
    }

    Some(counts)
}

/// Read side of the log sink: per-code counts, or `None` while the log is empty.
pub async fn event_code_counts(
    events: &dyn EventLogRepository,
) -> Result<Option<BTreeMap<String, u64>>, PersistenceError> {
    let rows = events.count_by_code().await?;
    Ok(fill_code_counts(&rows))
}
