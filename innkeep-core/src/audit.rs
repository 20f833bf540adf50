//! Positional lookups over the raw `events` topic.

use async_trait::async_trait;
use innkeep_shared::{BookingEnvelope, BookingKind};
use tracing::debug;

use crate::error::SourceError;

/// Read-only view of a topic from its earliest offset. Implementations must
/// not commit offsets for any consumer group.
#[async_trait]
pub trait EventArchive: Send + Sync {
    async fn read_all(&self) -> Result<Vec<Vec<u8>>, SourceError>;
}

/// Payload of the `index`-th (0-based) booking of `kind`, counting only
/// envelopes that decode. Other kinds and undecodable messages are passed over.
pub fn nth_booking<'a, I>(messages: I, kind: BookingKind, index: usize) -> Option<serde_json::Value>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    messages
        .into_iter()
        .filter_map(|raw| match serde_json::from_slice::<BookingEnvelope>(raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                debug!("Audit skipping undecodable message: {}", e);
                None
            }
        })
        .filter(|envelope| envelope.kind == kind)
        .nth(index)
        .map(|envelope| envelope.payload)
}

pub async fn find_booking(
    archive: &dyn EventArchive,
    kind: BookingKind,
    index: usize,
) -> Result<Option<serde_json::Value>, SourceError> {
    let messages = archive.read_all().await?;
    debug!(count = messages.len(), %kind, index, "Audit scanned events topic");
    Ok(nth_booking(messages.iter().map(Vec::as_slice), kind, index))
}
