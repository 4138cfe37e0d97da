//! Newline-delimited JSON host bridge.
//!
//! Stands in for the game-server plugin host: each input line is one
//! [`HostEvent`] (`{"type":"player_left","identity":"..","nickname":".."}`),
//! published on the in-process bus. Bad lines are logged and skipped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use playtime_domain::HostEvent;

use super::host_bus::InProcessEventBus;

#[derive(Debug, thiserror::Error)]
pub enum HostBridgeError {
    #[error("Malformed host event on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to read host input: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub delivered: usize,
    pub malformed: usize,
    /// Parsed events nobody was subscribed to (tracker disabled or not ready).
    pub unhandled: usize,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_event_line(line_number: usize, line: &str) -> Result<Option<HostEvent>, HostBridgeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| HostBridgeError::Malformed {
            line: line_number,
            source,
        })
}

/// Pump `reader` into `bus` until EOF.
pub async fn run_json_lines<R>(reader: R, bus: &InProcessEventBus) -> Result<BridgeStats, HostBridgeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = BridgeStats::default();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        match parse_event_line(line_number, &line) {
            Ok(Some(event)) => {
                let kind = event.kind();
                if bus.publish(event).await == 0 {
                    stats.unhandled += 1;
                    tracing::debug!(kind = %kind, line = line_number, "No handler for host event");
                } else {
                    stats.delivered += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(error = %e, "Skipping host input line");
            }
        }
    }

    tracing::info!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        unhandled = stats.unhandled,
        "Host input closed"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host_bus::{HostEventBus, HostEventHandler};
    use async_trait::async_trait;
    use playtime_domain::HostEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl HostEventHandler for Counter {
        async fn handle(&self, _event: HostEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_event_line(1, "   ").expect("blank").is_none());
    }

    #[test]
    fn malformed_lines_report_line_number() {
        let err = parse_event_line(7, "{not json").expect_err("malformed");
        assert!(matches!(err, HostBridgeError::Malformed { line: 7, .. }));
    }

    #[tokio::test]
    async fn pumps_events_to_bus() {
        let bus = InProcessEventBus::new();
        let counter = Arc::new(Counter::default());
        bus.subscribe(HostEventKind::PlayerVerified, counter.clone())
            .await;

        let input = concat!(
            r#"{"type":"player_verified","identity":"abc123","nickname":"Nick"}"#,
            "\n\n",
            "garbage\n",
            r#"{"type":"player_left","identity":"abc123","nickname":"Nick"}"#,
            "\n",
        );
        let stats = run_json_lines(input.as_bytes(), &bus).await.expect("bridge");

        assert_eq!(
            stats,
            BridgeStats {
                delivered: 1,
                malformed: 1,
                unhandled: 1,
            }
        );
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
