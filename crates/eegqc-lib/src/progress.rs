use crate::error::{QcError, QcResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Human-readable progress emitted while a run is in flight. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Reading { file: String },
    Extracting { archive: String },
    Normalized { retained: usize, dropped: Vec<String> },
    Searching,
    Finished { bridged: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Reading { file } => write!(f, "Reading file: {}...", file),
            ProgressEvent::Extracting { archive } => write!(f, "Extracting archive: {}...", archive),
            ProgressEvent::Normalized { retained, dropped } if dropped.is_empty() => {
                write!(f, "Using {} EEG channels", retained)
            }
            ProgressEvent::Normalized { retained, dropped } => write!(
                f,
                "Using {} EEG channels (dropped: {})",
                retained,
                dropped.join(", ")
            ),
            ProgressEvent::Searching => write!(f, "Searching for bridges..."),
            ProgressEvent::Finished { bridged } => write!(f, "Found {} bridged pairs", bridged),
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that drops events. `report` already mirrors every event to the
/// log, so this leaves the log as the only output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&mut self, _event: ProgressEvent) {}
}

/// Forward to `sink` and mirror to the log.
pub(crate) fn report(sink: &mut dyn ProgressSink, event: ProgressEvent) {
    log::info!("{}", event);
    sink.emit(event);
}

/// Shared flag used to abort a run between blocks of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> QcResult<()> {
        if self.is_cancelled() {
            Err(QcError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub(crate) fn check_cancel(token: Option<&CancelToken>) -> QcResult<()> {
    token.map_or(Ok(()), CancelToken::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_line_matches_legacy_text() {
        let event = ProgressEvent::Reading {
            file: "sub01.cnt".into(),
        };
        assert_eq!(event.to_string(), "Reading file: sub01.cnt...");
        assert_eq!(
            ProgressEvent::Searching.to_string(),
            "Searching for bridges..."
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(ProgressEvent::Normalized {
            retained: 2,
            dropped: vec!["HEOG".into()],
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "normalized", "retained": 2, "dropped": ["HEOG"]})
        );
    }

    #[test]
    fn closures_collect_events() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: ProgressEvent| seen.push(event);
            report(&mut sink, ProgressEvent::Searching);
        }
        assert_eq!(seen, vec![ProgressEvent::Searching]);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(QcError::Cancelled)));
    }
}
