//! Background execution of a pipeline run.
//!
//! The pipeline runs on its own thread and hands progress and the final
//! outcome back over a channel, so a front-end can keep its own thread free
//! and render only on the thread that owns the display.

use crate::config::QcConfig;
use crate::pipeline::{BridgeRun, Pipeline};
use crate::progress::{CancelToken, ProgressEvent, ProgressSink};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::thread::JoinHandle;

/// Message delivered from the worker thread.
#[derive(Debug, Clone)]
pub enum RunMessage {
    Progress(ProgressEvent),
    Finished(Box<BridgeRun>),
    Failed(String),
}

impl RunMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunMessage::Progress(_))
    }
}

/// Forwards events into the channel; a dropped receiver is ignored.
struct ChannelSink(Sender<RunMessage>);

impl ProgressSink for ChannelSink {
    fn emit(&mut self, event: ProgressEvent) {
        let _ = self.0.send(RunMessage::Progress(event));
    }
}

pub struct RunHandle {
    rx: Receiver<RunMessage>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

/// Start a run of `path` on a new thread.
pub fn spawn(path: impl Into<PathBuf>, config: QcConfig) -> RunHandle {
    let path = path.into();
    let cancel = CancelToken::new();
    let (tx, rx) = bounded(32);
    let pipeline = Pipeline::new(config).with_cancel(cancel.clone());
    let handle = std::thread::spawn(move || {
        let mut sink = ChannelSink(tx.clone());
        let message = match pipeline.run(&path, &mut sink) {
            Ok(run) => RunMessage::Finished(Box::new(run)),
            Err(err) => {
                log::error!("bridge search on {} failed: {}", path.display(), err);
                RunMessage::Failed(err.to_string())
            }
        };
        let _ = tx.send(message);
    });
    RunHandle {
        rx,
        cancel,
        handle: Some(handle),
    }
}

impl RunHandle {
    pub fn receiver(&self) -> &Receiver<RunMessage> {
        &self.rx
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the run ends, discarding progress.
    pub fn wait(self) -> Result<BridgeRun, String> {
        self.wait_with(&mut |_event: ProgressEvent| {})
    }

    /// Block until the run ends, forwarding progress to `progress`.
    pub fn wait_with(mut self, progress: &mut dyn ProgressSink) -> Result<BridgeRun, String> {
        let outcome = loop {
            match self.rx.recv() {
                Ok(RunMessage::Progress(event)) => progress.emit(event),
                Ok(RunMessage::Finished(run)) => break Ok(*run),
                Ok(RunMessage::Failed(message)) => break Err(message),
                Err(_) => break Err("worker exited without a result".to_string()),
            }
        };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        outcome
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            // drain so a blocked sender can finish
            while self.rx.recv().is_ok() {}
            let _ = handle.join();
        }
    }
}
