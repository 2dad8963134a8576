pub mod config;
pub mod detectors;
pub mod dsp;
pub mod error;
pub mod io;
pub mod montage;
pub mod pipeline;
pub mod plot;
pub mod progress;
pub mod signal;
pub mod synth;
pub mod worker;

pub use config::QcConfig;
pub use detectors::bridge::{detect, detect_with, BridgeReport, DistanceMatrix};
pub use error::{QcError, QcResult};
pub use montage::{normalize, normalize_with, CanonicalLayout, NormalizedRecording};
pub use pipeline::{BridgeRun, Pipeline};
pub use progress::{CancelToken, ProgressEvent, ProgressSink};
pub use signal::{Channel, Recording};
