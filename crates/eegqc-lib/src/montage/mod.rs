//! Standard electrode layout and channel-name reconciliation.

pub mod layout;
pub mod normalize;

pub use layout::{CanonicalLayout, Electrode, HEAD_RADIUS};
pub use normalize::{normalize, normalize_with, NormalizedChannel, NormalizedRecording};
