//! Service components composed by the submission pipeline

pub mod classifier;
pub mod image_store;
pub mod pipeline;
pub mod rate_limit;

pub use classifier::{HttpVisionBackend, ModerationClassifier, ModerationDecision, VisionBackend};
pub use image_store::{DataUriImageStore, ImageStore, LocalImageStore};
pub use pipeline::{SubmissionOutcome, SubmissionRequest};
pub use rate_limit::{ClientIdentity, Eligibility, RateLimitGate};
