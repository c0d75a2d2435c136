//! Document-analysis and audio-narration pipeline.
//!
//! Accepts page images (or fallback text), analyzes each page with a
//! vision-capable generation model, aggregates the results into a
//! document summary, and can narrate stored documents as single-voice
//! or two-host podcast audio.
//!
//! The crate is the pipeline core only: jobs run on an in-process queue
//! ([`jobs::queue::JobQueue`]) against injected service handles
//! ([`jobs::queue::Services`]), so any HTTP surface stays a thin wrapper
//! and every external collaborator can be faked in tests.

pub mod analyze;
pub mod chunking;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pages;
pub mod script;
pub mod services;
pub mod speech;

pub use config::{Config, PipelineConfig};
pub use error::JobError;
pub use jobs::monitor::JobMonitor;
pub use jobs::progress::{JobState, ProgressStore, StatusSnapshot};
pub use jobs::queue::{ActiveUnit, JobQueue, Services, UnitBoard};
pub use jobs::{AudioArtifact, DocumentReport, JobKind, JobOutput, JobRequest, PageInput};
pub use script::ScriptStyle;
