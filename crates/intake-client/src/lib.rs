#![allow(missing_docs)]

pub mod autosave;
pub mod client;
pub mod config;
pub mod controller;
pub mod persistence;
pub mod pipeline;

pub use autosave::AutoSaver;
pub use client::{AnalysisClient, ClientError, HttpAnalysisClient, error_detail};
pub use config::{ConfigError, IntakeConfig};
pub use controller::FormController;
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, STATE_FILE, SnapshotStore, StoreError};
pub use pipeline::{FailureKind, PipelineState, SubmissionPipeline, SubmitError, SubmitOutcome};
