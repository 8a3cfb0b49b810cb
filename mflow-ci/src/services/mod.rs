//! Business logic services for mflow-ci

pub mod envelope;
pub mod harvester;
pub mod reconciler;
pub mod workflow_client;

pub use envelope::{decode_envelope, Decoded};
pub use harvester::{CycleSummary, Harvester};
pub use reconciler::{BatchOutcome, ItemError, Reconciler};
pub use workflow_client::{RawEnvelope, WorkflowClient, WorkflowError, WorkflowKind};
