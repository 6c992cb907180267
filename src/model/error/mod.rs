pub mod approval_errors;
pub mod blob_errors;
pub mod evidence_errors;
pub mod node_errors;
pub mod processing_errors;
