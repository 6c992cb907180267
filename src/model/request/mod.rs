pub mod approval_requests;
pub mod evidence_requests;
pub mod node_requests;
pub mod search_requests;
