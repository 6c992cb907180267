pub mod api_handler;
pub mod evidence_handler;
pub mod node_handler;
pub mod search_handler;
