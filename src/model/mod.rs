pub mod api;
pub mod error;
pub mod node_types;
pub mod repository;
pub mod request;
pub mod response;
