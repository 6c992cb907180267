pub mod client;
pub mod handler;
pub mod models;
mod service;

pub use service::{release_interrupted, Pipeline};
