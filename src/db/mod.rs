pub mod jobs;
pub mod layers;
pub mod models;
pub mod pool;

pub use pool::{DbPool, Database};
