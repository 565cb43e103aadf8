pub mod common;
pub mod dispatcher;

pub use common::*;
pub use dispatcher::AppState;
