pub mod table;
pub mod types;

pub use types::{QueueName, Task, TaskType};
