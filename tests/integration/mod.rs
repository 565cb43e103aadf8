mod cancel;
mod enqueue;
mod health;
mod queue_status;
