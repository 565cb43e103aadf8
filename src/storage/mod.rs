pub mod s3;

pub use s3::{S3Storage, layer_key};
