pub mod archive;
pub mod gateway;
pub mod memory_store;
pub mod s3_store;
pub mod store;
