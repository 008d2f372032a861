pub mod cache;
pub mod clock;
pub mod db;
pub mod memory_store;
pub mod pg_store;
pub mod queue;
pub mod store;
pub mod storage;
pub mod triage_client;
