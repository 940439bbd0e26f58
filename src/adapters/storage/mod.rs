//! Checkpoint storage adapters.

mod in_memory_checkpoint_store;

pub use in_memory_checkpoint_store::InMemoryCheckpointStore;
