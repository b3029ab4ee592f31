//! Persisted FIFO queue of pending mutations.
//!
//! Writes made while offline land here and wait for the orchestrator to
//! deliver them. Enqueue order is drain order, so the server observes
//! mutations in the same causal order the farmer made them.

pub mod pending;

pub use pending::PendingQueue;
