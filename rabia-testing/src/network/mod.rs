//! In-memory `NetworkTransport` doubles (§6). [`in_memory`] delivers
//! synchronously with no induced latency or loss, for fully deterministic
//! scenario replay; `rabia_testing::network_sim` layers latency, packet
//! loss, and partitions on top of the same registration model for chaos
//! testing.

pub mod in_memory;

pub use in_memory::{InMemoryBus, InMemoryNetwork};
