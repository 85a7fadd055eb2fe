//! # Rabia Engine
//!
//! The core consensus engine implementation for the Rabia protocol.
//!
//! This crate provides the main consensus engine that coordinates between
//! different components to implement the Rabia consensus algorithm. It handles
//! message processing, state transitions, and coordination with the network,
//! state machine, and persistence layers.
//!
//! ## Key Components
//!
//! - **RabiaEngine**: the single serial executor that owns `EngineState` and
//!   drives every protocol handler
//! - **EngineHandle**: the cloneable capability callers use to submit
//!   commands, deliver inbound messages, and notify topology changes
//! - **ProtocolConfig**: tunables for cleanup cadence, sync retry cadence,
//!   and the far-future/reaper phase windows
//! - **EngineState**: internal bookkeeping exclusively written by the
//!   engine's own task
//!
//! `RabiaEngine` is generic over its four narrow collaborators
//! (`NetworkTransport`, `Topology`, `StateMachine`, `PersistenceLayer`, all
//! defined in `rabia_core`) so production code and tests can plug in
//! different implementations without touching the engine itself. See
//! `rabia-testing` for in-memory doubles and a deterministic multi-node
//! simulator.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use rabia_engine::{RabiaEngine, ProtocolConfig};
//! use rabia_core::state_machine::InMemoryStateMachine;
//! use std::sync::Arc;
//!
//! # async fn example(network: Arc<impl rabia_core::network::NetworkTransport>,
//! #                   topology: Arc<impl rabia_core::network::Topology>,
//! #                   persistence: Arc<impl rabia_core::persistence::PersistenceLayer>) {
//! let config = ProtocolConfig::default();
//! let state_machine = InMemoryStateMachine::new();
//!
//! let (engine, handle) = RabiaEngine::new(config, state_machine, network, topology, persistence);
//! tokio::spawn(engine.run());
//!
//! let results = handle.apply(vec![rabia_core::Command::new("SET a 1")]).await.unwrap();
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod state;

pub use config::*;
pub use engine::*;
pub use state::*;
