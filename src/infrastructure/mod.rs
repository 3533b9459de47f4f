//! Stand-in implementations of the domain ports: in-memory repositories,
//! a JSON-backed config store, and a filesystem Agent for local use.

pub mod in_memory;
pub mod local_agent;
pub mod static_store;
