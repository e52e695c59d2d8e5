//! Scenario tests for the routing graph
//!
//! These drive the graph only through its public API:
//! - Class routing and bootstrap
//! - Entity lifecycle and destruction notices
//! - Frequency limiting and the player state throttle
//! - Streaming region lists
//! - Spatial gathers and parallel gather parity

#[cfg(test)]
pub mod support;

#[cfg(test)]
pub mod routing_test;


#[cfg(test)]
pub mod throttling_test;

#[cfg(test)]
pub mod streaming_test;
