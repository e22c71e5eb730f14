//! Circuit bookkeeping and the per-tick stepping protocol.
//!
//! A [`Circuit`] owns every component added to it, the nodes their
//! terminals refer to, and the assembled MNA system. Components are reached
//! through typed [`Handle`]s; nodes are merged by union-find when terminals
//! are wired together.

mod config;
mod graph;
mod node;
mod types;
mod validate;

pub use config::CircuitConfig;
pub use graph::{Circuit, Dot, StepReport};
pub use node::Node;
pub use types::*;
pub use validate::validate_circuit;
