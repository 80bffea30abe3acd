//! State graph: nodes + explicit edges (from → to) and conditional routing.
//!
//! Add nodes with `add_node`, define the chain with `add_edge(from, to)`
//! using [`START`] and [`END`] for graph entry/exit, and
//! `add_conditional_edges` to route on state. `compile()` validates the
//! topology and returns a [`CompiledStateGraph`] that can `invoke` (final
//! state) or `stream` (a snapshot after every node), honoring cooperative
//! cancellation at each step.

mod compile_error;
mod compiled;
mod next;
mod node;
mod state_graph;
mod visualization;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, GraphEvent};
pub use next::Next;
pub use node::Node;
pub use state_graph::{ConditionalRouter, ConditionalRouterFn, NextEntry, StateGraph, END, START};
pub use visualization::{generate_dot, generate_text};
