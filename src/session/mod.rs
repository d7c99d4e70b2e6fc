//! Per-flow sessions: buffering, flow control and the lifecycle driven by client packets.

pub mod byte_stream;
pub mod flow;
pub mod guard;
pub mod handler;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;
pub mod state;
