//! Boundary with the external finding extraction agent.
//!
//! The agent itself (an LLM behind some API) lives outside this workspace. This
//! crate defines what the rest of the system needs from it: a trait to call,
//! tolerant parsing of raw model responses, the validate-and-retry loop, and
//! the prompts an agent implementation is expected to send.

pub mod agent;
pub mod prompts;

pub use agent::*;
pub use prompts::*;
