//! Domain models for the imaging findings system.

mod efl;
mod extraction;
mod ipl;

pub use efl::*;
pub use extraction::*;
pub use ipl::*;
