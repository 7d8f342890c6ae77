//! Tool providers served by the MCP engine.
//!
//! - [`DiceRoller`]: rolls dice, the stock collaborator wired up by the binary

pub mod dice;

pub use dice::DiceRoller;
