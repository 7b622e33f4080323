//! Data model for a forge deployment
//!
//! The model mirrors the structure of `forge.kdl`: one deployment header,
//! one provider, one machine shape shared by every host, SSH access
//! settings, and a list of hosts each running a single Docker service.

mod forge;
mod host;

// Re-exports
pub use forge::*;
pub use host::*;
