//! Sandboxed filesystem layer.
//! Everything the HTTP surface does to disk goes through here: path
//! resolution with containment proofs ([`paths`]), symlink classification
//! for listings ([`classify`]), directory listing with pagination
//! ([`list`]), and the mutation operations ([`ops`]). No other module may
//! touch the filesystem with a client-supplied path.

pub mod classify;
pub mod list;
pub mod ops;
pub mod paths;

pub use paths::Sandbox;
