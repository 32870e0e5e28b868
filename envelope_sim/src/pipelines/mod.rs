//! Envelope generation passes, from speed limits to the fastest feasible profile.

pub mod max_effort;
pub mod max_speed;
pub mod overlays;
