//! Centralized constants for the slicemirror project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod mirroring;
pub mod paths;
pub mod state;
