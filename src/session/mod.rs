//! Session data model: sessions and the status derived from the active one.
//!
//! A session is created by `begin`, closed once by `end`, and never changed afterwards.

pub mod types;

pub use types::*;
