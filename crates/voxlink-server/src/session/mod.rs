//! Client sessions: per-identity state and the guild adapter seam.

pub mod client;

pub use client::{ClientSession, GuildAdapter};
