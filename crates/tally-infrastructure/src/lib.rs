//! Storage layer for Tally.
//!
//! Settings file paths, the atomic TOML primitive, and the persisted-state
//! repository implementation.

pub mod paths;
pub mod state_repository;
pub mod storage;

pub use state_repository::StateRepositoryImpl;
