//! Session countdown use case.

mod controller;

pub use controller::SessionCountdownController;
