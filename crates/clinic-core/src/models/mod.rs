//! Domain models for the clinic records system.

mod note;
mod patient;

pub use note::*;
pub use patient::*;
