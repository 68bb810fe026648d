//! Core types shared by every layer: protocol constants, errors and the
//! traits the engine is parameterised over.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
