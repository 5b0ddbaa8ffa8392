//! Core domain types.

pub mod market;
pub mod order;
pub mod position;
pub mod strategy;

pub use market::*;
pub use order::*;
pub use position::*;
pub use strategy::*;
