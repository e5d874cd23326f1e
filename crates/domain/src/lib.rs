//! skyrelay domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Application use cases / business logic
//! - `zone`: Display timezone conversion

pub mod model;
pub mod ports;
pub mod usecases;
pub mod zone;

pub use model::*;
pub use ports::*;
