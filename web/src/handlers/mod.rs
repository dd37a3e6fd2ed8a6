//! HTTP request handlers.
//!
//! One module per resource. Handlers only translate between HTTP and the
//! runtime services; every rule lives below them.

pub mod dispenses;
pub mod health;
pub mod medicines;
pub mod prescriptions;

pub use health::health_check;
