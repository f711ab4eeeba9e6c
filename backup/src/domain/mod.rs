//! Domain models

pub mod credentials;
pub mod plan;
