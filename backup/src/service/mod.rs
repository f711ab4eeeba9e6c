//! Service layer

pub mod backup;
