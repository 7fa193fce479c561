pub mod backend;
pub mod devices;
pub mod media;
pub mod metrics;
