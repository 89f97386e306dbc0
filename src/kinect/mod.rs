// Kinect v2 domain: driver boundary, session, config and drivers.

pub mod api;
pub mod config;
pub mod dummy;
pub mod error;
pub mod mock;
pub mod session;
pub mod stats;
pub mod types;
