//! HTTP and WebSocket handlers for ecg-replay

pub mod health;
pub mod heart_rate;
pub mod intake;
pub mod observations;
pub mod stream;

pub use health::health_routes;
pub use heart_rate::heart_rate_routes;
pub use intake::intake_routes;
pub use observations::observation_routes;
