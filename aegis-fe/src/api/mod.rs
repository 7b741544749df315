//! HTTP API handlers for aegis-fe

pub mod admin;
pub mod feedback;
pub mod health;

pub use admin::admin_routes;
pub use feedback::feedback_routes;
pub use health::health_routes;
