//! HTTP request handlers.

pub mod batch;
pub mod delegation;
pub mod health;
pub mod transfer;

pub use batch::batch;
pub use delegation::auth_request;
pub use health::health_check;
pub use transfer::{download, upload};
