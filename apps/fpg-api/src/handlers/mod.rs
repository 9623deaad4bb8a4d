//! Handlers 模块

pub mod audit;
pub mod config;
pub mod health;
pub mod local;
pub mod maintenance;
pub mod metrics;
pub mod points;
pub mod protocols;

pub use audit::*;
pub use config::*;
pub use health::*;
pub use local::*;
pub use maintenance::*;
pub use metrics::*;
pub use points::*;
pub use protocols::*;
