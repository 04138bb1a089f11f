//! moodmated — HTTP daemon serving facial emotion predictions with
//! matching music recommendations.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use server::{build_router, AppContext};
