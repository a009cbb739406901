//! usersink-server: Configuration, logging and service wiring
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               usersink-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  observability/ - Structured logging        │
//! │  pipeline.rs    - Saver + resolver assembly │
//! │  main.rs        - `usersink` binary         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod pipeline;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServiceConfig};
pub use observability::{init_logging, LoggingConfig};
pub use pipeline::Pipeline;
