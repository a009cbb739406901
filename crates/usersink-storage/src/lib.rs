//! usersink-storage: Storage abstraction layer
//!
//! This crate provides the storage collaborator consumed by the usersink
//! pipeline:
//! - `User` record and search types
//! - `UserStore` trait for storage operations
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             usersink-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - UserStore trait, User type   │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - StorageError                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryUserStore;
pub use traits::{
    validate_user, User, UserId, UserSearchParams, UserSearchResult, UserStore, MAX_FIELD_LENGTH,
};
