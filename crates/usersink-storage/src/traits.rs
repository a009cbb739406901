//! UserStore trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Identifier of a stored user. `0` means the user has not been persisted yet.
pub type UserId = u64;

/// Maximum length in bytes of any string field on a user.
pub const MAX_FIELD_LENGTH: usize = 255;

/// A user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub calendar_id: u64,
    pub resume_id: u64,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub email: String,
}

impl User {
    /// Creates an unpersisted user with the given name and email.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// Sets the identifier.
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }

    /// Sets the calendar and resume references.
    pub fn with_refs(mut self, calendar_id: u64, resume_id: u64) -> Self {
        self.calendar_id = calendar_id;
        self.resume_id = resume_id;
        self
    }

    /// Sets surname and patronymic.
    pub fn with_full_name(
        mut self,
        surname: impl Into<String>,
        patronymic: impl Into<String>,
    ) -> Self {
        self.surname = surname.into();
        self.patronymic = patronymic.into();
        self
    }

    /// Whether this record has been assigned an identifier by a store.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

/// Keyset pagination parameters for [`UserStore::search_users`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchParams {
    /// Maximum number of users to return.
    pub limit: u64,
    /// Only users with an id strictly greater than this are returned.
    pub offset: UserId,
}

/// A page of users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchResult {
    pub items: Vec<User>,
    /// Offset to pass for the next page. Equal to the request offset when the
    /// page is empty.
    pub next_offset: UserId,
}

/// Validates the user-supplied fields of a record.
pub fn validate_user(user: &User) -> StorageResult<()> {
    if user.name.trim().is_empty() {
        return Err(StorageError::InvalidInput {
            message: "name cannot be empty".to_string(),
        });
    }
    if user.email.trim().is_empty() {
        return Err(StorageError::InvalidInput {
            message: "email cannot be empty".to_string(),
        });
    }
    if !user.email.contains('@') {
        return Err(StorageError::InvalidInput {
            message: format!("email is malformed: {}", user.email),
        });
    }

    let fields = [
        ("name", &user.name),
        ("surname", &user.surname),
        ("patronymic", &user.patronymic),
        ("email", &user.email),
    ];
    for (field, value) in fields {
        if value.len() > MAX_FIELD_LENGTH {
            return Err(StorageError::InvalidInput {
                message: format!(
                    "{field} exceeds maximum length of {MAX_FIELD_LENGTH} bytes (got {})",
                    value.len()
                ),
            });
        }
    }

    Ok(())
}

/// Abstract storage interface for user records.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
///
/// # Batch semantics
///
/// - [`create_users`](UserStore::create_users) is all-or-nothing from the
///   caller's point of view: either every user in the batch is stored or
///   none is.
/// - [`get_users`](UserStore::get_users) returns whichever of the requested
///   users exist. A missing user is signaled by its absence from the result,
///   never by a per-item error.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    // Single-record operations

    /// Stores a new user and returns its assigned id.
    async fn create_user(&self, user: &User) -> StorageResult<UserId>;

    /// Gets a user by id, `None` if it does not exist.
    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Replaces the stored fields of `user.id`. Returns false if no such user.
    async fn update_user(&self, user: &User) -> StorageResult<bool>;

    /// Removes a user. Returns false if no such user.
    async fn remove_user(&self, id: UserId) -> StorageResult<bool>;

    // Batch operations

    /// Stores a batch of new users, returning their ids in input order.
    async fn create_users(&self, users: &[User]) -> StorageResult<Vec<UserId>>;

    /// Gets the subset of `ids` that exist.
    async fn get_users(&self, ids: &[UserId]) -> StorageResult<Vec<User>>;

    /// Lists users ordered by id, starting after `params.offset`.
    async fn search_users(&self, params: UserSearchParams) -> StorageResult<UserSearchResult>;
}
