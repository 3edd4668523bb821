use uuid::Uuid;
use crate::errors::ServiceError;

/// Represents the caller of the current operation.
///
/// The context is passed into every entry point explicitly; nothing in the
/// crate reads the caller from ambient state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The ID of the authenticated user, `None` for anonymous callers
    pub user_id: Option<Uuid>,

    /// Free-form identifier of the calling client, used only for logging
    pub device_id: String,
}

impl AuthContext {
    /// Create a new authentication context for a known user
    pub fn new(user_id: Uuid, device_id: String) -> Self {
        Self {
            user_id: Some(user_id),
            device_id,
        }
    }

    /// Context for a caller without an identity
    pub fn anonymous(device_id: String) -> Self {
        Self {
            user_id: None,
            device_id,
        }
    }

    /// Return the caller's user id or fail with `Unauthorized`
    pub fn require_user(&self) -> Result<Uuid, ServiceError> {
        self.user_id.ok_or_else(|| {
            ServiceError::Unauthorized("No authenticated caller".to_string())
        })
    }
}
