//! Session-related types.
//!
//! Types stored in the session by the external sign-in flow.

use serde::{Deserialize, Serialize};

use marigold_core::UserId;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Whether the user may use the operator endpoints.
    #[serde(default)]
    pub is_admin: bool,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_current_user_wire_format() {
        let user: CurrentUser = serde_json::from_str(r#"{"id": 42, "isAdmin": true}"#).unwrap();
        assert_eq!(user.id, UserId::new(42));
        assert!(user.is_admin);

        let user: CurrentUser = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert!(!user.is_admin);
    }
}
