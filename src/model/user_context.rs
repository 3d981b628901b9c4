use serde::{Deserialize, Serialize};

/// Caller identity extracted from request headers, recorded in change logs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl UserContext {
    /// Create a new UserContext with just a user ID
    pub fn new(user_id: String) -> Self {
        Self {
            user_id: Some(user_id),
            user_email: None,
            user_name: None,
        }
    }

    /// Create a UserContext with full user information
    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id: Some(user_id),
            user_email: email,
            user_name: name,
        }
    }

    /// Requests without identification headers
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Internal operations such as seeding and index rebuilds
    pub fn system() -> Self {
        Self {
            user_id: Some("system".to_string()),
            user_email: None,
            user_name: Some("System".to_string()),
        }
    }
}
