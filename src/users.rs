//! Account users (`/account/users`).
//!
//! Users are addressed by username. The server assigns `password_created`
//! and `user_type`; both are absent from the create options and excluded
//! when comparing a created user against its input.

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::resource::{Resource, Resources};

/// A user on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique login name; also the identifier in item paths.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Restricted users only see what they are granted.
    pub restricted: bool,
    /// Labels of the SSH keys attached to the user.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Whether two-factor authentication is enabled.
    #[serde(default)]
    pub tfa_enabled: bool,
    /// Verified phone number, if one has been confirmed.
    #[serde(default)]
    pub verified_phone_number: Option<String>,
    /// When the password was last set (server-assigned).
    #[serde(default)]
    pub password_created: Option<String>,
    /// Account role such as `"default"` or `"parent"` (server-assigned).
    #[serde(default)]
    pub user_type: Option<String>,
}

impl User {
    /// Options that would update another user to match this one's
    /// caller-controlled fields.
    pub fn update_options(&self) -> UserUpdateOptions {
        UserUpdateOptions {
            username: Some(self.username.clone()),
            email: Some(self.email.clone()),
            restricted: Some(self.restricted),
        }
    }
}

/// Fields for creating a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserCreateOptions {
    /// Unique login name.
    pub username: String,
    /// Contact address; the invitation is sent here.
    pub email: String,
    /// Whether the user starts out restricted.
    pub restricted: bool,
}

/// Fields for a partial user update. `None` fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdateOptions {
    /// New login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New contact address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New restriction flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted: Option<bool>,
}

/// The `/account/users` collection.
#[derive(Debug, Clone, Copy)]
pub struct Users;

impl Resource for Users {
    type Item = User;
    type CreateOptions = UserCreateOptions;
    type UpdateOptions = UserUpdateOptions;

    const NAME: &'static str = "user";
    const COLLECTION_PATH: &'static str = "account/users";
    const ITEM_PATH: &'static str = "account/users/{id}";
    const SERVER_ASSIGNED_FIELDS: &'static [&'static str] = &["password_created", "user_type"];
}

impl Client {
    /// CRUD access to account users.
    pub fn users(&self) -> Resources<Users> {
        self.resources()
    }
}
