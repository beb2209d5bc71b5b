use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Minimum password length accepted by the sign-in form.
const MIN_PASSWORD_LENGTH: usize = 1;

/// The signed-in user's profile as returned by `POST sessions` and `PUT profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    /// First name for greetings ("Welcome, Ana")
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SignInCredentials {
    pub email: String,
    pub password: String,
}

impl SignInCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Form-level validation run by callers before `sign_in`.
    /// Returns a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err("E-mail is required".to_string());
        }
        if !email.contains('@') {
            return Err("Enter a valid e-mail".to_string());
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err("Password is required".to_string());
        }
        Ok(())
    }
}

/// Body of `PUT profile`. Password fields are only sent when changing the password.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirmation: Option<String>,
}

impl ProfileUpdate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_password_change(mut self, old_password: &str, new_password: &str) -> Self {
        self.old_password = Some(old_password.to_string());
        self.password = Some(new_password.to_string());
        self.password_confirmation = Some(new_password.to_string());
        self
    }
}
