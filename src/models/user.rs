use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Maximum username length, matching the `users.username` column.
pub const USERNAME_MAX_LEN: usize = 150;

/// Minimum password length accepted at signup.
pub const PASSWORD_MIN_LEN: usize = 8;

/// A registered account. Authors posts and comments, follows other users.
///
/// The password hash is skipped on serialization so a `User` can be handed to
/// templates and logs without leaking it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Signup form payload (`POST /auth/signup/`).
#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// Login form payload (`POST /auth/login/`).
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

impl User {
    /// Build a user with a fresh id. The caller supplies an already hashed password.
    pub fn new(username: String, password_hash: String) -> Self {
        User {
            id: Uuid::new_v4(),
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}

impl SignupForm {
    /// Checks username shape and that both password fields agree.
    pub fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;

        if self.password1.chars().count() < PASSWORD_MIN_LEN {
            return Err(format!(
                "Password must contain at least {} characters",
                PASSWORD_MIN_LEN
            ));
        }

        if self.password1 != self.password2 {
            return Err("The two password fields didn't match".to_string());
        }

        Ok(())
    }

    pub fn get_normalized_username(&self) -> String {
        self.username.trim().to_string()
    }
}

/// Usernames are 1..=150 characters of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();

    if username.is_empty() {
        return Err("Username cannot be empty".to_string());
    }

    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(format!(
            "Username cannot exceed {} characters",
            USERNAME_MAX_LEN
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(
            "Username may contain only letters, digits and @/./+/-/_ characters".to_string(),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, password1: &str, password2: &str) -> SignupForm {
        SignupForm {
            username: username.to_string(),
            password1: password1.to_string(),
            password2: password2.to_string(),
        }
    }

    #[test]
    fn test_user_creation() {
        let user = User::new("NoName".to_string(), "hash".to_string());

        assert_ne!(user.id, Uuid::nil());
        assert_eq!(user.username, "NoName");
        assert!(user.created_at <= Utc::now());
        assert_eq!(user.to_string(), "NoName");
    }

    #[test]
    fn test_signup_form_validation() {
        assert!(signup("NoName", "secret-pass", "secret-pass").validate().is_ok());
        assert!(signup("Имя.пользователя", "secret-pass", "secret-pass").validate().is_ok());

        // Empty username
        assert!(signup("   ", "secret-pass", "secret-pass").validate().is_err());

        // Forbidden characters
        assert!(signup("no name", "secret-pass", "secret-pass").validate().is_err());
        assert!(signup("no/name", "secret-pass", "secret-pass").validate().is_err());

        // Username too long
        assert!(signup(&"a".repeat(151), "secret-pass", "secret-pass").validate().is_err());

        // Short password
        assert!(signup("NoName", "short", "short").validate().is_err());

        // Mismatch
        assert!(signup("NoName", "secret-pass", "secret-pasS").validate().is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User::new("NoName".to_string(), "$argon2id$secret".to_string());

        let json = serde_json::to_string(&user).expect("Failed to serialize user");
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"username\":\"NoName\""));
    }

    #[test]
    fn test_login_form_deserialization() {
        let json = r#"{"username":"NoName","password":"secret-pass"}"#;
        let form: LoginForm = serde_json::from_str(json).expect("Failed to deserialize LoginForm");

        assert_eq!(form.username, "NoName");
        assert_eq!(form.password, "secret-pass");
        assert_eq!(form.next, None);
    }
}
