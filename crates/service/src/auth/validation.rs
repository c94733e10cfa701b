//! Request validation for the credential endpoints.
//!
//! Rules run in order (email, then password) and the first failure is reported.

use serde_json::Value;

use super::domain::Credentials;
use super::errors::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Validate a `{email, password}` request body.
///
/// Anything that is not a JSON object is treated as an empty object.
pub fn validate_credentials(body: &Value) -> Result<Credentials, AuthError> {
    let email = match body.get("email") {
        None | Some(Value::Null) => return Err(invalid("The email field is required.")),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(invalid("The email field is required.")),
        Some(Value::String(s)) if is_valid_email(s.trim()) => s.trim().to_string(),
        Some(_) => return Err(invalid("The email field must be a valid email address.")),
    };

    let password = match body.get("password") {
        None | Some(Value::Null) => return Err(invalid("The password field is required.")),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(invalid("The password field is required.")),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid("The password field must be a string.")),
    };
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(&format!("The password field must be at least {MIN_PASSWORD_LEN} characters.")));
    }

    Ok(Credentials { email, password })
}

fn invalid(msg: &str) -> AuthError {
    AuthError::Validation(msg.to_string())
}

/// Structural address check: `local@domain`, no whitespace, non-empty dot-separated domain labels.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else { return false };
    if local.is_empty() || local.contains('@') || local.len() > 64 {
        return false;
    }
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}
