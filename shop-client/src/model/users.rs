//! Users data

use std::collections::BTreeMap;
use std::fmt;

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Newtype for user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Authenticated user record
///
/// This is also the shape the record is persisted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Avatar image url, derived from the user id if the server has none
    pub avatar: String,
}

/// Avatar url generated for the user
pub fn avatar_url(base_url: &str, id: UserId) -> String {
    format!("{}?seed={id}", base_url.trim_end_matches('/'))
}

/// User profile as returned by the profile endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    /// Explicit role - if missing, role is inferred from the staff flags
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Profile {
    pub fn role(&self) -> Role {
        match self.role {
            Some(role) => role,
            None if self.is_staff || self.is_superuser => Role::Admin,
            None => Role::User,
        }
    }

    /// Builds the user record, filling in the avatar if the server did not provide one
    pub fn into_user(self, avatar_base_url: &str) -> User {
        let role = self.role();
        let avatar = self
            .avatar
            .filter(|avatar| !avatar.is_empty())
            .unwrap_or_else(|| avatar_url(avatar_base_url, self.id));

        User {
            id: self.id,
            username: self.username,
            email: self.email,
            role,
            avatar,
        }
    }
}

/// New account data
#[derive(Clone, Serialize, Derivative)]
#[derivative(Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    #[derivative(Debug = "ignore")]
    pub password1: String,
    /// Password confirmation
    #[derivative(Debug = "ignore")]
    pub password2: String,
}

impl Registration {
    /// Checks what can be verified without asking the server
    pub fn validate(&self) -> Result<(), FieldErrors> {
        if self.password1 != self.password2 {
            let mut errors = FieldErrors::default();
            errors.insert("password2", "Passwords do not match");
            return Err(errors);
        }

        Ok(())
    }
}

/// Validation messages keyed by the form field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(field, msg)| (field.as_str(), msg.as_str()))
    }

    /// Extracts field errors from a registration error body
    ///
    /// The map is taken from the `errors` key if there is one, otherwise the whole body is the
    /// map. Messages may be either strings or lists of strings - the later are joined.
    pub fn from_body(body: &Value) -> Self {
        let map = match body.get("errors") {
            Some(Value::Object(map)) => map,
            _ => match body {
                Value::Object(map) => map,
                _ => return Self::default(),
            },
        };

        let errors = map
            .iter()
            .map(|(field, message)| {
                let message = match message {
                    Value::String(msg) => msg.clone(),
                    Value::Array(msgs) => msgs
                        .iter()
                        .map(|msg| match msg {
                            Value::String(msg) => msg.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" "),
                    other => other.to_string(),
                };
                (field.clone(), message)
            })
            .collect();

        Self(errors)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}
