use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The authenticated user as returned by the auth API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl User {
    pub fn display_name(&self) -> String {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.trim().is_empty()).map(str::to_string);

        non_empty(&self.user_metadata.full_name)
            .or_else(|| non_empty(&self.user_metadata.name))
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "User".to_string())
    }

    pub fn initials(&self) -> String {
        self.display_name()
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .take(2)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(full_name: Option<&str>, name: Option<&str>, email: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            email: email.map(str::to_string),
            user_metadata: UserMetadata {
                avatar_url: None,
                full_name: full_name.map(str::to_string),
                name: name.map(str::to_string),
            },
        }
    }

    #[test]
    fn display_name_prefers_full_name_then_name_then_email() {
        assert_eq!(user(Some("Ada Lovelace"), Some("ada"), None).display_name(), "Ada Lovelace");
        assert_eq!(user(None, Some("ada"), Some("x@y.z")).display_name(), "ada");
        assert_eq!(user(None, None, Some("grace@navy.mil")).display_name(), "grace");
        assert_eq!(user(None, None, None).display_name(), "User");
    }

    #[test]
    fn initials_take_first_two_words() {
        assert_eq!(user(Some("ada king lovelace"), None, None).initials(), "AK");
        assert_eq!(user(None, None, Some("grace@navy.mil")).initials(), "G");
    }

    #[test]
    fn tolerates_missing_metadata() {
        let u: User = serde_json::from_str(r#"{"id":"u1","email":"a@b.c"}"#).unwrap();
        assert_eq!(u.user_metadata, UserMetadata::default());
        assert_eq!(u.display_name(), "a");
    }
}
