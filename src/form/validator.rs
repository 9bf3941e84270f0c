use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

static SCHEME_RE: OnceLock<Regex> = OnceLock::new();

fn scheme_re() -> &'static Regex {
    SCHEME_RE.get_or_init(|| Regex::new(r"(?i)^https?://").expect("scheme pattern is valid"))
}

/// Trim and default the scheme to `https://`. Empty input stays empty.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || scheme_re().is_match(trimmed) {
        return trimmed.to_string();
    }
    format!("https://{trimmed}")
}

/// True when `url` parses as an absolute URL.
pub fn is_valid_url(url: &str) -> bool {
    !url.is_empty() && Url::parse(url).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    TitleRequired,
    UrlRequired,
    UrlInvalid,
}

impl FieldError {
    pub fn field(self) -> Field {
        match self {
            FieldError::TitleRequired => Field::Title,
            FieldError::UrlRequired | FieldError::UrlInvalid => Field::Url,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FieldError::TitleRequired => "Title is required",
            FieldError::UrlRequired => "URL is required",
            FieldError::UrlInvalid => "Please enter a valid URL",
        };
        f.write_str(msg)
    }
}

/// Per-field validation failures, at most one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub title: Option<FieldError>,
    pub url: Option<FieldError>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }

    pub fn get(&self, field: Field) -> Option<FieldError> {
        match field {
            Field::Title => self.title,
            Field::Url => self.url,
        }
    }

    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Title => self.title = None,
            Field::Url => self.url = None,
        }
    }
}

/// Input that passed validation: trimmed title, normalized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBookmark {
    pub title: String,
    pub url: String,
}

pub fn validate(title: &str, url: &str) -> Result<ValidBookmark, FieldErrors> {
    let mut errors = FieldErrors::default();

    let title = title.trim();
    if title.is_empty() {
        errors.title = Some(FieldError::TitleRequired);
    }

    let normalized = normalize_url(url);
    if normalized.is_empty() {
        errors.url = Some(FieldError::UrlRequired);
    } else if !is_valid_url(&normalized) {
        errors.url = Some(FieldError::UrlInvalid);
    }

    if errors.is_empty() {
        Ok(ValidBookmark {
            title: title.to_string(),
            url: normalized,
        })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemeless_input_gets_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com/path  "), "https://example.com/path");
        assert_eq!(normalize_url("ftp.example.com"), "https://ftp.example.com");
    }

    #[test]
    fn schemed_input_is_kept() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("HTTPS://Example.com"), "HTTPS://Example.com");
        assert_eq!(normalize_url(" https://a.io "), "https://a.io");
    }

    #[test]
    fn blank_input_stays_empty() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn only_absolute_urls_are_valid() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://localhost:3000/x?y=1"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("example.com"));
        assert!(!is_valid_url("https://not a url"));
    }

    #[test]
    fn garbage_fails_after_normalization() {
        let normalized = normalize_url("not a url");
        assert_eq!(normalized, "https://not a url");
        assert!(!is_valid_url(&normalized));
    }

    #[test]
    fn validate_returns_trimmed_title_and_normalized_url() {
        let valid = validate("  Example ", "example.com").unwrap();
        assert_eq!(valid.title, "Example");
        assert_eq!(valid.url, "https://example.com");
    }

    #[test]
    fn validate_tags_errors_to_their_fields() {
        let errors = validate(" ", "").unwrap_err();
        assert_eq!(errors.title, Some(FieldError::TitleRequired));
        assert_eq!(errors.url, Some(FieldError::UrlRequired));

        let errors = validate("Title", "not a url").unwrap_err();
        assert_eq!(errors.title, None);
        assert_eq!(errors.get(Field::Url), Some(FieldError::UrlInvalid));
        assert_eq!(FieldError::UrlInvalid.field(), Field::Url);
        assert_eq!(FieldError::UrlInvalid.to_string(), "Please enter a valid URL");
    }
}
