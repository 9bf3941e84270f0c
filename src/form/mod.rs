pub mod validator;

pub use validator::{Field, FieldErrors, ValidBookmark};
use validator::validate;

use crate::models::BookmarkId;

/// State of the "Add bookmark" form.
#[derive(Debug, Clone)]
pub struct AddForm {
    pub title: String,
    pub url: String,
    pub focus: Field,
    pub errors: FieldErrors,
    pub api_error: Option<String>,
    /// Speculative id of the submission in flight, if any.
    pub pending: Option<BookmarkId>,
}

impl Default for AddForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            focus: Field::Title,
            errors: FieldErrors::default(),
            api_error: None,
            pending: None,
        }
    }
}

impl AddForm {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Url => &self.url,
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Title => &mut self.title,
            Field::Url => &mut self.url,
        }
    }

    /// Editing a field clears its inline error.
    pub fn input_char(&mut self, c: char) {
        if self.is_pending() {
            return;
        }
        self.focused_mut().push(c);
        self.errors.clear(self.focus);
    }

    pub fn backspace(&mut self) {
        if self.is_pending() {
            return;
        }
        self.focused_mut().pop();
        self.errors.clear(self.focus);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Field::Title => Field::Url,
            Field::Url => Field::Title,
        };
    }

    /// Validate the inputs. On failure the errors are stored and focus moves to the
    /// first offending field. Returns `None` while a submission is already in flight.
    pub fn submit(&mut self) -> Option<ValidBookmark> {
        if self.is_pending() {
            return None;
        }
        self.api_error = None;

        match validate(&self.title, &self.url) {
            Ok(valid) => {
                self.errors = FieldErrors::default();
                Some(valid)
            }
            Err(errors) => {
                if let Some(first) = errors.title.or(errors.url) {
                    self.focus = first.field();
                }
                self.errors = errors;
                None
            }
        }
    }

    /// The submission succeeded: clear everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The submission failed: keep the inputs, show the backend message.
    pub fn fail(&mut self, message: String) {
        self.pending = None;
        self.api_error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::FieldError;

    fn typed(form: &mut AddForm, text: &str) {
        text.chars().for_each(|c| form.input_char(c));
    }

    #[test]
    fn submit_with_empty_fields_reports_both_and_focuses_title() {
        let mut form = AddForm {
            focus: Field::Url,
            ..AddForm::default()
        };

        assert!(form.submit().is_none());
        assert_eq!(form.errors.title, Some(FieldError::TitleRequired));
        assert_eq!(form.errors.url, Some(FieldError::UrlRequired));
        assert_eq!(form.focus, Field::Title);
    }

    #[test]
    fn typing_clears_the_focused_fields_error() {
        let mut form = AddForm::default();
        form.submit();

        typed(&mut form, "E");
        assert_eq!(form.errors.title, None);
        assert_eq!(form.errors.url, Some(FieldError::UrlRequired));
    }

    #[test]
    fn valid_submit_normalizes_and_clears_api_error() {
        let mut form = AddForm::default();
        typed(&mut form, "Example");
        form.toggle_focus();
        typed(&mut form, "example.com");
        form.api_error = Some("old".to_string());

        let valid = form.submit().unwrap();
        assert_eq!(valid.url, "https://example.com");
        assert_eq!(form.api_error, None);
        assert!(form.errors.is_empty());
    }

    #[test]
    fn pending_form_ignores_input_and_resubmission() {
        let mut form = AddForm::default();
        typed(&mut form, "Example");
        form.pending = Some(BookmarkId::new("optimistic-1-0"));

        typed(&mut form, "!!");
        assert_eq!(form.value(Field::Title), "Example");
        assert!(form.submit().is_none());
    }

    #[test]
    fn failure_keeps_inputs_and_reset_clears_them() {
        let mut form = AddForm::default();
        typed(&mut form, "Example");
        form.pending = Some(BookmarkId::new("optimistic-1-0"));

        form.fail("insert rejected".to_string());
        assert!(!form.is_pending());
        assert_eq!(form.title, "Example");
        assert_eq!(form.api_error.as_deref(), Some("insert rejected"));

        form.reset();
        assert!(form.title.is_empty());
        assert_eq!(form.api_error, None);
    }
}
