use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::BookmarkId;

/// Per-row delete confirmation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    Idle,
    Confirming { expires_at: Instant },
}

/// Result of pressing delete on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    /// First press: waiting for a second one before `expires_at`.
    Armed { expires_at: Instant },
    /// Second press inside the window: issue the delete.
    Confirmed,
}

/// Click-to-confirm deletes. Rows not in the map are `Idle`.
#[derive(Debug)]
pub struct DeleteConfirmations {
    window: Duration,
    armed: HashMap<BookmarkId, Instant>,
}

impl DeleteConfirmations {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed: HashMap::new(),
        }
    }

    pub fn state(&self, id: &BookmarkId, now: Instant) -> ConfirmState {
        match self.armed.get(id) {
            Some(&expires_at) if now < expires_at => ConfirmState::Confirming { expires_at },
            _ => ConfirmState::Idle,
        }
    }

    pub fn is_confirming(&self, id: &BookmarkId, now: Instant) -> bool {
        matches!(self.state(id, now), ConfirmState::Confirming { .. })
    }

    pub fn press(&mut self, id: &BookmarkId, now: Instant) -> Press {
        match self.state(id, now) {
            ConfirmState::Confirming { .. } => {
                self.armed.remove(id);
                Press::Confirmed
            }
            ConfirmState::Idle => {
                let expires_at = now + self.window;
                self.armed.insert(id.clone(), expires_at);
                Press::Armed { expires_at }
            }
        }
    }

    /// Reset every confirmation whose window has passed. Returns how many were reset.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.armed.len();
        self.armed.retain(|_, expires_at| now < *expires_at);
        before - self.armed.len()
    }

    pub fn cancel(&mut self, id: &BookmarkId) {
        self.armed.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3);

    #[test]
    fn second_press_inside_window_confirms() {
        let mut confirmations = DeleteConfirmations::new(WINDOW);
        let id = BookmarkId::new("a");
        let t0 = Instant::now();

        assert_eq!(
            confirmations.press(&id, t0),
            Press::Armed { expires_at: t0 + WINDOW }
        );
        assert!(confirmations.is_confirming(&id, t0 + Duration::from_secs(1)));
        assert_eq!(confirmations.press(&id, t0 + Duration::from_secs(2)), Press::Confirmed);
        assert_eq!(confirmations.state(&id, t0 + Duration::from_secs(2)), ConfirmState::Idle);
    }

    #[test]
    fn press_after_window_rearms_instead_of_confirming() {
        let mut confirmations = DeleteConfirmations::new(WINDOW);
        let id = BookmarkId::new("a");
        let t0 = Instant::now();

        confirmations.press(&id, t0);
        let late = t0 + WINDOW;
        assert_eq!(
            confirmations.press(&id, late),
            Press::Armed { expires_at: late + WINDOW }
        );
    }

    #[test]
    fn expire_resets_only_stale_rows() {
        let mut confirmations = DeleteConfirmations::new(WINDOW);
        let t0 = Instant::now();
        confirmations.press(&BookmarkId::new("old"), t0);
        confirmations.press(&BookmarkId::new("new"), t0 + Duration::from_secs(2));

        assert_eq!(confirmations.expire(t0 + Duration::from_secs(4)), 1);
        assert!(confirmations.is_confirming(&BookmarkId::new("new"), t0 + Duration::from_secs(4)));
        assert!(!confirmations.is_confirming(&BookmarkId::new("old"), t0 + Duration::from_secs(4)));
    }

    #[test]
    fn rows_are_independent() {
        let mut confirmations = DeleteConfirmations::new(WINDOW);
        let t0 = Instant::now();
        confirmations.press(&BookmarkId::new("a"), t0);

        assert!(matches!(
            confirmations.press(&BookmarkId::new("b"), t0),
            Press::Armed { .. }
        ));

        confirmations.cancel(&BookmarkId::new("a"));
        assert!(!confirmations.is_confirming(&BookmarkId::new("a"), t0));
    }
}
