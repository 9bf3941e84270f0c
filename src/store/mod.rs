mod confirm;
mod reconciler;

pub use confirm::{DeleteConfirmations, Press};
pub use reconciler::{BookmarkStore, BookmarkView};
