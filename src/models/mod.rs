pub mod bookmark;
pub mod user;

pub use bookmark::{Bookmark, BookmarkId, NewBookmark};
pub use user::User;
