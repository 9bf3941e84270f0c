mod auth;
mod session;
mod supabase;

pub use auth::{AuthClient, Session, SessionStore};
pub use session::{SessionManager, TokenSource};
pub use supabase::{BookmarkBackend, SupabaseClient};
