use super::models::{ReadingSession, UserAnalytics};
use anyhow::Result;

pub trait AnalyticsStore: Send + Sync {
    /// Returns the user's aggregate profile.
    /// Returns Ok(None) if the user has no profile yet.
    fn get_user_analytics(&self, user_id: usize) -> Result<Option<UserAnalytics>>;

    /// Inserts or replaces the user's aggregate profile.
    fn put_user_analytics(&self, analytics: &UserAnalytics) -> Result<()>;

    /// Deletes the user's aggregate profile (admin wipe).
    /// Returns whether a profile existed.
    fn delete_user_analytics(&self, user_id: usize) -> Result<bool>;

    /// Inserts a new reading session row.
    fn create_session(&self, session: &ReadingSession) -> Result<()>;

    /// Returns a session by id.
    fn get_session(&self, session_id: &str) -> Result<Option<ReadingSession>>;

    /// Returns the un-ended session for a (user, book) pair, if any.
    fn get_active_session(&self, user_id: usize, book_id: &str)
        -> Result<Option<ReadingSession>>;

    /// Replaces a session row in place.
    fn update_session(&self, session: &ReadingSession) -> Result<()>;
}
