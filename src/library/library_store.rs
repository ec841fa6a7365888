use super::models::{Book, BookAccessRecord, Bookmark, Progress, ProgressSync};
use anyhow::Result;

pub trait BookStore: Send + Sync {
    /// Returns the book with the given id.
    /// Returns Ok(None) if the book does not exist.
    fn get_book(&self, book_id: &str) -> Result<Option<Book>>;

    /// Inserts or replaces a book (used by seeding).
    fn upsert_book(&self, book: &Book) -> Result<()>;

    /// Returns the whole catalog.
    fn get_all_books(&self) -> Result<Vec<Book>>;
}

pub trait AccessTokenStore: Send + Sync {
    /// Returns the stored access record for a (user, book) pair, if any.
    fn get_access_record(&self, user_id: usize, book_id: &str)
        -> Result<Option<BookAccessRecord>>;

    /// Inserts or replaces the access record for its (user, book) pair.
    fn put_access_record(&self, record: &BookAccessRecord) -> Result<()>;

    /// Refreshes last_used on the stored record.
    fn touch_access_record(&self, user_id: usize, book_id: &str) -> Result<()>;

    /// Deletes records whose expiry is in the past.
    /// Returns the number of records deleted.
    fn prune_expired_access_records(&self, now_epoch: u64) -> Result<usize>;
}

pub trait ProgressStore: Send + Sync {
    /// Returns the stored progress for a (user, book) pair, if any.
    fn get_progress(&self, user_id: usize, book_id: &str) -> Result<Option<Progress>>;

    /// Applies one progress sync: position fields are replaced, `time_spent`
    /// is added to the stored total. The read-modify-write is atomic.
    fn apply_progress_sync(
        &self,
        user_id: usize,
        book_id: &str,
        sync: &ProgressSync,
    ) -> Result<Progress>;

    /// Returns a user's bookmarks for a book, ordered by page.
    fn get_bookmarks(&self, user_id: usize, book_id: &str) -> Result<Vec<Bookmark>>;

    /// Replaces the whole bookmark list for a (user, book) pair.
    fn replace_bookmarks(
        &self,
        user_id: usize,
        book_id: &str,
        bookmarks: &[Bookmark],
    ) -> Result<()>;

    /// Adds a single bookmark.
    fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()>;

    /// Returns a bookmark by id regardless of owner; ownership checks are
    /// the caller's responsibility.
    fn get_bookmark(&self, bookmark_id: &str) -> Result<Option<Bookmark>>;

    /// Updates a bookmark in place.
    fn update_bookmark(&self, bookmark: &Bookmark) -> Result<()>;

    /// Deletes a bookmark by id.
    fn delete_bookmark(&self, bookmark_id: &str) -> Result<()>;
}

/// Combined trait for the full library storage surface.
pub trait LibraryStore: BookStore + AccessTokenStore + ProgressStore {}

impl<T: BookStore + AccessTokenStore + ProgressStore> LibraryStore for T {}
