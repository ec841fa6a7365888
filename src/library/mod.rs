pub mod library_store;
pub mod models;

mod sqlite_library_store;

pub use library_store::{AccessTokenStore, BookStore, LibraryStore, ProgressStore};
pub use models::{Book, BookAccessRecord, Bookmark, Progress, ProgressSync};
pub use sqlite_library_store::SqliteLibraryStore;
