//! SQLite stores: the read-only backlog and catalog, and the shared cache

pub mod backlog;
pub mod sqlite_helpers;
pub mod torrent_details;

pub use backlog::{BacklogLoad, BacklogRepository, load_runtimes};
pub use torrent_details::{DetailsStore, SqliteDetailsStore, StoreError, load_done_hashes};
