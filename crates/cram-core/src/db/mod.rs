//! Local store for Cram

mod conflict_repository;
mod connection;
mod cursor_store;
mod migrations;
mod quiz_repository;
mod records;
mod result_repository;
mod srs_repository;
mod sync_table;
mod wipe;

pub use conflict_repository::{
    LibSqlSyncConflictRepository, NewConflict, SyncConflictRepository, CONFLICT_LOG_RETENTION,
};
pub use connection::Database;
pub use cursor_store::{CursorStore, LibSqlCursorStore};
pub use quiz_repository::{LibSqlQuizRepository, QuizRepository};
pub use records::TableRecord;
pub use result_repository::{LibSqlResultRepository, ResultRepository};
pub use srs_repository::{LibSqlSrsRepository, SrsRepository};
pub use sync_table::{EntityStore, SyncTable};
pub use wipe::wipe_user;
