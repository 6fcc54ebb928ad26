use std::path::Path;

use cram_core::db::wipe_user;

use crate::commands::common::{open_database, session_store, stored_user};
use crate::error::CliError;

pub async fn run_wipe(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::WipeNotConfirmed);
    }
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let removed = wipe_user(db.connection(), &user).await?;
    println!("Removed {removed} local rows for {user}");
    Ok(())
}
