use cram_core::auth::{
    unix_timestamp_now, AuthSession, AuthUser, SessionPersistence, StoredSession,
};
use cram_core::util::normalize_text_option;

use crate::cli::AuthCommands;
use crate::commands::common::session_store;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands) -> Result<(), CliError> {
    let store = session_store();
    match command {
        AuthCommands::Set {
            access_token,
            refresh_token,
            user_id,
            email,
            expires_in,
        } => {
            let session = build_session(access_token, refresh_token, user_id, email, expires_in);
            store.save_session(&session)?;
            println!("Stored session for {}", session_label(&session));
            Ok(())
        }
        AuthCommands::Status => {
            println!("{}", auth_status_line(&store)?);
            Ok(())
        }
        AuthCommands::Clear => {
            store.clear_session()?;
            println!("Signed out");
            Ok(())
        }
    }
}

pub fn build_session(
    access_token: String,
    refresh_token: Option<String>,
    user_id: String,
    email: Option<String>,
    expires_in: i64,
) -> AuthSession {
    AuthSession {
        access_token: access_token.trim().to_string(),
        refresh_token: normalize_text_option(refresh_token),
        expires_at: unix_timestamp_now().saturating_add(expires_in.max(0)),
        user: AuthUser {
            id: user_id.trim().to_string(),
            email: normalize_text_option(email),
        },
    }
}

fn session_label(session: &AuthSession) -> String {
    session.user.email.as_deref().map_or_else(
        || session.user.id.clone(),
        |email| format!("{email} ({})", session.user.id),
    )
}

pub fn auth_status_line<P: SessionPersistence>(
    store: &StoredSession<P>,
) -> Result<String, CliError> {
    let Some(session) = store.load_session()? else {
        return Ok("Not signed in.".to_string());
    };
    let label = session_label(&session);
    if session.is_expired() {
        Ok(format!(
            "Session for {label} expired; local reviews still work, sync is paused."
        ))
    } else {
        Ok(format!(
            "Signed in as {label} (expires_at={})",
            session.expires_at
        ))
    }
}
