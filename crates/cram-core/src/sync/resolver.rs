//! Last-write-wins verdicts for pulled rows

use crate::sync::SyncEntity;

/// What to do with one pulled row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Write the remote values locally, marked synced
    Adopt,
    /// Local values win; the remote row is ignored
    Keep,
    /// The remote row is invalid and skipped
    Reject,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Adopt => "adopt",
            Self::Keep => "keep",
            Self::Reject => "reject",
        }
    }
}

/// Compare a decoded remote record with the local copy, if any.
///
/// Ties adopt only when the local copy is synced, so an unconfirmed local
/// write is never replaced by a value the server had at the same time.
pub fn resolve<E: SyncEntity>(local: Option<&E>, remote: &E) -> Resolution {
    let Some(local) = local else {
        return Resolution::Adopt;
    };

    let (local_ts, remote_ts) = (local.lww_timestamp(), remote.lww_timestamp());
    if remote_ts > local_ts {
        Resolution::Adopt
    } else if remote_ts < local_ts || !local.is_synced() {
        Resolution::Keep
    } else {
        Resolution::Adopt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionId, SrsState, UserId};
    use pretty_assertions::assert_eq;

    fn state(last_reviewed: i64, synced: bool) -> SrsState {
        let mut state = SrsState::reviewed(
            None,
            QuestionId::from_uuid(uuid::Uuid::nil()),
            UserId::new("u").unwrap(),
            true,
            last_reviewed,
        );
        state.synced = synced;
        state
    }

    #[test]
    fn missing_local_adopts() {
        assert_eq!(resolve(None, &state(5, true)), Resolution::Adopt);
    }

    #[test]
    fn newer_remote_adopts() {
        assert_eq!(resolve(Some(&state(4, false)), &state(5, true)), Resolution::Adopt);
        assert_eq!(resolve(Some(&state(4, true)), &state(5, true)), Resolution::Adopt);
    }

    #[test]
    fn older_remote_keeps() {
        assert_eq!(resolve(Some(&state(6, true)), &state(5, true)), Resolution::Keep);
        assert_eq!(resolve(Some(&state(6, false)), &state(5, true)), Resolution::Keep);
    }

    #[test]
    fn tie_keeps_pending_local_write() {
        assert_eq!(resolve(Some(&state(5, false)), &state(5, true)), Resolution::Keep);
    }

    #[test]
    fn tie_adopts_over_synced_local() {
        assert_eq!(resolve(Some(&state(5, true)), &state(5, true)), Resolution::Adopt);
    }
}
