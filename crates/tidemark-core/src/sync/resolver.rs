//! Last-write-wins conflict resolution between a local and a remote note.
//!
//! Pure decision logic: no storage, no network. The orchestrator calls it in
//! both the push phase (to avoid overwriting a newer remote version) and the
//! pull phase (to decide which version lands in the local store).

use crate::models::NoteRecord;

/// Which side of a local/remote pair should be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
}

/// Resolve a pair of versions of the same note.
///
/// Returns `None` only when neither side exists.
///
/// - A lone version wins.
/// - Two live versions: greater `updated_at` wins, ties go to the remote.
/// - Tombstone against a live edit: the tombstone wins only when it is at
///   least as recent as the edit, so a concurrent edit resurrects the note.
/// - Two tombstones: greater `updated_at`, ties go to the remote.
#[must_use]
pub fn resolve(local: Option<&NoteRecord>, remote: Option<&NoteRecord>) -> Option<Resolution> {
    match (local, remote) {
        (None, None) => None,
        (Some(_), None) => Some(Resolution::KeepLocal),
        (None, Some(_)) => Some(Resolution::TakeRemote),
        (Some(local), Some(remote)) => Some(resolve_pair(local, remote)),
    }
}

fn resolve_pair(local: &NoteRecord, remote: &NoteRecord) -> Resolution {
    match (local.tombstone, remote.tombstone) {
        (true, false) => {
            if local.updated_at >= remote.updated_at {
                Resolution::KeepLocal
            } else {
                Resolution::TakeRemote
            }
        }
        (false, true) => {
            if remote.updated_at >= local.updated_at {
                Resolution::TakeRemote
            } else {
                Resolution::KeepLocal
            }
        }
        _ => {
            if local.updated_at > remote.updated_at {
                Resolution::KeepLocal
            } else {
                Resolution::TakeRemote
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteRecord, OwnerId, SyncState};

    fn version(title: &str, updated_at: i64, tombstone: bool) -> NoteRecord {
        let mut note = NoteRecord::new(OwnerId::new("alice"), title, "", vec![]);
        note.updated_at = updated_at;
        note.tombstone = tombstone;
        note
    }

    fn pair(local: &NoteRecord, remote: &NoteRecord) -> NoteRecord {
        let mut remote = remote.clone();
        remote.id = local.id;
        remote.sync_state = SyncState::Synced;
        remote
    }

    #[test]
    fn nothing_to_resolve() {
        assert_eq!(resolve(None, None), None);
    }

    #[test]
    fn single_side_wins_trivially() {
        let note = version("only", 5, false);
        assert_eq!(resolve(Some(&note), None), Some(Resolution::KeepLocal));
        assert_eq!(resolve(None, Some(&note)), Some(Resolution::TakeRemote));

        let tombstone = version("gone", 5, true);
        assert_eq!(resolve(None, Some(&tombstone)), Some(Resolution::TakeRemote));
    }

    #[test]
    fn newer_remote_wins() {
        let local = version("local", 100, false);
        let remote = pair(&local, &version("remote", 200, false));
        assert_eq!(
            resolve(Some(&local), Some(&remote)),
            Some(Resolution::TakeRemote)
        );
    }

    #[test]
    fn newer_local_wins() {
        let local = version("local", 200, false);
        let remote = pair(&local, &version("remote", 100, false));
        assert_eq!(
            resolve(Some(&local), Some(&remote)),
            Some(Resolution::KeepLocal)
        );
    }

    #[test]
    fn tie_goes_to_remote() {
        let local = version("local", 100, false);
        let remote = pair(&local, &version("remote", 100, false));
        assert_eq!(
            resolve(Some(&local), Some(&remote)),
            Some(Resolution::TakeRemote)
        );
    }

    #[test]
    fn local_tombstone_beats_older_or_equal_update() {
        let local = version("deleted", 200, true);
        let older = pair(&local, &version("edit", 100, false));
        let equal = pair(&local, &version("edit", 200, false));

        assert_eq!(resolve(Some(&local), Some(&older)), Some(Resolution::KeepLocal));
        assert_eq!(resolve(Some(&local), Some(&equal)), Some(Resolution::KeepLocal));
    }

    #[test]
    fn newer_remote_update_resurrects_local_tombstone() {
        let local = version("deleted", 100, true);
        let remote = pair(&local, &version("edit", 200, false));
        assert_eq!(
            resolve(Some(&local), Some(&remote)),
            Some(Resolution::TakeRemote)
        );
    }

    #[test]
    fn remote_tombstone_against_local_edit() {
        let local = version("edit", 100, false);
        let newer_tombstone = pair(&local, &version("deleted", 150, true));
        let equal_tombstone = pair(&local, &version("deleted", 100, true));
        let older_tombstone = pair(&local, &version("deleted", 50, true));

        assert_eq!(
            resolve(Some(&local), Some(&newer_tombstone)),
            Some(Resolution::TakeRemote)
        );
        assert_eq!(
            resolve(Some(&local), Some(&equal_tombstone)),
            Some(Resolution::TakeRemote)
        );
        assert_eq!(
            resolve(Some(&local), Some(&older_tombstone)),
            Some(Resolution::KeepLocal)
        );
    }

    #[test]
    fn two_tombstones_follow_lww() {
        let local = version("a", 10, true);
        let remote = pair(&local, &version("b", 10, true));
        assert_eq!(
            resolve(Some(&local), Some(&remote)),
            Some(Resolution::TakeRemote)
        );
    }
}
