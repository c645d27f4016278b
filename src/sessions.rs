//! # Session Store Module
//!
//! In-process map from user id to at most one active session per kind:
//! free-capture ("dump everything"), multi-select archive/delete, and the
//! sequential weekly review walkthrough.
//!
//! The store is owned exclusively by the background worker and mutated only
//! from units running on it, so it needs no internal locking. Starting a new
//! session of a kind silently replaces any prior session of that kind for the
//! same user.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::errors::SessionError;

pub type UserId = i64;
pub type ThoughtId = i64;

/// Free-capture session: raw text entries appended in order until closed
#[derive(Debug, Default)]
pub struct CaptureSession {
    entries: Vec<String>,
}

/// Whether a bulk selection applies archive or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Archive,
    Delete,
}

/// One selectable thought snapshotted at bulk-session start
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ThoughtId,
    pub text: String,
    pub category: String,
}

/// Multi-select session over a fixed candidate snapshot.
///
/// The selected set is seeded at start and mutated by toggles; candidate
/// integrity is enforced at snapshot time only, so toggling an id outside the
/// snapshot is accepted.
#[derive(Debug)]
pub struct BulkSelectionSession {
    pub candidates: Vec<Candidate>,
    pub selected: HashSet<ThoughtId>,
    pub mode: SelectionMode,
}

/// One reviewable thought snapshotted at review start
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub id: ThoughtId,
    pub text: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Sequential review walkthrough: cursor only ever moves forward.
#[derive(Debug)]
pub struct ReviewSession {
    items: Vec<ReviewItem>,
    cursor: usize,
    kept: usize,
    archived: usize,
}

/// Result tallies handed back when a review finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub kept: usize,
    pub archived: usize,
    pub remaining: usize,
}

/// What a review decision leads to next
#[derive(Debug, Clone)]
pub enum ReviewStep {
    /// Present this item (either the next one, or the current one re-presented
    /// after a stale button press)
    Current(ReviewItem),
    /// The walkthrough is over; the session has been removed
    Finished(ReviewSummary),
}

/// User decision on the item under the review cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Keep,
    Archive,
    Skip,
    Finish,
}

/// Per-user sessions, one slot per kind
#[derive(Default)]
pub struct SessionStore {
    capture: HashMap<UserId, CaptureSession>,
    bulk: HashMap<UserId, BulkSelectionSession>,
    review: HashMap<UserId, ReviewSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- capture -----

    /// Enter capture mode, discarding any capture session already open.
    pub fn start_capture(&mut self, user: UserId) {
        self.capture.insert(user, CaptureSession::default());
    }

    pub fn capture_active(&self, user: UserId) -> bool {
        self.capture.contains_key(&user)
    }

    /// Append one raw entry; returns the running count.
    pub fn append_capture(&mut self, user: UserId, text: &str) -> Result<usize, SessionError> {
        let session = self
            .capture
            .get_mut(&user)
            .ok_or(SessionError::NoActiveSession)?;
        session.entries.push(text.to_string());
        Ok(session.entries.len())
    }

    /// Atomically remove the session and hand back the captured entries in
    /// append order. The store only knows "no session": a second close and a
    /// close without a prior start look the same.
    pub fn close_capture(&mut self, user: UserId) -> Result<Vec<String>, SessionError> {
        self.capture
            .remove(&user)
            .map(|session| session.entries)
            .ok_or(SessionError::NoActiveSession)
    }

    // ----- bulk selection -----

    /// Snapshot candidates and seed the selection with every candidate the
    /// `preselect` predicate accepts (typically "category == default").
    pub fn start_bulk<P>(
        &mut self,
        user: UserId,
        candidates: Vec<Candidate>,
        mode: SelectionMode,
        preselect: P,
    ) -> &BulkSelectionSession
    where
        P: Fn(&Candidate) -> bool,
    {
        let selected = candidates
            .iter()
            .filter(|c| preselect(c))
            .map(|c| c.id)
            .collect();
        self.bulk.insert(
            user,
            BulkSelectionSession {
                candidates,
                selected,
                mode,
            },
        );
        self.bulk.get(&user).expect("session just inserted")
    }

    pub fn bulk(&self, user: UserId) -> Option<&BulkSelectionSession> {
        self.bulk.get(&user)
    }

    /// Flip membership of `id` in the selected set. Ids outside the candidate
    /// snapshot are accepted and simply added/removed.
    pub fn toggle_bulk(&mut self, user: UserId, id: ThoughtId) -> Result<&BulkSelectionSession, SessionError> {
        let session = self.bulk.get_mut(&user).ok_or(SessionError::NoActiveSession)?;
        if !session.selected.remove(&id) {
            session.selected.insert(id);
        }
        Ok(self.bulk.get(&user).expect("session present"))
    }

    /// Run the external bulk action over exactly the selected ids and discard
    /// the session. The session is cleared only after `action` returns, so a
    /// failed action leaves it in place for a retry; a crash between the two
    /// steps leaves a narrow at-most-once window, which is accepted.
    pub fn apply_bulk<F>(&mut self, user: UserId, action: F) -> Result<(usize, SelectionMode)>
    where
        F: FnOnce(SelectionMode, &[ThoughtId]) -> Result<usize>,
    {
        let session = self.bulk.get(&user).ok_or(SessionError::NoActiveSession)?;
        if session.selected.is_empty() {
            return Err(SessionError::NothingSelected.into());
        }
        let mode = session.mode;
        let ids: Vec<ThoughtId> = session.selected.iter().copied().collect();
        let count = action(mode, &ids)?;
        self.bulk.remove(&user);
        Ok((count, mode))
    }

    /// Discard the bulk session unconditionally.
    pub fn cancel_bulk(&mut self, user: UserId) {
        self.bulk.remove(&user);
    }

    // ----- weekly review -----

    /// Seed a review at cursor 0. Empty item lists create no session so the
    /// caller can tell the user there is nothing to review.
    pub fn start_review(&mut self, user: UserId, items: Vec<ReviewItem>) -> Result<usize, SessionError> {
        if items.is_empty() {
            return Err(SessionError::EmptySession);
        }
        let count = items.len();
        self.review.insert(
            user,
            ReviewSession {
                items,
                cursor: 0,
                kept: 0,
                archived: 0,
            },
        );
        Ok(count)
    }

    pub fn review_active(&self, user: UserId) -> bool {
        self.review.contains_key(&user)
    }

    /// (1-based cursor position, total items) for rendering progress.
    pub fn review_progress(&self, user: UserId) -> Option<(usize, usize)> {
        self.review
            .get(&user)
            .map(|s| (s.cursor.min(s.items.len().saturating_sub(1)) + 1, s.items.len()))
    }

    /// The item under the cursor, or the finish summary when the cursor has
    /// already walked past the last item (the session is then removed).
    pub fn review_current(&mut self, user: UserId) -> Result<ReviewStep, SessionError> {
        let session = self.review.get(&user).ok_or(SessionError::NoActiveSession)?;
        if session.cursor >= session.items.len() {
            return Ok(ReviewStep::Finished(self.take_review_summary(user)));
        }
        Ok(ReviewStep::Current(session.items[session.cursor].clone()))
    }

    /// Apply one decision to the item under the cursor.
    ///
    /// For keep/archive a mismatched `expected_id` means a duplicate or late
    /// button press: nothing mutates and the current item is re-presented.
    /// Otherwise the cursor advances by exactly one; archive runs the external
    /// status update (and counts only if it succeeds), keep bumps its counter,
    /// skip bumps nothing. Finish ends the walkthrough from any position.
    pub fn review_decide<F>(
        &mut self,
        user: UserId,
        action: ReviewAction,
        expected_id: Option<ThoughtId>,
        archive: F,
    ) -> Result<ReviewStep>
    where
        F: FnOnce(ThoughtId) -> Result<()>,
    {
        let session = self.review.get_mut(&user).ok_or(SessionError::NoActiveSession)?;

        if action == ReviewAction::Finish || session.cursor >= session.items.len() {
            return Ok(ReviewStep::Finished(self.take_review_summary(user)));
        }

        let current = session.items[session.cursor].clone();

        // Stale guard: keep/archive buttons carry the id they were rendered
        // for; a mismatch re-presents the current item unchanged.
        if matches!(action, ReviewAction::Keep | ReviewAction::Archive) {
            if let Some(expected) = expected_id {
                if expected != current.id {
                    return Ok(ReviewStep::Current(current));
                }
            }
        }

        match action {
            ReviewAction::Archive => {
                archive(current.id)?;
                session.archived += 1;
            }
            ReviewAction::Keep => session.kept += 1,
            ReviewAction::Skip => {}
            ReviewAction::Finish => unreachable!("handled above"),
        }
        session.cursor += 1;

        if session.cursor >= session.items.len() {
            return Ok(ReviewStep::Finished(self.take_review_summary(user)));
        }
        Ok(ReviewStep::Current(session.items[session.cursor].clone()))
    }

    fn take_review_summary(&mut self, user: UserId) -> ReviewSummary {
        match self.review.remove(&user) {
            Some(session) => ReviewSummary {
                kept: session.kept,
                archived: session.archived,
                remaining: session.items.len() - session.cursor,
            },
            None => ReviewSummary {
                kept: 0,
                archived: 0,
                remaining: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                id: 1,
                text: "pay rent".into(),
                category: "tasks".into(),
            },
            Candidate {
                id: 2,
                text: "an app that waters plants".into(),
                category: "ideas".into(),
            },
        ]
    }

    #[test]
    fn capture_keeps_append_order() {
        let mut store = SessionStore::new();
        store.start_capture(7);
        store.append_capture(7, "buy milk").unwrap();
        store.append_capture(7, "call mom").unwrap();
        let entries = store.close_capture(7).unwrap();
        assert_eq!(entries, vec!["buy milk".to_string(), "call mom".to_string()]);
        assert_eq!(store.close_capture(7), Err(SessionError::NoActiveSession));
    }

    #[test]
    fn starting_capture_replaces_previous_session() {
        let mut store = SessionStore::new();
        store.start_capture(7);
        store.append_capture(7, "old entry").unwrap();
        store.start_capture(7);
        assert_eq!(store.close_capture(7).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn bulk_preselects_default_category() {
        let mut store = SessionStore::new();
        let session = store.start_bulk(7, candidates(), SelectionMode::Archive, |c| c.category == "tasks");
        assert_eq!(session.selected, HashSet::from([1]));
    }

    #[test]
    fn toggling_unknown_id_is_accepted() {
        let mut store = SessionStore::new();
        store.start_bulk(7, candidates(), SelectionMode::Delete, |_| false);
        let session = store.toggle_bulk(7, 999).unwrap();
        assert!(session.selected.contains(&999));
        let session = store.toggle_bulk(7, 999).unwrap();
        assert!(!session.selected.contains(&999));
    }

    #[test]
    fn review_cursor_is_bounded_and_monotonic() {
        let mut store = SessionStore::new();
        let items: Vec<ReviewItem> = (0..3)
            .map(|i| ReviewItem {
                id: i,
                text: format!("thought {i}"),
                category: "tasks".into(),
                created_at: Utc::now(),
            })
            .collect();
        store.start_review(7, items).unwrap();
        for _ in 0..3 {
            store
                .review_decide(7, ReviewAction::Skip, None, |_| Ok(()))
                .unwrap();
        }
        // exhaustion removed the session
        assert!(!store.review_active(7));
    }
}
