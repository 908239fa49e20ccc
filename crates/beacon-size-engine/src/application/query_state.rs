//! # Query State
//!
//! Stale-while-revalidate bookkeeping for one query.
//!
//! ```text
//! [EMPTY] ──begin──→ [LOADING] ──complete──→ [READY] ⇄ [REFRESHING]
//! ```
//!
//! `Refreshing` keeps exposing the last ready payload. A failed fetch keeps
//! it too. Results are matched to the request that produced them by query
//! key and generation: a response for a superseded key, or one older than a
//! response already applied, is discarded.
//!
//! A payload belongs to the key it was fetched for. After the key changes it
//! is only reachable through [`QueryState::previous`] and the phase drops
//! back to `Empty` or `Loading` until the new key has data.

use serde::Serialize;
use tracing::debug;

/// Phase of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    Empty,
    Loading,
    Ready,
    Refreshing,
}

/// Handle for one in-flight request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTicket<K> {
    key: K,
    generation: u64,
}

impl<K> QueryTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What happened to a completed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The payload (or error) was recorded.
    Applied,
    /// The ticket's key is no longer the active one.
    Superseded,
    /// A newer response for the same key already landed.
    Outdated,
}

/// State of one keyed query.
#[derive(Clone, Debug)]
pub struct QueryState<K, T> {
    key: Option<K>,
    data: Option<(K, T)>,
    last_error: Option<String>,
    next_generation: u64,
    applied_generation: Option<u64>,
    pending: Option<u64>,
}

impl<K, T> Default for QueryState<K, T> {
    fn default() -> Self {
        Self {
            key: None,
            data: None,
            last_error: None,
            next_generation: 0,
            applied_generation: None,
            pending: None,
        }
    }
}

impl<K: Clone + PartialEq + std::fmt::Debug, T> QueryState<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QueryPhase {
        match (self.data().is_some(), self.pending.is_some()) {
            (false, false) => QueryPhase::Empty,
            (false, true) => QueryPhase::Loading,
            (true, false) => QueryPhase::Ready,
            (true, true) => QueryPhase::Refreshing,
        }
    }

    /// Last good payload for the current key, also while refreshing.
    pub fn data(&self) -> Option<&T> {
        self.data
            .as_ref()
            .filter(|(key, _)| self.key.as_ref() == Some(key))
            .map(|(_, data)| data)
    }

    /// Payload left over from an earlier key.
    pub fn previous(&self) -> Option<(&K, &T)> {
        self.data
            .as_ref()
            .filter(|(key, _)| self.key.as_ref() != Some(key))
            .map(|(key, data)| (key, data))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Key of the most recent request.
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Start a request for `key`, superseding requests for any other key.
    pub fn begin(&mut self, key: K) -> QueryTicket<K> {
        let generation = self.next_generation;
        self.next_generation += 1;
        if self.key.as_ref() != Some(&key) {
            // results of the previous key must not be applied any more
            self.applied_generation = None;
            self.last_error = None;
        }
        self.key = Some(key.clone());
        self.pending = Some(generation);
        QueryTicket { key, generation }
    }

    /// Point the query at `key` without issuing a request.
    ///
    /// Requests still in flight for another key will be discarded.
    pub fn supersede(&mut self, key: K) {
        if self.key.as_ref() == Some(&key) {
            return;
        }
        self.key = Some(key);
        self.applied_generation = None;
        self.last_error = None;
        self.pending = None;
    }

    /// Record the outcome of a request.
    pub fn complete<E: std::fmt::Display>(
        &mut self,
        ticket: QueryTicket<K>,
        result: Result<T, E>,
    ) -> Completion {
        if self.key.as_ref() != Some(&ticket.key) {
            debug!(key = ?ticket.key, "Discarding result for superseded query");
            return Completion::Superseded;
        }
        if self
            .applied_generation
            .is_some_and(|applied| applied > ticket.generation)
        {
            debug!(key = ?ticket.key, "Discarding outdated result");
            return Completion::Outdated;
        }

        match result {
            Ok(data) => {
                self.data = Some((ticket.key, data));
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
        self.applied_generation = Some(ticket.generation);
        if self.pending == Some(ticket.generation) {
            self.pending = None;
        }
        Completion::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type State = QueryState<u32, &'static str>;

    #[test]
    fn test_lifecycle() {
        let mut state = State::new();
        assert_eq!(state.phase(), QueryPhase::Empty);

        let ticket = state.begin(1);
        assert_eq!(state.phase(), QueryPhase::Loading);
        assert_eq!(state.complete(ticket, Ok::<_, String>("a")), Completion::Applied);
        assert_eq!(state.phase(), QueryPhase::Ready);

        let ticket = state.begin(1);
        assert_eq!(state.phase(), QueryPhase::Refreshing);
        assert_eq!(state.data(), Some(&"a"));

        state.complete(ticket, Ok::<_, String>("b"));
        assert_eq!(state.phase(), QueryPhase::Ready);
        assert_eq!(state.data(), Some(&"b"));
    }

    #[test]
    fn test_error_keeps_last_good_payload() {
        let mut state = State::new();
        let ticket = state.begin(1);
        state.complete(ticket, Ok::<_, String>("a"));

        let ticket = state.begin(1);
        state.complete(ticket, Err::<&str, _>("HTTP 500"));
        assert_eq!(state.phase(), QueryPhase::Ready);
        assert_eq!(state.data(), Some(&"a"));
        assert_eq!(state.last_error(), Some("HTTP 500"));
    }

    #[test]
    fn test_superseded_key_is_discarded() {
        let mut state = State::new();
        let old = state.begin(1);
        let new = state.begin(2);

        assert_eq!(state.complete(old, Ok::<_, String>("stale")), Completion::Superseded);
        assert_eq!(state.phase(), QueryPhase::Loading);
        assert!(state.data().is_none());

        assert_eq!(state.complete(new, Ok::<_, String>("fresh")), Completion::Applied);
        assert_eq!(state.data(), Some(&"fresh"));
    }

    #[test]
    fn test_supersede_without_request() {
        let mut state = State::new();
        let ticket = state.begin(1);
        state.complete(ticket, Ok::<_, String>("a"));

        let in_flight = state.begin(1);
        state.supersede(2);
        assert_eq!(state.phase(), QueryPhase::Empty);
        assert_eq!(state.complete(in_flight, Ok::<_, String>("late")), Completion::Superseded);
        assert!(state.data().is_none());
        assert_eq!(state.previous(), Some((&1, &"a")));
        assert_eq!(state.key(), Some(&2));
    }

    #[test]
    fn test_new_key_never_reports_old_payload_ready() {
        let mut state = State::new();
        let ticket = state.begin(1);
        state.complete(ticket, Ok::<_, String>("a"));

        let ticket = state.begin(2);
        assert_eq!(state.phase(), QueryPhase::Loading);
        assert_eq!(state.complete(ticket, Err::<&str, _>("HTTP 500")), Completion::Applied);
        assert_eq!(state.phase(), QueryPhase::Empty);
        assert!(state.data().is_none());
        assert_eq!(state.last_error(), Some("HTTP 500"));

        let ticket = state.begin(2);
        state.complete(ticket, Ok::<_, String>("b"));
        assert_eq!(state.phase(), QueryPhase::Ready);
        assert_eq!(state.data(), Some(&"b"));
        assert!(state.previous().is_none());
    }

    #[test]
    fn test_slow_response_cannot_clobber_newer_one() {
        let mut state = State::new();
        let slow = state.begin(1);
        let fast = state.begin(1);

        state.complete(fast, Ok::<_, String>("fast"));
        assert_eq!(state.complete(slow, Ok::<_, String>("slow")), Completion::Outdated);
        assert_eq!(state.data(), Some(&"fast"));
        assert_eq!(state.phase(), QueryPhase::Ready);
    }

    #[test]
    fn test_older_response_still_pending_newer() {
        let mut state = State::new();
        let first = state.begin(1);
        let _second = state.begin(1);

        state.complete(first, Ok::<_, String>("first"));
        assert_eq!(state.phase(), QueryPhase::Refreshing);
        assert_eq!(state.data(), Some(&"first"));
    }
}
