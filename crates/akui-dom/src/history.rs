#![forbid(unsafe_code)]

//! Session history and the address bar.
//!
//! [`History`] is a list of entries with a cursor. The current entry's URL
//! *is* the location; there is no separate location state to drift out of
//! sync.
//!
//! # Invariants
//!
//! 1. There is always at least one entry, and `index < entries.len()`.
//! 2. Pushing truncates every entry after the cursor, then appends.
//! 3. `go` never moves the cursor out of bounds; an out-of-range delta is a
//!    no-op.

use serde_json::Value;
use url::Url;

use crate::error::DomError;

/// One session-history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub state: Option<Value>,
    pub url: Url,
}

/// Session history for a single browsing context.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl History {
    /// History with a single stateless entry at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            entries: vec![HistoryEntry { state: None, url }],
            index: 0,
        }
    }

    /// Number of entries, including forward entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a history has at least one entry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the current entry.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    /// `history.state`.
    pub fn state(&self) -> Option<&Value> {
        self.current().state.as_ref()
    }

    /// Resolve `input` against the current URL (`"#x"`, `"/path"`, absolute).
    pub fn resolve(&self, input: &str) -> Result<Url, DomError> {
        self.current()
            .url
            .join(input)
            .map_err(|source| DomError::InvalidUrl {
                input: input.to_owned(),
                source,
            })
    }

    /// `history.pushState(state, "", url)`. Same-origin only.
    pub fn push(&mut self, state: Option<Value>, url: &str) -> Result<(), DomError> {
        let url = self.resolve(url)?;
        if url.origin() != self.current().url.origin() {
            return Err(DomError::CrossOrigin(url.into()));
        }
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry { state, url });
        self.index += 1;
        Ok(())
    }

    /// `history.replaceState(state, "", url)`. Same-origin only.
    pub fn replace(&mut self, state: Option<Value>, url: &str) -> Result<(), DomError> {
        let url = self.resolve(url)?;
        if url.origin() != self.current().url.origin() {
            return Err(DomError::CrossOrigin(url.into()));
        }
        self.entries[self.index] = HistoryEntry { state, url };
        Ok(())
    }

    /// Move the cursor by `delta`. Returns the new current entry, or `None`
    /// when the move would leave the list (or `delta` is zero).
    pub fn go(&mut self, delta: isize) -> Option<&HistoryEntry> {
        if delta == 0 {
            return None;
        }
        let target = self.index.checked_add_signed(delta)?;
        if target >= self.entries.len() {
            return None;
        }
        self.index = target;
        Some(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn history() -> History {
        History::new(Url::parse("https://example.test/pricing?plan=pro").unwrap())
    }

    #[test]
    fn push_resolves_fragment_against_current_url() {
        let mut h = history();
        h.push(Some(json!({"akModalId": "pricing"})), "#pricing").unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.index(), 1);
        assert_eq!(h.current().url.fragment(), Some("pricing"));
        assert_eq!(h.current().url.path(), "/pricing");
        assert_eq!(h.state(), Some(&json!({"akModalId": "pricing"})));
    }

    #[test]
    fn push_truncates_forward_entries() {
        let mut h = history();
        h.push(None, "#a").unwrap();
        h.push(None, "#b").unwrap();
        h.go(-2).unwrap();
        h.push(None, "#c").unwrap();
        let fragments: Vec<_> = h.entries().iter().map(|e| e.url.fragment()).collect();
        assert_eq!(fragments, vec![None, Some("c")]);
    }

    #[test]
    fn go_out_of_range_is_noop() {
        let mut h = history();
        assert!(h.go(-1).is_none());
        assert!(h.go(1).is_none());
        assert!(h.go(0).is_none());
        assert_eq!(h.index(), 0);
    }

    #[test]
    fn cross_origin_push_is_rejected() {
        let mut h = history();
        let err = h.push(None, "https://elsewhere.test/").unwrap_err();
        assert!(matches!(err, DomError::CrossOrigin(_)));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn replace_keeps_length() {
        let mut h = history();
        h.replace(Some(json!(1)), "#x").unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.state(), Some(&json!(1)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Go(isize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => any::<u8>().prop_map(Op::Push),
            2 => (-3isize..=3).prop_map(Op::Go),
        ]
    }

    proptest! {
        /// A push drops every entry after the cursor; `go` only moves the
        /// cursor and never leaves the list.
        #[test]
        fn push_truncates_forward_and_go_stays_in_bounds(
            ops in proptest::collection::vec(arb_op(), 1..40),
        ) {
            let mut h = history();
            let mut model: Vec<Option<String>> = vec![None];
            let mut cursor = 0usize;

            for op in ops {
                match op {
                    Op::Push(n) => {
                        h.push(Some(json!(n)), &format!("#{n}")).unwrap();
                        model.truncate(cursor + 1);
                        model.push(Some(n.to_string()));
                        cursor = model.len() - 1;
                    }
                    Op::Go(delta) => {
                        let moved = h.go(delta).is_some();
                        let target = cursor
                            .checked_add_signed(delta)
                            .filter(|target| delta != 0 && *target < model.len());
                        prop_assert_eq!(moved, target.is_some());
                        if let Some(target) = target {
                            cursor = target;
                        }
                    }
                }

                let fragments: Vec<_> = h
                    .entries()
                    .iter()
                    .map(|entry| entry.url.fragment().map(str::to_owned))
                    .collect();
                prop_assert_eq!(&fragments, &model);
                prop_assert_eq!(h.index(), cursor);
            }
        }
    }
}
