#![forbid(unsafe_code)]

//! Reconciles overlay identity with session history and the fragment.
//!
//! Three sources describe which overlay is open: explicit calls, the address
//! fragment (`#<prefix><id>`) and the state object of the current history
//! entry (`{ "<key>": id | null }`). [`HistorySync`] decides when an explicit
//! transition pushes an entry, and which state a load or `popstate` maps to.
//!
//! # Invariants
//!
//! 1. Two consecutive entries never carry the same tag: a push whose tag
//!    equals the current entry's tag is suppressed.
//! 2. Loads and `popstate` never push.
//! 3. An id only resolves to [`OverlayState::Open`] if the caller's validity
//!    check accepts it at that moment.
//!
//! An entry with no state object (or no key) is *untagged*, which differs
//! from an entry explicitly tagged `null`: closing on top of an untagged entry
//! pushes.

use akui_dom::{DomError, Page};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

/// What the overlay should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Closed,
    Open(String),
}

/// Outcome of [`HistorySync::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Pushed,
    /// The current entry already carried this tag.
    Suppressed,
    /// History integration is off.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct HistorySync {
    enabled: bool,
    prefix: String,
    key: String,
}

impl HistorySync {
    pub fn new(enabled: bool, prefix: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            enabled,
            prefix: prefix.into(),
            key: key.into(),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// State object pushed for `id`.
    pub fn state_for(&self, id: Option<&str>) -> Value {
        let mut state = Map::new();
        state.insert(self.key.clone(), id.map_or(Value::Null, Value::from));
        Value::Object(state)
    }

    /// Tag carried by `state`: `None` when untagged, `Some(None)` for an
    /// explicit null.
    pub fn tag_of(&self, state: Option<&Value>) -> Option<Option<String>> {
        match state?.get(&self.key)? {
            Value::Null => Some(None),
            Value::String(id) => Some(Some(id.clone())),
            _ => None,
        }
    }

    /// Tag of the current history entry.
    pub fn current_tag(&self, page: &Page) -> Option<Option<String>> {
        self.tag_of(page.history().state())
    }

    /// Push an entry for an explicit transition to `id` (`None` = closed).
    pub fn record(&self, page: &mut Page, id: Option<&str>) -> Result<HistoryAction, DomError> {
        if !self.enabled {
            return Ok(HistoryAction::Disabled);
        }
        let tag = id.map(str::to_owned);
        if self.current_tag(page) == Some(tag) {
            trace!(?id, "duplicate history entry suppressed");
            return Ok(HistoryAction::Suppressed);
        }
        let url = match id {
            Some(id) => format!("#{}{id}", self.prefix),
            None => {
                let location = page.location();
                match location.query() {
                    Some(query) => format!("{}?{query}", location.path()),
                    None => location.path().to_owned(),
                }
            }
        };
        page.push_state(Some(self.state_for(id)), &url)?;
        debug!(?id, %url, "history entry pushed");
        Ok(HistoryAction::Pushed)
    }

    /// Id named by the fragment: first `#` segment, prefix stripped.
    pub fn fragment_id(&self, page: &Page) -> Option<String> {
        let hash = page.hash();
        let first = hash.split('#').next().unwrap_or_default();
        let id = first.strip_prefix(self.prefix.as_str())?;
        (!id.is_empty()).then(|| id.to_owned())
    }

    /// State to adopt at load time.
    pub fn initial_state(&self, page: &Page, is_valid: impl Fn(&str) -> bool) -> OverlayState {
        if !self.enabled {
            return OverlayState::Closed;
        }
        match self.fragment_id(page) {
            Some(id) if is_valid(&id) => OverlayState::Open(id),
            _ => OverlayState::Closed,
        }
    }

    /// State to adopt after a `popstate` carrying `state`.
    pub fn resolve_pop(
        &self,
        page: &Page,
        state: Option<&Value>,
        is_valid: impl Fn(&str) -> bool,
    ) -> OverlayState {
        match self.tag_of(state).flatten() {
            Some(id) if !id.is_empty() => {
                if is_valid(&id) {
                    OverlayState::Open(id)
                } else {
                    warn!(%id, "history entry names an unknown id; closing");
                    OverlayState::Closed
                }
            }
            _ => match self.fragment_id(page) {
                Some(id) if is_valid(&id) => OverlayState::Open(id),
                _ => OverlayState::Closed,
            },
        }
    }
}
