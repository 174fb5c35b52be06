#![forbid(unsafe_code)]

//! Native events and the per-target listener store.
//!
//! Listeners are plain `Rc` closures that receive the whole [`Page`] mutably,
//! so a handler can mutate the document, push history or schedule timers
//! without holding any borrow of its own.
//!
//! # Invariants
//!
//! 1. Listeners on one `(target, type)` pair run in registration order.
//! 2. A listener removed while an event is being dispatched does not run for
//!    the remainder of that dispatch.
//! 3. [`ListenerId`]s are never reused within a store.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use serde_json::Value;

use crate::document::NodeId;
use crate::error::DomError;
use crate::page::Page;

/// Native event types understood by the page model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
    KeyDown,
    PopState,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyDown => "keydown",
            Self::PopState => "popstate",
        }
    }

    /// Whether events of this type propagate from the target to its ancestors.
    pub const fn bubbles(self) -> bool {
        !matches!(self, Self::PopState)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Node(NodeId),
}

impl From<NodeId> for EventTarget {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

/// Keyboard key carried by a `keydown` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    Char(char),
    Other(String),
}

/// Type-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    None,
    Key(Key),
    /// `history.state` of the entry that became current.
    PopState(Option<Value>),
}

/// An event in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    kind: EventType,
    target: EventTarget,
    current_target: EventTarget,
    detail: EventDetail,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl DomEvent {
    pub fn new(kind: EventType, target: EventTarget, detail: EventDetail) -> Self {
        Self {
            kind,
            target,
            current_target: target,
            detail,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn click(target: NodeId) -> Self {
        Self::new(EventType::Click, target.into(), EventDetail::None)
    }

    pub fn key_down(target: NodeId, key: Key) -> Self {
        Self::new(EventType::KeyDown, target.into(), EventDetail::Key(key))
    }

    pub fn pop_state(state: Option<Value>) -> Self {
        Self::new(EventType::PopState, EventTarget::Window, EventDetail::PopState(state))
    }

    #[inline]
    pub fn kind(&self) -> EventType {
        self.kind
    }

    #[inline]
    pub fn target(&self) -> EventTarget {
        self.target
    }

    /// Target the currently running listener is registered on.
    #[inline]
    pub fn current_target(&self) -> EventTarget {
        self.current_target
    }

    pub fn detail(&self) -> &EventDetail {
        &self.detail
    }

    pub fn key(&self) -> Option<&Key> {
        match &self.detail {
            EventDetail::Key(key) => Some(key),
            _ => None,
        }
    }

    /// State payload of a `popstate` event.
    pub fn state(&self) -> Option<&Value> {
        match &self.detail {
            EventDetail::PopState(state) => state.as_ref(),
            _ => None,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    #[inline]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    #[inline]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub(crate) fn set_current_target(&mut self, target: EventTarget) {
        self.current_target = target;
    }
}

/// A native listener callback.
pub type NativeHandler = Rc<dyn Fn(&mut Page, &mut DomEvent) -> Result<(), DomError>>;

/// Identity of a native registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerStore {
    next_id: u64,
    map: AHashMap<(EventTarget, EventType), Vec<(ListenerId, NativeHandler)>>,
}

impl fmt::Debug for ListenerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerStore")
            .field("registrations", &self.total())
            .finish()
    }
}

impl ListenerStore {
    pub(crate) fn add(
        &mut self,
        target: EventTarget,
        kind: EventType,
        handler: NativeHandler,
    ) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.map.entry((target, kind)).or_default().push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, target: EventTarget, kind: EventType, id: ListenerId) -> bool {
        let Some(listeners) = self.map.get_mut(&(target, kind)) else {
            return false;
        };
        let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) else {
            return false;
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            self.map.remove(&(target, kind));
        }
        true
    }

    pub(crate) fn contains(&self, target: EventTarget, kind: EventType, id: ListenerId) -> bool {
        self.map
            .get(&(target, kind))
            .is_some_and(|listeners| listeners.iter().any(|(lid, _)| *lid == id))
    }

    /// Listeners currently registered, cloned out so handlers may mutate the
    /// store while the snapshot is being walked.
    pub(crate) fn snapshot(
        &self,
        target: EventTarget,
        kind: EventType,
    ) -> Vec<(ListenerId, NativeHandler)> {
        self.map
            .get(&(target, kind))
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|(id, handler)| (*id, Rc::clone(handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, target: EventTarget, kind: EventType) -> usize {
        self.map.get(&(target, kind)).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }
}
