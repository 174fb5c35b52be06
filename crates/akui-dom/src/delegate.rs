#![forbid(unsafe_code)]

//! Reference-counted delegated listeners.
//!
//! A [`DelegatedListener`] is a capability: a stable [`DelegateKey`] plus an
//! action run once per ancestor of the event target. Attaching the same
//! listener several times to one `(root, type)` pair shares a single native
//! registration; only the last matching [`detach`] removes it.
//!
//! # Invariants
//!
//! 1. Native registration happens exactly on the 0 -> 1 reference transition
//!    and is removed exactly on 1 -> 0.
//! 2. The ancestor walk starts at the innermost *element* (text targets are
//!    promoted to their parent) and ends at the document element.
//! 3. The walk is computed before the first action runs; actions that move
//!    nodes do not change which ancestors are visited for this event.
//!
//! # Failure Modes
//!
//! - `detach` of a listener that was never attached: no-op.
//! - Action error: propagated to the dispatcher; remaining ancestors are
//!   skipped for this event.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use tracing::trace;

use crate::document::NodeId;
use crate::error::DomError;
use crate::event::{DomEvent, EventTarget, EventType, ListenerId, NativeHandler};
use crate::page::Page;

/// Global counter for delegate identities.
static DELEGATE_KEY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a delegated listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateKey(u64);

impl DelegateKey {
    fn new() -> Self {
        Self(DELEGATE_KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

type DelegateAction = dyn Fn(&mut Page, NodeId, &mut DomEvent) -> Result<(), DomError>;

/// A logical listener invoked for each ancestor of an event target.
///
/// Clones share the same key, so a clone attaches and detaches as the same
/// listener.
#[derive(Clone)]
pub struct DelegatedListener {
    key: DelegateKey,
    action: Rc<DelegateAction>,
}

impl fmt::Debug for DelegatedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedListener")
            .field("key", &self.key)
            .finish()
    }
}

impl DelegatedListener {
    pub fn new(
        action: impl Fn(&mut Page, NodeId, &mut DomEvent) -> Result<(), DomError> + 'static,
    ) -> Self {
        Self {
            key: DelegateKey::new(),
            action: Rc::new(action),
        }
    }

    #[inline]
    pub fn key(&self) -> DelegateKey {
        self.key
    }

    /// Native handler that walks the target's ancestors.
    fn dispatcher(&self) -> NativeHandler {
        let action = Rc::clone(&self.action);
        Rc::new(move |page: &mut Page, event: &mut DomEvent| -> Result<(), DomError> {
            let EventTarget::Node(target) = event.target() else {
                return Ok(());
            };
            let doc = page.document();
            let start = if doc.is_text(target) {
                match doc.parent(target) {
                    Some(parent) => parent,
                    None => return Ok(()),
                }
            } else {
                target
            };
            let chain: Vec<NodeId> = doc.ancestors(start).collect();
            for node in chain {
                action(page, node, event)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    native: ListenerId,
    refs: usize,
}

/// Per-page table of delegated registrations.
#[derive(Debug, Default)]
pub struct DelegateRegistry {
    entries: AHashMap<(NodeId, EventType, DelegateKey), Registration>,
}

impl DelegateRegistry {
    /// Current reference count (0 when not attached).
    pub fn ref_count(&self, root: NodeId, kind: EventType, key: DelegateKey) -> usize {
        self.entries
            .get(&(root, kind, key))
            .map_or(0, |reg| reg.refs)
    }

    /// Number of distinct live registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attach `listener` for `kind` events bubbling to `root`.
pub fn attach(page: &mut Page, root: NodeId, kind: EventType, listener: &DelegatedListener) {
    let slot = (root, kind, listener.key);
    if let Some(reg) = page.delegates_mut().entries.get_mut(&slot) {
        reg.refs += 1;
        trace!(key = listener.key.0, %kind, refs = reg.refs, "delegated listener shared");
        return;
    }
    let native = page.add_native_listener(EventTarget::Node(root), kind, listener.dispatcher());
    page.delegates_mut()
        .entries
        .insert(slot, Registration { native, refs: 1 });
    trace!(key = listener.key.0, %kind, %root, "delegated listener attached");
}

/// Drop one reference to `listener`; the native registration goes away with
/// the last one.
pub fn detach(page: &mut Page, root: NodeId, kind: EventType, listener: &DelegatedListener) {
    let slot = (root, kind, listener.key);
    let Some(reg) = page.delegates_mut().entries.get_mut(&slot) else {
        return;
    };
    reg.refs -= 1;
    if reg.refs > 0 {
        trace!(key = listener.key.0, %kind, refs = reg.refs, "delegated listener released");
        return;
    }
    let native = reg.native;
    page.delegates_mut().entries.remove(&slot);
    page.remove_event_listener(EventTarget::Node(root), kind, native);
    trace!(key = listener.key.0, %kind, %root, "delegated listener detached");
}

/// Reference count of `listener` on `(root, kind)`.
pub fn ref_count(page: &Page, root: NodeId, kind: EventType, listener: &DelegatedListener) -> usize {
    page.delegates().ref_count(root, kind, listener.key)
}
