#![forbid(unsafe_code)]

//! Content relocation between origin containers and the overlay slot.
//!
//! A content container is any element carrying `data-<name>="<id>"`. Its
//! first element child is the content. Activating `id` moves that child into
//! the slot; deactivating moves it back to the exact position it came from.
//!
//! The slot's owner is tracked as a typed [`Relocation`]. The
//! `data-<name>-active-id` attribute is written as a mirror for stylesheets
//! and never read back.
//!
//! # Invariants
//!
//! 1. At most one container's content is in the slot; activating a second id
//!    returns the first container's content before moving the new one in.
//! 2. Relocation is a move: node ids are preserved, nothing is cloned.
//! 3. `activate(x)` then `deactivate()` restores parent and next sibling of
//!    the moved node.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | No container for `id` | Nothing moved in, `activate` returns `false` |
//! | Container has no element child | Slot is marked, nothing moves |
//! | Origin container removed while open | Content is detached, `warn!` |

use akui_dom::{Document, DomError, NodeId};
use tracing::{debug, trace, warn};

use crate::config::Naming;

/// Where the slot's current content came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub id: String,
    /// Moved node; `None` when the container was empty.
    pub content: Option<NodeId>,
    pub origin: NodeId,
    /// Sibling that followed `content` in `origin`, for exact restore.
    pub next_sibling: Option<NodeId>,
}

/// First connected container declaring `id` under `attr`.
pub fn find_container(doc: &Document, attr: &str, id: &str) -> Option<NodeId> {
    doc.query_attr(attr, Some(id))
}

/// The overlay's content slot and its current owner.
#[derive(Debug)]
pub struct ContentSlot {
    node: NodeId,
    container_attr: String,
    marker_attr: String,
    current: Option<Relocation>,
}

impl ContentSlot {
    pub fn new(node: NodeId, naming: &Naming) -> Self {
        Self {
            node,
            container_attr: naming.data(),
            marker_attr: naming.data_part("active-id"),
            current: None,
        }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn current(&self) -> Option<&Relocation> {
        self.current.as_ref()
    }

    /// Id of the container whose content is in the slot.
    pub fn owner(&self) -> Option<&str> {
        self.current.as_ref().map(|r| r.id.as_str())
    }

    /// Whether a container for `id` exists right now.
    pub fn has_container(&self, doc: &Document, id: &str) -> bool {
        !id.is_empty() && find_container(doc, &self.container_attr, id).is_some()
    }

    /// Move the content of container `id` into the slot, returning any other
    /// container's content first. Returns `false` when no container matches,
    /// leaving the slot empty.
    pub fn activate(&mut self, doc: &mut Document, id: &str) -> Result<bool, DomError> {
        if self.owner() == Some(id) {
            return Ok(true);
        }
        self.deactivate(doc)?;
        let Some(origin) = find_container(doc, &self.container_attr, id) else {
            trace!(id, "no container; relocation skipped");
            return Ok(false);
        };

        let content = doc.first_element_child(origin);
        let next_sibling = content.and_then(|c| doc.next_sibling(c));
        if let Some(content) = content {
            doc.append_child(self.node, content)?;
        }
        doc.set_attribute(self.node, &self.marker_attr, id)?;
        debug!(id, %origin, moved = content.is_some(), "content relocated into slot");
        self.current = Some(Relocation {
            id: id.to_owned(),
            content,
            origin,
            next_sibling,
        });
        Ok(true)
    }

    /// Return the slot's content to its origin container.
    pub fn deactivate(&mut self, doc: &mut Document) -> Result<(), DomError> {
        let Some(relocation) = self.current.take() else {
            return Ok(());
        };
        doc.remove_attribute(self.node, &self.marker_attr)?;
        let Some(content) = relocation.content else {
            return Ok(());
        };
        if doc.parent(content) != Some(self.node) {
            warn!(id = %relocation.id, %content, "relocated content left the slot; not restored");
            return Ok(());
        }
        if !doc.is_connected(relocation.origin) {
            warn!(id = %relocation.id, origin = %relocation.origin, "origin container gone; content detached");
            return doc.detach(content);
        }
        let reference = relocation
            .next_sibling
            .filter(|sibling| doc.parent(*sibling) == Some(relocation.origin));
        doc.insert_before(relocation.origin, content, reference)?;
        debug!(id = %relocation.id, origin = %relocation.origin, "content returned to origin");
        Ok(())
    }
}
