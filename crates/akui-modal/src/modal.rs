#![forbid(unsafe_code)]

//! Content modal: one overlay per page, filled by relocating the first
//! element child of a `data-<name>="<id>"` container.
//!
//! ```
//! use akui_dom::Page;
//! use akui_modal::{Modal, ModalConfig};
//!
//! let mut page = Page::default();
//! let doc = page.document_mut();
//! let container = doc.create_element("div");
//! doc.set_attribute(container, "data-ak-modal", "pricing")?;
//! let content = doc.create_element("section");
//! doc.append_child(container, content)?;
//! doc.append_child(doc.body(), container)?;
//!
//! let modal = Modal::init(&mut page, ModalConfig::default())?;
//! modal.open_by_id(&mut page, "pricing")?;
//! assert_eq!(page.document().parent(content), modal.content_slot());
//! assert_eq!(page.hash(), "pricing");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Failure Modes
//!
//! - Free functions before [`init`]: [`ModalError::NotInitialized`].
//! - Handle methods after `dispose`: [`ModalError::Disposed`].
//! - `open_by_id` with no matching container opens an empty overlay.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use akui_dom::{NodeId, Page};
use tracing::{debug, warn};

use crate::config::ModalConfig;
use crate::error::{ModalError, OverlayKind};
use crate::overlay::{self, Overlay, SharedOverlay, Surface};
use crate::relocation::ContentSlot;
use crate::sequencer::TransitionPhase;

/// Handle to the page's content modal.
#[derive(Clone)]
pub struct Modal {
    inner: SharedOverlay,
}

struct ModalSlot(Modal);

impl fmt::Debug for Modal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overlay = self.inner.borrow();
        f.debug_struct("Modal")
            .field("root", &overlay.root())
            .field("active_id", &overlay.active_id())
            .field("phase", &overlay.phase())
            .field("disposed", &overlay.is_disposed())
            .finish()
    }
}

impl Modal {
    /// Create the page's modal, or return the existing one unchanged.
    pub fn init(page: &mut Page, config: ModalConfig) -> Result<Self, ModalError> {
        if let Some(existing) = Self::get(page) {
            debug!("modal already initialized");
            return Ok(existing);
        }
        let naming = config.naming();
        let scaffold = overlay::build_scaffold(
            page.document_mut(),
            &naming,
            &["mask", "content"],
            config.add_close_button_to_document,
            config.parent,
        )?;
        let slot = ContentSlot::new(scaffold.parts[1], &naming);
        let mut core = Overlay::new(OverlayKind::Modal, &config, &scaffold, Surface::Content(slot));

        if config.hide_containers {
            let selector = format!("[{}]", naming.data());
            let style = page
                .document_mut()
                .create_style(&[(selector.as_str(), "display: none !important")])?;
            core.own_node(style);
        }

        let modal = Self {
            inner: Rc::new(RefCell::new(core)),
        };
        if let Err(err) = Overlay::install(&modal.inner, page) {
            if let Err(cleanup) = Overlay::dispose(&modal.inner, page) {
                warn!(%cleanup, "cleanup after failed install");
            }
            return Err(err.into());
        }
        page.insert_extension(ModalSlot(modal.clone()));
        debug!(class_name = %naming.base(), history = config.history, "modal initialized");
        Ok(modal)
    }

    /// The page's live modal, if any.
    pub fn get(page: &Page) -> Option<Self> {
        page.extension::<ModalSlot>().map(|slot| slot.0.clone())
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), ModalError> {
        if self.inner.borrow().is_disposed() {
            return Err(ModalError::Disposed {
                kind: OverlayKind::Modal,
                operation,
            });
        }
        Ok(())
    }

    /// Open the overlay on container `id` and push a history entry.
    pub fn open_by_id(&self, page: &mut Page, id: &str) -> Result<(), ModalError> {
        self.ensure_live("open_by_id")?;
        Overlay::set_active(&self.inner, page, true, Some(id), true)?;
        Ok(())
    }

    /// Close the overlay and push a history entry.
    pub fn close(&self, page: &mut Page) -> Result<(), ModalError> {
        self.ensure_live("close")?;
        Overlay::set_active(&self.inner, page, false, None, true)?;
        Ok(())
    }

    /// Return relocated content and remove every listener, timer and node
    /// created by [`Modal::init`]. A later `init` builds a fresh instance.
    pub fn dispose(&self, page: &mut Page) -> Result<(), ModalError> {
        self.ensure_live("dispose")?;
        Overlay::dispose(&self.inner, page)?;
        if Self::get(page).is_some_and(|live| Rc::ptr_eq(&live.inner, &self.inner)) {
            page.remove_extension::<ModalSlot>();
        }
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.borrow().active_id().map(str::to_owned)
    }

    pub fn phase(&self) -> TransitionPhase {
        self.inner.borrow().phase()
    }

    /// Entering or visible.
    pub fn is_open(&self) -> bool {
        self.phase().is_shown()
    }

    pub fn root(&self) -> NodeId {
        self.inner.borrow().root()
    }

    /// The `-content` element that receives relocated content.
    pub fn content_slot(&self) -> Option<NodeId> {
        match self.inner.borrow().surface() {
            Surface::Content(slot) => Some(slot.node()),
            Surface::Player(_) => None,
        }
    }

    /// Id of the container whose content currently sits in the slot. Lags
    /// [`Modal::active_id`] by the exit transition after a close.
    pub fn slot_owner(&self) -> Option<String> {
        match self.inner.borrow().surface() {
            Surface::Content(slot) => slot.owner().map(str::to_owned),
            Surface::Player(_) => None,
        }
    }

    /// Timers still pending for the current transition.
    pub fn pending_timers(&self, page: &Page) -> usize {
        self.inner.borrow().sequencer().pending(page)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().is_disposed()
    }
}

/// [`Modal::init`].
pub fn init(page: &mut Page, config: ModalConfig) -> Result<Modal, ModalError> {
    Modal::init(page, config)
}

fn instance(page: &Page, operation: &'static str) -> Result<Modal, ModalError> {
    Modal::get(page).ok_or(ModalError::NotInitialized {
        kind: OverlayKind::Modal,
        operation,
    })
}

pub fn open_by_id(page: &mut Page, id: &str) -> Result<(), ModalError> {
    instance(page, "open_by_id")?.open_by_id(page, id)
}

pub fn close(page: &mut Page) -> Result<(), ModalError> {
    instance(page, "close")?.close(page)
}

pub fn dispose(page: &mut Page) -> Result<(), ModalError> {
    instance(page, "dispose")?.dispose(page)
}
