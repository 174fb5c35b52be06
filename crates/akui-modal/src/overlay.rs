#![forbid(unsafe_code)]

//! Overlay core shared by the content modal and the video modal.
//!
//! Every state change funnels through [`Overlay::set_active`]: the surface is
//! updated synchronously (content relocated, or left for the player), then
//! the [`Sequencer`] schedules the class transition, then [`HistorySync`]
//! optionally pushes an entry. Clicks, the load-time fragment, `popstate`
//! and the escape key all end up there.
//!
//! State lives in an `Rc<RefCell<Overlay>>`. Listeners and timers hold a
//! `Weak` and re-borrow per call, so no borrow is held while the page
//! dispatches. User callbacks run after the borrow is released.
//!
//! # Invariants
//!
//! 1. Pending timers are cancelled before any surface change.
//! 2. A closed content modal keeps its content in the slot until the exit
//!    transition ends; reopening before then cancels the return.
//! 3. After [`Overlay::dispose`] the instance owns no listener, timer or node.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use akui_dom::delegate;
use akui_dom::{
    DelegatedListener, Document, DomError, DomEvent, EventTarget, EventType, Key, ListenerId,
    NativeHandler, NodeId, Page,
};
use tracing::{debug, warn};

use crate::config::{CloseCallback, ModalConfig, Naming, OpenCallback};
use crate::error::OverlayKind;
use crate::history_sync::{HistorySync, OverlayState};
use crate::relocation::ContentSlot;
use crate::sequencer::{Sequencer, TransitionPhase};
use crate::video::{self, PlayerHost};

pub(crate) type SharedOverlay = Rc<RefCell<Overlay>>;

/// What the overlay shows.
pub(crate) enum Surface {
    Content(ContentSlot),
    Player(PlayerHost),
}

/// Result of inspecting one node on a click's ancestor walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClickAction {
    Open(String),
    Close,
}

/// User callback to run once the overlay borrow is released.
enum Notice {
    Opened(OpenCallback, String),
    Closed(CloseCallback, Option<String>),
}

impl Notice {
    fn fire(self) {
        match self {
            Self::Opened(callback, id) => callback(&id),
            Self::Closed(callback, previous) => callback(previous.as_deref()),
        }
    }
}

/// Nodes created for the overlay.
#[derive(Debug, Clone)]
pub(crate) struct Scaffold {
    pub root: NodeId,
    /// One node per requested part, in order.
    pub parts: Vec<NodeId>,
    /// Nodes to detach on dispose.
    pub owned: Vec<NodeId>,
}

/// Build `root > (close, parts...)` under `parent` (default `<body>`). With
/// `close_on_document` the close button goes on `<html>` instead.
pub(crate) fn build_scaffold(
    doc: &mut Document,
    naming: &Naming,
    parts: &[&str],
    close_on_document: bool,
    parent: Option<NodeId>,
) -> Result<Scaffold, DomError> {
    let root = doc.create_element_with_class("div", naming.base());
    let close = doc.create_element_with_class("div", &naming.element("x"));
    doc.set_attribute(close, "aria-label", "Close")?;
    doc.set_attribute(close, "role", "button")?;
    doc.set_attribute(close, "tabindex", "0")?;

    let mut owned = vec![root];
    if close_on_document {
        doc.append_child(doc.document_element(), close)?;
        owned.push(close);
    } else {
        doc.append_child(root, close)?;
    }

    let parts = parts
        .iter()
        .map(|part| {
            let node = doc.create_element_with_class("div", &naming.element(part));
            doc.append_child(root, node).map(|()| node)
        })
        .collect::<Result<Vec<_>, _>>()?;

    doc.append_child(parent.unwrap_or(doc.body()), root)?;
    Ok(Scaffold { root, parts, owned })
}

pub(crate) struct Overlay {
    kind: OverlayKind,
    naming: Naming,
    trigger_attr: String,
    root: NodeId,
    owned: Vec<NodeId>,
    surface: Surface,
    sequencer: Sequencer,
    history: HistorySync,
    transition: Duration,
    active_id: Option<String>,
    on_open: Option<OpenCallback>,
    on_close: Option<CloseCallback>,
    click: Option<DelegatedListener>,
    popstate: Option<ListenerId>,
    disposed: bool,
}

impl Overlay {
    pub(crate) fn new(
        kind: OverlayKind,
        config: &ModalConfig,
        scaffold: &Scaffold,
        surface: Surface,
    ) -> Self {
        let naming = config.naming();
        let trigger_attr = match kind {
            OverlayKind::Modal => naming.data_part("id"),
            OverlayKind::Video => naming.data_part("video-id"),
        };
        Self {
            kind,
            trigger_attr,
            root: scaffold.root,
            owned: scaffold.owned.clone(),
            surface,
            sequencer: Sequencer::new(
                scaffold.root,
                &naming,
                config.transition_duration,
                config.visibility_duration,
                config.set_scroll_on_close,
            ),
            history: HistorySync::new(
                config.history,
                config.history_name_prefix.as_str(),
                config.history_state_key.as_str(),
            ),
            naming,
            transition: config.transition_duration,
            active_id: None,
            on_open: config.on_modal_open.clone(),
            on_close: config.on_modal_close.clone(),
            click: None,
            popstate: None,
            disposed: false,
        }
    }

    /// Detach `node` when the overlay is disposed.
    pub(crate) fn own_node(&mut self, node: NodeId) {
        self.owned.push(node);
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub(crate) fn phase(&self) -> TransitionPhase {
        self.sequencer.phase()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub(crate) fn surface(&self) -> &Surface {
        &self.surface
    }

    pub(crate) fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// Content modal: a container for `id` exists. Video: `id` is non-empty.
    pub(crate) fn is_valid_id(&self, doc: &Document, id: &str) -> bool {
        match &self.surface {
            Surface::Content(slot) => slot.has_container(doc, id),
            Surface::Player(_) => !id.is_empty(),
        }
    }

    /// Open trigger first, then the close markers.
    pub(crate) fn classify_click(&self, doc: &Document, node: NodeId) -> Option<ClickAction> {
        if let Some(id) = doc
            .attribute(node, &self.trigger_attr)
            .filter(|id| !id.is_empty())
        {
            return Some(ClickAction::Open(id));
        }
        let closes = doc.has_class(node, &self.naming.element("x"))
            || doc.has_attribute(node, &self.naming.data_part("x"));
        closes.then_some(ClickAction::Close)
    }

    /// Single entry point for every open/close.
    pub(crate) fn set_active(
        this: &SharedOverlay,
        page: &mut Page,
        active: bool,
        id: Option<&str>,
        update_history: bool,
    ) -> Result<(), DomError> {
        let notice = this
            .borrow_mut()
            .transition(Rc::downgrade(this), page, active, id, update_history)?;
        if let Some(notice) = notice {
            notice.fire();
        }
        Ok(())
    }

    /// Open `id` the way this overlay kind opens things.
    pub(crate) fn open(
        this: &SharedOverlay,
        page: &mut Page,
        id: &str,
        update_history: bool,
    ) -> Result<(), DomError> {
        let kind = this.borrow().kind;
        match kind {
            OverlayKind::Modal => Self::set_active(this, page, true, Some(id), update_history),
            OverlayKind::Video => video::play_shared(this, page, id, update_history),
        }
    }

    fn transition(
        &mut self,
        weak: Weak<RefCell<Overlay>>,
        page: &mut Page,
        active: bool,
        id: Option<&str>,
        update_history: bool,
    ) -> Result<Option<Notice>, DomError> {
        let _span = tracing::debug_span!(
            "set_active",
            kind = %self.kind,
            active,
            id = id.unwrap_or_default(),
            update_history
        )
        .entered();

        if self.disposed {
            warn!("set_active on a disposed overlay ignored");
            return Ok(None);
        }
        self.sequencer.cancel_pending(page);

        let notice = if active {
            if let (Surface::Content(slot), Some(id)) = (&mut self.surface, id) {
                slot.activate(page.document_mut(), id)?;
            }
            self.active_id = id.map(str::to_owned);
            self.on_open
                .as_ref()
                .zip(id)
                .map(|(callback, id)| Notice::Opened(Rc::clone(callback), id.to_owned()))
        } else {
            let previous = self.active_id.take();
            self.on_close
                .as_ref()
                .map(|callback| Notice::Closed(Rc::clone(callback), previous))
        };

        self.sequencer.set_visible(page, active);

        if !active && matches!(self.surface, Surface::Content(_)) {
            let weak = weak.clone();
            self.sequencer.schedule(page, self.transition, move |page| {
                if let Some(this) = weak.upgrade() {
                    this.borrow_mut().return_content(page)?;
                }
                Ok(())
            });
        }

        if let Surface::Player(host) = &self.surface
            && host.has_player()
        {
            let delay = host.control_delay();
            self.sequencer.schedule(page, delay, move |page| match weak.upgrade() {
                Some(this) => video::control_shared(&this, page, active),
                None => Ok(()),
            });
        }

        if update_history {
            self.history
                .record(page, if active { id } else { None })?;
        }
        debug!(active_id = ?self.active_id, "overlay state applied");
        Ok(notice)
    }

    fn return_content(&mut self, page: &mut Page) -> Result<(), DomError> {
        match &mut self.surface {
            Surface::Content(slot) => slot.deactivate(page.document_mut()),
            Surface::Player(_) => Ok(()),
        }
    }

    /// Wire the click listener, the escape handler and, with history on, the
    /// load-time state and `popstate`.
    pub(crate) fn install(this: &SharedOverlay, page: &mut Page) -> Result<(), DomError> {
        let weak = Rc::downgrade(this);

        let listener = DelegatedListener::new({
            let weak = weak.clone();
            move |page, node, event| {
                let Some(this) = weak.upgrade() else {
                    return Ok(());
                };
                let action = this.borrow().classify_click(page.document(), node);
                match action {
                    Some(ClickAction::Open(id)) => {
                        event.prevent_default();
                        Self::open(&this, page, &id, true)
                    }
                    Some(ClickAction::Close) => Self::set_active(&this, page, false, None, true),
                    None => Ok(()),
                }
            }
        });
        let document = page.document().root();
        delegate::attach(page, document, EventType::Click, &listener);
        this.borrow_mut().click = Some(listener);

        this.borrow_mut()
            .sequencer
            .set_escape_handler(escape_handler(weak.clone()));

        if !this.borrow().history.is_enabled() {
            return Ok(());
        }

        let initial = {
            let overlay = this.borrow();
            let view: &Page = page;
            overlay
                .history
                .initial_state(view, |id| overlay.is_valid_id(view.document(), id))
        };
        if let OverlayState::Open(id) = initial {
            debug!(%id, "opening from fragment");
            Self::open(this, page, &id, false)?;
        }

        let popstate = page.add_event_listener(
            EventTarget::Window,
            EventType::PopState,
            move |page, event| {
                let Some(this) = weak.upgrade() else {
                    return Ok(());
                };
                let state = {
                    let overlay = this.borrow();
                    let view: &Page = page;
                    overlay.history.resolve_pop(view, event.state(), |id| {
                        overlay.is_valid_id(view.document(), id)
                    })
                };
                match state {
                    OverlayState::Open(id) => Self::open(&this, page, &id, false),
                    OverlayState::Closed => Self::set_active(&this, page, false, None, false),
                }
            },
        );
        this.borrow_mut().popstate = Some(popstate);
        Ok(())
    }

    /// Undo everything `install` and the constructor did.
    pub(crate) fn dispose(this: &SharedOverlay, page: &mut Page) -> Result<(), DomError> {
        let retired = {
            let mut guard = this.borrow_mut();
            let overlay = &mut *guard;
            if overlay.disposed {
                return Ok(());
            }
            overlay.sequencer.dispose(page);
            if let Surface::Content(slot) = &mut overlay.surface {
                slot.deactivate(page.document_mut())?;
            }
            if let Some(listener) = overlay.click.take() {
                let document = page.document().root();
                delegate::detach(page, document, EventType::Click, &listener);
            }
            if let Some(id) = overlay.popstate.take() {
                page.remove_event_listener(EventTarget::Window, EventType::PopState, id);
            }
            for node in overlay.owned.drain(..) {
                page.document_mut().detach(node)?;
            }
            overlay.active_id = None;
            overlay.on_open = None;
            overlay.on_close = None;
            overlay.disposed = true;
            debug!(kind = %overlay.kind, "overlay disposed");
            match &mut overlay.surface {
                Surface::Player(host) => host.retire(),
                Surface::Content(_) => None,
            }
        };
        // The player runs host code; the overlay is no longer borrowed here.
        if let Some(mut player) = retired {
            player.destroy(page);
        }
        Ok(())
    }
}

fn escape_handler(weak: Weak<RefCell<Overlay>>) -> NativeHandler {
    Rc::new(move |page: &mut Page, event: &mut DomEvent| -> Result<(), DomError> {
        if event.key() != Some(&Key::Escape) {
            return Ok(());
        }
        match weak.upgrade() {
            Some(this) => Overlay::set_active(&this, page, false, None, true),
            None => Ok(()),
        }
    })
}
