#![forbid(unsafe_code)]

//! Enter/exit class sequencing on the page's virtual clock.
//!
//! # Timing
//!
//! Enable (`Hidden -> Entering -> Visible`):
//!
//! | Delay | Effect |
//! |-------|--------|
//! | 0 | remove `--exit`, add `--enter`, capture scroll offset |
//! | 0 | add `--enabled` |
//! | `visibility` (or `transition` when zero) | add `--visible`, phase `Visible` |
//!
//! Disable (`Visible -> Exiting -> Hidden`):
//!
//! | Delay | Effect |
//! |-------|--------|
//! | 0 | remove `--enter`, add `--exit`, restore scroll offset if configured |
//! | `transition` | remove `--enabled`, phase `Hidden` |
//! | 0 | remove `--visible` |
//!
//! # Invariants
//!
//! 1. Every timer the sequencer (or its owner via [`Sequencer::schedule`])
//!    creates is tracked, and all of them are cancelled before a new
//!    `set_visible` schedules anything.
//! 2. At most one escape listener is installed; it exists while the overlay
//!    is enabled and is gone as soon as disabling starts.
//! 3. Once the clock passes the longest delay, the root's classes reflect
//!    only the most recent `set_visible` call.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use akui_dom::{DomError, EventType, ListenerId, NativeHandler, NodeId, Page, TimerId};
use tracing::trace;

use crate::config::Naming;

/// Visibility phase of the overlay root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    #[default]
    Hidden,
    Entering,
    Visible,
    Exiting,
}

impl TransitionPhase {
    /// `Entering` or `Visible`.
    #[inline]
    pub const fn is_shown(self) -> bool {
        matches!(self, Self::Entering | Self::Visible)
    }
}

#[derive(Debug)]
struct PhaseClasses {
    enter: String,
    exit: String,
    enabled: String,
    visible: String,
}

/// State written by timer callbacks.
#[derive(Debug, Default)]
struct Shared {
    phase: Cell<TransitionPhase>,
    scroll_anchor: Cell<f64>,
}

/// Drives the root's transition classes and the escape-key listener.
pub struct Sequencer {
    root: NodeId,
    classes: Rc<PhaseClasses>,
    transition: Duration,
    visibility: Duration,
    restore_scroll: bool,
    shared: Rc<Shared>,
    timers: Vec<TimerId>,
    escape_handler: Option<NativeHandler>,
    escape: Option<(NodeId, ListenerId)>,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("root", &self.root)
            .field("phase", &self.shared.phase.get())
            .field("timers", &self.timers)
            .field("escape", &self.escape)
            .finish()
    }
}

impl Sequencer {
    pub fn new(
        root: NodeId,
        naming: &Naming,
        transition: Duration,
        visibility: Duration,
        restore_scroll: bool,
    ) -> Self {
        Self {
            root,
            classes: Rc::new(PhaseClasses {
                enter: naming.modifier("enter"),
                exit: naming.modifier("exit"),
                enabled: naming.modifier("enabled"),
                visible: naming.modifier("visible"),
            }),
            transition,
            visibility,
            restore_scroll,
            shared: Rc::default(),
            timers: Vec::new(),
            escape_handler: None,
            escape: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> TransitionPhase {
        self.shared.phase.get()
    }

    /// Scroll offset captured when the overlay last entered.
    pub fn scroll_anchor(&self) -> f64 {
        self.shared.scroll_anchor.get()
    }

    /// Tracked timers that have not fired yet.
    pub fn pending(&self, page: &Page) -> usize {
        self.timers
            .iter()
            .filter(|id| page.scheduler().is_pending(**id))
            .count()
    }

    /// Handler installed on `<body>` for `keydown` while enabled.
    pub fn set_escape_handler(&mut self, handler: NativeHandler) {
        self.escape_handler = Some(handler);
    }

    pub fn escape_installed(&self) -> bool {
        self.escape.is_some()
    }

    /// Start the enter or exit sequence, cancelling whatever was pending.
    pub fn set_visible(&mut self, page: &mut Page, enabled: bool) {
        self.cancel_pending(page);
        if enabled {
            self.install_escape(page);
        } else {
            self.remove_escape(page);
        }
        self.shared.phase.set(if enabled {
            TransitionPhase::Entering
        } else {
            TransitionPhase::Exiting
        });

        let root = self.root;
        let restore_scroll = self.restore_scroll;

        let (classes, shared) = (Rc::clone(&self.classes), Rc::clone(&self.shared));
        self.schedule(page, Duration::ZERO, move |page| {
            if enabled {
                page.document_mut().remove_class(root, &classes.exit)?;
                page.document_mut().add_class(root, &classes.enter)?;
                shared.scroll_anchor.set(page.scroll_y());
            } else {
                page.document_mut().remove_class(root, &classes.enter)?;
                page.document_mut().add_class(root, &classes.exit)?;
                if restore_scroll {
                    page.scroll_to(shared.scroll_anchor.get());
                }
            }
            Ok(())
        });

        let enabled_delay = if enabled { Duration::ZERO } else { self.transition };
        let (classes, shared) = (Rc::clone(&self.classes), Rc::clone(&self.shared));
        self.schedule(page, enabled_delay, move |page| {
            page.document_mut()
                .toggle_class(root, &classes.enabled, enabled)?;
            if !enabled {
                shared.phase.set(TransitionPhase::Hidden);
            }
            Ok(())
        });

        let visible_delay = match (enabled, self.visibility.is_zero()) {
            (false, _) => Duration::ZERO,
            (true, true) => self.transition,
            (true, false) => self.visibility,
        };
        let (classes, shared) = (Rc::clone(&self.classes), Rc::clone(&self.shared));
        self.schedule(page, visible_delay, move |page| {
            page.document_mut()
                .toggle_class(root, &classes.visible, enabled)?;
            if enabled {
                shared.phase.set(TransitionPhase::Visible);
            }
            Ok(())
        });
    }

    /// Queue a tracked timer; it is cancelled with the transition timers.
    pub fn schedule(
        &mut self,
        page: &mut Page,
        delay: Duration,
        callback: impl FnOnce(&mut Page) -> Result<(), DomError> + 'static,
    ) -> TimerId {
        self.timers.retain(|id| page.scheduler().is_pending(*id));
        let id = page.set_timeout(delay, callback);
        trace!(?id, delay_ms = delay.as_millis(), "transition timer scheduled");
        self.timers.push(id);
        id
    }

    /// Cancel every tracked timer. Returns how many were still pending.
    pub fn cancel_pending(&mut self, page: &mut Page) -> usize {
        let cancelled = self
            .timers
            .drain(..)
            .filter(|id| page.clear_timeout(*id))
            .count();
        if cancelled > 0 {
            trace!(cancelled, "stale transition timers cancelled");
        }
        cancelled
    }

    fn install_escape(&mut self, page: &mut Page) {
        if self.escape.is_some() {
            return;
        }
        let Some(handler) = &self.escape_handler else {
            return;
        };
        let body = page.document().body();
        let id = page.add_native_listener(body.into(), EventType::KeyDown, Rc::clone(handler));
        self.escape = Some((body, id));
    }

    /// Remove the escape listener; a no-op when none is installed.
    pub fn remove_escape(&mut self, page: &mut Page) {
        if let Some((body, id)) = self.escape.take() {
            page.remove_event_listener(body.into(), EventType::KeyDown, id);
        }
    }

    /// Cancel timers, drop the escape listener and forget its handler.
    pub fn dispose(&mut self, page: &mut Page) {
        self.cancel_pending(page);
        self.remove_escape(page);
        self.escape_handler = None;
    }
}
