#![forbid(unsafe_code)]

//! The page: everything a browser tab would hand to a script.
//!
//! A [`Page`] bundles the document, native listeners, delegated-listener
//! registry, session history, virtual clock, scroll offset and user agent.
//! The host drives it explicitly: it dispatches input ([`Page::click`],
//! [`Page::key_down`]), moves through history ([`Page::back`]) and advances
//! time ([`Page::advance`]). Nothing happens between those calls, which keeps
//! every interleaving reproducible.
//!
//! # Invariants
//!
//! 1. `push_state`/`replace_state` never fire `popstate`; `back`, `forward`,
//!    `go` and fragment navigation do.
//! 2. Timer callbacks and listeners run with exclusive access to the page; no
//!    other callback runs concurrently.
//! 3. `advance(d)` leaves the clock at exactly `now + d`, even if no task was
//!    due.

use std::any::{Any, TypeId};
use std::time::Duration;

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::delegate::DelegateRegistry;
use crate::document::{Document, NodeId};
use crate::error::DomError;
use crate::event::{
    DomEvent, EventTarget, EventType, Key, ListenerId, ListenerStore, NativeHandler,
};
use crate::history::History;
use crate::timer::{Scheduler, TimerId};
use crate::useragent::UserAgent;

/// URL used by [`Page::default`].
pub const DEFAULT_URL: &str = "https://example.test/";

/// A single browsing context driven by its host.
#[derive(Debug)]
pub struct Page {
    document: Document,
    listeners: ListenerStore,
    delegates: DelegateRegistry,
    history: History,
    scheduler: Scheduler,
    user_agent: UserAgent,
    scroll_y: f64,
    navigations: Vec<Url>,
    extensions: Extensions,
}

impl Default for Page {
    fn default() -> Self {
        let url = Url::parse(DEFAULT_URL).expect("static url");
        Self::with_url(url)
    }
}

impl Page {
    /// Page at `url` with an empty document.
    pub fn new(url: &str) -> Result<Self, DomError> {
        let url = Url::parse(url).map_err(|source| DomError::InvalidUrl {
            input: url.to_owned(),
            source,
        })?;
        Ok(Self::with_url(url))
    }

    fn with_url(url: Url) -> Self {
        Self {
            document: Document::new(),
            listeners: ListenerStore::default(),
            delegates: DelegateRegistry::default(),
            history: History::new(url),
            scheduler: Scheduler::new(),
            user_agent: UserAgent::default(),
            scroll_y: 0.0,
            navigations: Vec::new(),
            extensions: Extensions::default(),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    // --- Document ---

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    // --- Listeners ---

    /// Register a native listener.
    pub fn add_event_listener(
        &mut self,
        target: EventTarget,
        kind: EventType,
        handler: impl Fn(&mut Page, &mut DomEvent) -> Result<(), DomError> + 'static,
    ) -> ListenerId {
        self.add_native_listener(target, kind, std::rc::Rc::new(handler))
    }

    /// Register an already shared handler.
    pub fn add_native_listener(
        &mut self,
        target: EventTarget,
        kind: EventType,
        handler: NativeHandler,
    ) -> ListenerId {
        let id = self.listeners.add(target, kind, handler);
        trace!(?target, %kind, ?id, "listener added");
        id
    }

    /// Remove a native listener. Unknown ids are ignored.
    pub fn remove_event_listener(
        &mut self,
        target: EventTarget,
        kind: EventType,
        id: ListenerId,
    ) -> bool {
        let removed = self.listeners.remove(target, kind, id);
        if removed {
            trace!(?target, %kind, ?id, "listener removed");
        }
        removed
    }

    pub fn has_listener(&self, target: EventTarget, kind: EventType, id: ListenerId) -> bool {
        self.listeners.contains(target, kind, id)
    }

    pub fn listener_count(&self, target: EventTarget, kind: EventType) -> usize {
        self.listeners.count(target, kind)
    }

    /// Native registrations across all targets and types.
    pub fn total_listeners(&self) -> usize {
        self.listeners.total()
    }

    pub fn delegates(&self) -> &DelegateRegistry {
        &self.delegates
    }

    pub(crate) fn delegates_mut(&mut self) -> &mut DelegateRegistry {
        &mut self.delegates
    }

    // --- Dispatch ---

    /// Dispatch `event` along its propagation path and return it, so the
    /// caller can inspect `default_prevented`.
    pub fn dispatch(&mut self, mut event: DomEvent) -> Result<DomEvent, DomError> {
        let kind = event.kind();
        for current in self.propagation_path(&event) {
            event.set_current_target(current);
            for (id, handler) in self.listeners.snapshot(current, kind) {
                // Removed by an earlier handler during this dispatch.
                if !self.listeners.contains(current, kind, id) {
                    continue;
                }
                handler(self, &mut event)?;
            }
            if event.propagation_stopped() {
                break;
            }
        }
        Ok(event)
    }

    fn propagation_path(&self, event: &DomEvent) -> Vec<EventTarget> {
        match event.target() {
            EventTarget::Window => vec![EventTarget::Window],
            EventTarget::Node(node) if !event.kind().bubbles() => vec![EventTarget::Node(node)],
            EventTarget::Node(node) => {
                let mut path: Vec<_> = self
                    .document
                    .ancestors(node)
                    .map(EventTarget::Node)
                    .collect();
                if self.document.is_connected(node) {
                    path.push(EventTarget::Node(self.document.root()));
                }
                path
            }
        }
    }

    /// Click on `node`.
    pub fn click(&mut self, node: NodeId) -> Result<DomEvent, DomError> {
        self.dispatch(DomEvent::click(node))
    }

    /// Key press with focus on `<body>`.
    pub fn key_down(&mut self, key: Key) -> Result<DomEvent, DomError> {
        let body = self.document.body();
        self.key_down_on(body, key)
    }

    /// Key press with focus on `node`.
    pub fn key_down_on(&mut self, node: NodeId, key: Key) -> Result<DomEvent, DomError> {
        self.dispatch(DomEvent::key_down(node, key))
    }

    // --- History & location ---

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Current address (`window.location`).
    pub fn location(&self) -> &Url {
        &self.history.current().url
    }

    /// `location.hash` without the leading `#`; empty when absent.
    pub fn hash(&self) -> &str {
        self.location().fragment().unwrap_or_default()
    }

    /// `history.pushState`.
    pub fn push_state(&mut self, state: Option<Value>, url: &str) -> Result<(), DomError> {
        self.history.push(state, url)?;
        debug!(url = %self.location(), len = self.history.len(), "history push");
        Ok(())
    }

    /// `history.replaceState`.
    pub fn replace_state(&mut self, state: Option<Value>, url: &str) -> Result<(), DomError> {
        self.history.replace(state, url)
    }

    pub fn back(&mut self) -> Result<bool, DomError> {
        self.go(-1)
    }

    pub fn forward(&mut self) -> Result<bool, DomError> {
        self.go(1)
    }

    /// Traverse history by `delta` and fire `popstate` if the entry changed.
    pub fn go(&mut self, delta: isize) -> Result<bool, DomError> {
        let Some(entry) = self.history.go(delta) else {
            return Ok(false);
        };
        let state = entry.state.clone();
        debug!(url = %self.location(), delta, "history traverse");
        self.dispatch(DomEvent::pop_state(state))?;
        Ok(true)
    }

    /// The user edits the fragment in the address bar: a new stateless entry
    /// is created and `popstate` fires.
    pub fn navigate_to_fragment(&mut self, fragment: &str) -> Result<(), DomError> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        self.history.push(None, &format!("#{fragment}"))?;
        debug!(url = %self.location(), "fragment navigation");
        self.dispatch(DomEvent::pop_state(None))?;
        Ok(())
    }

    /// `location.assign(href)`. Cross-document navigation leaves this page,
    /// so it is only recorded.
    pub fn assign(&mut self, href: &str) -> Result<(), DomError> {
        let url = self.history.resolve(href)?;
        debug!(%url, "navigation requested");
        self.navigations.push(url);
        Ok(())
    }

    /// Every URL passed to [`assign`](Self::assign), oldest first.
    pub fn navigations(&self) -> &[Url] {
        &self.navigations
    }

    // --- Scroll ---

    /// `window.pageYOffset`.
    #[inline]
    pub fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    /// `window.scrollTo(0, y)`.
    pub fn scroll_to(&mut self, y: f64) {
        self.scroll_y = y.max(0.0);
    }

    // --- User agent ---

    pub fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, user_agent: UserAgent) {
        self.user_agent = user_agent;
    }

    // --- Timers ---

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// `setTimeout(callback, delay)`.
    pub fn set_timeout(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut Page) -> Result<(), DomError> + 'static,
    ) -> TimerId {
        self.scheduler.set_timeout(delay, Box::new(callback))
    }

    /// `clearTimeout(id)`.
    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        self.scheduler.clear_timeout(id)
    }

    /// Move the clock forward by `delta`, running every task that falls due.
    /// Returns the number of callbacks run.
    pub fn advance(&mut self, delta: Duration) -> Result<usize, DomError> {
        let delta_ms = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        let target = self.scheduler.now_ms().saturating_add(delta_ms);
        let ran = self.drain(Some(target))?;
        self.scheduler.set_now(target);
        Ok(ran)
    }

    /// Run queued tasks, advancing the clock as needed, until none remain.
    pub fn run_until_idle(&mut self) -> Result<usize, DomError> {
        self.drain(None)
    }

    fn drain(&mut self, limit: Option<u64>) -> Result<usize, DomError> {
        let mut ran = 0;
        while let Some((id, callback)) = self.scheduler.pop_due(limit) {
            ran += 1;
            if ran > self.scheduler.step_limit() {
                return Err(DomError::TimerStepLimit {
                    limit: self.scheduler.step_limit(),
                    now_ms: self.scheduler.now_ms(),
                });
            }
            trace!(?id, now_ms = self.scheduler.now_ms(), "timer fired");
            callback(self)?;
        }
        Ok(ran)
    }

    // --- Extensions ---

    /// Store a per-page singleton of type `T`, returning the previous one.
    pub fn insert_extension<T: Any>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extensions.get()
    }

    pub fn remove_extension<T: Any>(&mut self) -> Option<T> {
        self.extensions.remove()
    }
}

/// Type-keyed storage for per-page singletons.
#[derive(Default)]
struct Extensions {
    map: AHashMap<TypeId, Box<dyn Any>>,
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

impl Extensions {
    fn insert<T: Any>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    fn get<T: Any>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    fn remove<T: Any>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn click_bubbles_to_document_root() {
        let mut page = Page::default();
        let button = page.document_mut().create_element("button");
        let body = page.document().body();
        page.document_mut().append_child(body, button).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        for target in [button, body, page.document().root()] {
            let seen = Rc::clone(&seen);
            page.add_event_listener(target.into(), EventType::Click, move |_, event| {
                seen.borrow_mut().push(event.current_target());
                Ok(())
            });
        }

        page.click(button).unwrap();
        let root = page.document().root();
        assert_eq!(
            *seen.borrow(),
            vec![button.into(), body.into(), EventTarget::Node(root)]
        );
    }

    #[test]
    fn stop_propagation_halts_bubbling() {
        let mut page = Page::default();
        let body = page.document().body();
        let root = page.document().root();
        let reached_root = Rc::new(Cell::new(false));
        page.add_event_listener(body.into(), EventType::Click, |_, event| {
            event.stop_propagation();
            Ok(())
        });
        let flag = Rc::clone(&reached_root);
        page.add_event_listener(root.into(), EventType::Click, move |_, _| {
            flag.set(true);
            Ok(())
        });
        page.click(body).unwrap();
        assert!(!reached_root.get());
    }

    #[test]
    fn listener_removed_mid_dispatch_does_not_run() {
        let mut page = Page::default();
        let body = page.document().body();
        let ran = Rc::new(Cell::new(0));
        let victim: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let v = Rc::clone(&victim);
        page.add_event_listener(body.into(), EventType::KeyDown, move |page, _| {
            if let Some(id) = v.get() {
                let body = page.document().body();
                page.remove_event_listener(body.into(), EventType::KeyDown, id);
            }
            Ok(())
        });
        let r = Rc::clone(&ran);
        let id = page.add_event_listener(body.into(), EventType::KeyDown, move |_, _| {
            r.set(r.get() + 1);
            Ok(())
        });
        victim.set(Some(id));

        page.key_down(Key::Escape).unwrap();
        assert_eq!(ran.get(), 0);
        assert_eq!(page.listener_count(body.into(), EventType::KeyDown), 1);
    }

    #[test]
    fn back_fires_popstate_with_entry_state() {
        let mut page = Page::new("https://example.test/landing").unwrap();
        page.push_state(Some(json!({"akModalId": "a"})), "#a").unwrap();
        page.push_state(Some(json!({"akModalId": "b"})), "#b").unwrap();

        let states = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&states);
        page.add_event_listener(EventTarget::Window, EventType::PopState, move |_, event| {
            s.borrow_mut().push(event.state().cloned());
            Ok(())
        });

        assert!(page.back().unwrap());
        assert_eq!(page.hash(), "a");
        assert!(page.back().unwrap());
        assert_eq!(page.hash(), "");
        assert!(!page.back().unwrap());
        assert!(page.forward().unwrap());

        assert_eq!(
            *states.borrow(),
            vec![Some(json!({"akModalId": "a"})), None, Some(json!({"akModalId": "a"}))]
        );
    }

    #[test]
    fn fragment_navigation_pushes_stateless_entry() {
        let mut page = Page::default();
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        page.add_event_listener(EventTarget::Window, EventType::PopState, move |_, event| {
            assert!(event.state().is_none());
            f.set(f.get() + 1);
            Ok(())
        });
        page.navigate_to_fragment("#pricing").unwrap();
        assert_eq!(page.hash(), "pricing");
        assert_eq!(page.history().len(), 2);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn advance_runs_due_tasks_in_order() {
        let mut page = Page::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, label) in [(300, "late"), (0, "a"), (0, "b")] {
            let log = Rc::clone(&log);
            page.set_timeout(Duration::from_millis(delay), move |page| {
                log.borrow_mut().push((label, page.now_ms()));
                Ok(())
            });
        }

        assert_eq!(page.advance(Duration::from_millis(299)).unwrap(), 2);
        assert_eq!(page.now_ms(), 299);
        assert_eq!(page.advance(Duration::from_millis(1)).unwrap(), 1);
        assert_eq!(*log.borrow(), vec![("a", 0), ("b", 0), ("late", 300)]);
    }

    #[test]
    fn timers_scheduled_by_timers_run_when_due() {
        let mut page = Page::default();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        page.set_timeout(Duration::from_millis(10), move |page| {
            let h = Rc::clone(&h);
            h.set(h.get() + 1);
            page.set_timeout(Duration::from_millis(10), move |_| {
                h.set(h.get() + 1);
                Ok(())
            });
            Ok(())
        });
        page.advance(Duration::from_millis(25)).unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn runaway_timers_hit_step_limit() {
        fn reschedule(page: &mut Page) -> Result<(), DomError> {
            page.set_timeout(Duration::ZERO, reschedule);
            Ok(())
        }
        let mut page = Page::default();
        page.scheduler_mut().set_step_limit(50);
        page.set_timeout(Duration::ZERO, reschedule);
        let err = page.run_until_idle().unwrap_err();
        assert_eq!(err, DomError::TimerStepLimit { limit: 50, now_ms: 0 });
    }

    #[test]
    fn assign_records_navigation() {
        let mut page = Page::default();
        page.assign("https://m.youtube.com/watch?v=abc").unwrap();
        assert_eq!(
            page.navigations()[0].as_str(),
            "https://m.youtube.com/watch?v=abc"
        );
        assert_eq!(page.location().as_str(), DEFAULT_URL);
    }

    #[test]
    fn extensions_are_type_keyed() {
        #[derive(Debug, PartialEq)]
        struct Slot(u8);
        let mut page = Page::default();
        assert!(page.extension::<Slot>().is_none());
        assert_eq!(page.insert_extension(Slot(1)), None);
        assert_eq!(page.insert_extension(Slot(2)), Some(Slot(1)));
        assert_eq!(page.extension::<Slot>(), Some(&Slot(2)));
        assert_eq!(page.remove_extension::<Slot>(), Some(Slot(2)));
        assert!(page.extension::<Slot>().is_none());
    }
}
