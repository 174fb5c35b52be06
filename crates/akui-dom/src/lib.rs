#![forbid(unsafe_code)]

//! Deterministic, host-driven page model for akui.
//!
//! `akui-dom` provides the browser surface the overlay controller runs
//! against: an arena [`Document`], bubbling [`DomEvent`] dispatch, session
//! [`History`] with `popstate`, a virtual-clock timer queue and a
//! [`UserAgent`] probe. Everything hangs off a single [`Page`] that the host
//! owns and drives.
//!
//! # Example
//!
//! ```
//! use akui_dom::{EventTarget, EventType, Page};
//!
//! let mut page = Page::default();
//! let body = page.document().body();
//! page.add_event_listener(EventTarget::Node(body), EventType::Click, |page, _| {
//!     page.push_state(None, "#clicked")
//! });
//! page.click(body).unwrap();
//! assert_eq!(page.hash(), "clicked");
//! ```

pub mod delegate;
pub mod document;
pub mod error;
pub mod event;
pub mod history;
pub mod page;
pub mod timer;
pub mod useragent;

pub use delegate::{DelegateKey, DelegateRegistry, DelegatedListener};
pub use document::{Document, ElementData, NodeId, NodeKind};
pub use error::DomError;
pub use event::{DomEvent, EventDetail, EventTarget, EventType, Key, ListenerId, NativeHandler};
pub use history::{History, HistoryEntry};
pub use page::Page;
pub use timer::{PendingTimer, Scheduler, TimerCallback, TimerId};
pub use useragent::UserAgent;
