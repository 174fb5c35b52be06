#![forbid(unsafe_code)]

//! History-synchronized overlay controller.
//!
//! Two page singletons share one core:
//!
//! - [`Modal`]: fills its content slot by relocating markup from
//!   `data-<name>="<id>"` containers and mirrors the open id into the
//!   fragment and session history.
//! - [`VideoModal`]: hosts a lazily created third-party player
//!   ([`PlayerFactory`]) and hands off to a native handler on mobile.
//!
//! Both are driven by clicks delegated from the document root, `popstate`,
//! the escape key and their imperative handles. Visibility changes run
//! through a [`Sequencer`] on the page's virtual clock.
//!
//! # Example
//!
//! ```
//! use akui_dom::Page;
//! use akui_modal::{Modal, ModalConfig, TransitionPhase};
//!
//! let mut page = Page::new("https://example.test/plans#pricing")?;
//! let doc = page.document_mut();
//! let container = doc.create_element("div");
//! doc.set_attribute(container, "data-ak-modal", "pricing")?;
//! let table = doc.create_element("table");
//! doc.append_child(container, table)?;
//! doc.append_child(doc.body(), container)?;
//!
//! let modal = Modal::init(&mut page, ModalConfig::default())?;
//! assert_eq!(modal.active_id().as_deref(), Some("pricing"));
//! page.run_until_idle()?;
//! assert_eq!(modal.phase(), TransitionPhase::Visible);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod history_sync;
pub mod modal;
mod overlay;
pub mod relocation;
pub mod sequencer;
pub mod video;

pub use config::{
    CloseCallback, ModalConfig, ModalOptions, Naming, OpenCallback, Resolve, VideoModalConfig,
    VideoModalOptions, resolve,
};
pub use error::{ModalError, OverlayKind};
pub use history_sync::{HistoryAction, HistorySync, OverlayState};
pub use modal::Modal;
pub use relocation::{ContentSlot, Relocation};
pub use sequencer::{Sequencer, TransitionPhase};
pub use video::{PlayerFactory, VideoModal, VideoPlayer};
