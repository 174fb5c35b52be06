#![forbid(unsafe_code)]

//! Overlay configuration.
//!
//! A config starts from documented defaults ([`ModalConfig::default`],
//! [`VideoModalConfig::default`]) and is adjusted either with builder
//! setters or by merging an all-optional override set ([`ModalOptions`],
//! [`VideoModalOptions`]) through [`resolve`]. Override sets deserialize from
//! camelCase JSON so embedders can pass options straight from markup or a
//! bootstrap script.
//!
//! # Invariants
//!
//! 1. Merging is shallow: a present override replaces the default value
//!    wholesale (player vars included); an absent one keeps it.
//! 2. A config is never mutated once handed to `init`.
//!
//! # Failure Modes
//!
//! - Option JSON with a wrongly typed value (e.g. a numeric prefix):
//!   [`ModalError::Options`].

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use akui_dom::NodeId;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ModalError;

/// Called with the id that was opened.
pub type OpenCallback = Rc<dyn Fn(&str)>;

/// Called with the id that was open before closing, if any.
pub type CloseCallback = Rc<dyn Fn(Option<&str>)>;

/// Class and attribute names derived from one base name.
///
/// With base `ak-modal`: root class `ak-modal`, parts `ak-modal-x`,
/// modifiers `ak-modal--enter`, container attribute `data-ak-modal`, trigger
/// attribute `data-ak-modal-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Naming {
    base: String,
}

impl Naming {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    #[inline]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `<base>-<part>`
    pub fn element(&self, part: &str) -> String {
        format!("{}-{part}", self.base)
    }

    /// `<base>--<modifier>`
    pub fn modifier(&self, modifier: &str) -> String {
        format!("{}--{modifier}", self.base)
    }

    /// `data-<base>`
    pub fn data(&self) -> String {
        format!("data-{}", self.base)
    }

    /// `data-<base>-<part>`
    pub fn data_part(&self, part: &str) -> String {
        format!("data-{}-{part}", self.base)
    }
}

/// A config that can absorb an override set.
pub trait Resolve: Sized {
    type Overrides;

    fn merge(self, overrides: &Self::Overrides) -> Self;
}

/// Shallow-merge `overrides` over `defaults`.
pub fn resolve<C: Resolve>(defaults: C, overrides: &C::Overrides) -> C {
    defaults.merge(overrides)
}

fn replace<T: Clone>(slot: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

fn millis(slot: &mut Duration, value: Option<u64>) {
    if let Some(ms) = value {
        *slot = Duration::from_millis(ms);
    }
}

// ---------------------------------------------------------------------------
// Modal
// ---------------------------------------------------------------------------

/// Resolved configuration of the content modal.
#[derive(Clone)]
pub struct ModalConfig {
    /// Base for every class and data attribute the overlay reads or writes.
    pub class_name: String,
    /// Mirror open/close state into session history and the fragment.
    pub history: bool,
    /// Prepended to the id in the fragment (`#<prefix><id>`).
    pub history_name_prefix: String,
    /// Key of the id inside pushed history states.
    pub history_state_key: String,
    pub transition_duration: Duration,
    /// Delay before `--visible` on enter; zero falls back to
    /// `transition_duration`.
    pub visibility_duration: Duration,
    pub set_scroll_on_close: bool,
    /// Put the close button on `<html>` instead of inside the overlay root.
    pub add_close_button_to_document: bool,
    /// Inject `[data-<name>] { display: none !important }`.
    pub hide_containers: bool,
    pub on_modal_open: Option<OpenCallback>,
    pub on_modal_close: Option<CloseCallback>,
    /// Mount point of the overlay root; `<body>` when unset.
    pub parent: Option<NodeId>,
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            class_name: "ak-modal".to_owned(),
            history: true,
            history_name_prefix: String::new(),
            history_state_key: "akModalId".to_owned(),
            transition_duration: Duration::from_millis(300),
            visibility_duration: Duration::ZERO,
            set_scroll_on_close: true,
            add_close_button_to_document: false,
            hide_containers: false,
            on_modal_open: None,
            on_modal_close: None,
            parent: None,
        }
    }
}

impl fmt::Debug for ModalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalConfig")
            .field("class_name", &self.class_name)
            .field("history", &self.history)
            .field("history_name_prefix", &self.history_name_prefix)
            .field("history_state_key", &self.history_state_key)
            .field("transition_duration", &self.transition_duration)
            .field("visibility_duration", &self.visibility_duration)
            .field("set_scroll_on_close", &self.set_scroll_on_close)
            .field(
                "add_close_button_to_document",
                &self.add_close_button_to_document,
            )
            .field("hide_containers", &self.hide_containers)
            .field("on_modal_open", &self.on_modal_open.is_some())
            .field("on_modal_close", &self.on_modal_close.is_some())
            .field("parent", &self.parent)
            .finish()
    }
}

impl ModalConfig {
    /// Defaults merged with options parsed from JSON.
    pub fn from_json(json: &str) -> Result<Self, ModalError> {
        Ok(resolve(Self::default(), &ModalOptions::from_json(json)?))
    }

    pub fn naming(&self) -> Naming {
        Naming::new(self.class_name.as_str())
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history = enabled;
        self
    }

    pub fn with_visibility_duration(mut self, duration: Duration) -> Self {
        self.visibility_duration = duration;
        self
    }

    pub fn with_hidden_containers(mut self, enabled: bool) -> Self {
        self.hide_containers = enabled;
        self
    }

    pub fn with_on_modal_open(mut self, callback: impl Fn(&str) + 'static) -> Self {
        self.on_modal_open = Some(Rc::new(callback));
        self
    }

    pub fn with_on_modal_close(mut self, callback: impl Fn(Option<&str>) + 'static) -> Self {
        self.on_modal_close = Some(Rc::new(callback));
        self
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Overrides for [`ModalConfig`]. Durations are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModalOptions {
    pub class_name: Option<String>,
    pub history: Option<bool>,
    pub history_name_prefix: Option<String>,
    pub history_state_key: Option<String>,
    pub transition_duration: Option<u64>,
    pub visibility_duration: Option<u64>,
    pub set_scroll_on_close: Option<bool>,
    pub add_close_button_to_document: Option<bool>,
    pub hide_containers: Option<bool>,
}

impl ModalOptions {
    pub fn from_json(json: &str) -> Result<Self, ModalError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Resolve for ModalConfig {
    type Overrides = ModalOptions;

    fn merge(mut self, o: &ModalOptions) -> Self {
        replace(&mut self.class_name, o.class_name.as_ref());
        replace(&mut self.history, o.history.as_ref());
        replace(&mut self.history_name_prefix, o.history_name_prefix.as_ref());
        replace(&mut self.history_state_key, o.history_state_key.as_ref());
        millis(&mut self.transition_duration, o.transition_duration);
        millis(&mut self.visibility_duration, o.visibility_duration);
        replace(&mut self.set_scroll_on_close, o.set_scroll_on_close.as_ref());
        replace(
            &mut self.add_close_button_to_document,
            o.add_close_button_to_document.as_ref(),
        );
        replace(&mut self.hide_containers, o.hide_containers.as_ref());
        self
    }
}

// ---------------------------------------------------------------------------
// Video modal
// ---------------------------------------------------------------------------

/// Resolved configuration of the video modal.
#[derive(Debug, Clone)]
pub struct VideoModalConfig {
    /// Shared overlay settings; only the defaults differ from the content
    /// modal.
    pub modal: ModalConfig,
    /// Hand off to the native app on iOS/Android instead of opening the
    /// overlay.
    pub use_handler_on_mobile: bool,
    /// Prefix of the mobile handoff URL; the video id is appended.
    pub mobile_handler_url: String,
    /// Player API script appended to `<body>` on init; `None` skips it.
    pub api_script_src: Option<String>,
    /// Delay before play/pause reach the player after a transition starts.
    pub player_control_delay: Duration,
    pub player_vars: Map<String, Value>,
}

impl Default for VideoModalConfig {
    fn default() -> Self {
        Self {
            modal: ModalConfig {
                class_name: "ak-youtubemodal".to_owned(),
                history: false,
                history_name_prefix: "video:".to_owned(),
                history_state_key: "videoId".to_owned(),
                set_scroll_on_close: false,
                ..ModalConfig::default()
            },
            use_handler_on_mobile: true,
            mobile_handler_url: "https://m.youtube.com/watch?v=".to_owned(),
            api_script_src: Some("https://www.youtube.com/iframe_api".to_owned()),
            player_control_delay: Duration::from_millis(100),
            player_vars: default_player_vars(),
        }
    }
}

fn default_player_vars() -> Map<String, Value> {
    [
        ("autohide", 1),
        ("autoplay", 1),
        ("fs", 1),
        ("modestbranding", 1),
        ("rel", 0),
        ("showinfo", 0),
        ("iv_load_policy", 3),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), Value::from(value)))
    .collect()
}

impl VideoModalConfig {
    pub fn from_json(json: &str) -> Result<Self, ModalError> {
        Ok(resolve(Self::default(), &VideoModalOptions::from_json(json)?))
    }

    pub fn naming(&self) -> Naming {
        self.modal.naming()
    }

    pub fn with_modal(mut self, modal: ModalConfig) -> Self {
        self.modal = modal;
        self
    }

    pub fn with_handler_on_mobile(mut self, enabled: bool) -> Self {
        self.use_handler_on_mobile = enabled;
        self
    }
}

/// Overrides for [`VideoModalConfig`]. Shared keys sit at the top level.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoModalOptions {
    #[serde(flatten)]
    pub modal: ModalOptions,
    pub use_handler_on_mobile: Option<bool>,
    pub mobile_handler_url: Option<String>,
    pub api_script_src: Option<String>,
    pub player_control_delay: Option<u64>,
    pub player_vars: Option<Map<String, Value>>,
}

impl VideoModalOptions {
    pub fn from_json(json: &str) -> Result<Self, ModalError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Resolve for VideoModalConfig {
    type Overrides = VideoModalOptions;

    fn merge(mut self, o: &VideoModalOptions) -> Self {
        self.modal = self.modal.merge(&o.modal);
        replace(&mut self.use_handler_on_mobile, o.use_handler_on_mobile.as_ref());
        replace(&mut self.mobile_handler_url, o.mobile_handler_url.as_ref());
        if let Some(src) = &o.api_script_src {
            self.api_script_src = Some(src.clone());
        }
        millis(&mut self.player_control_delay, o.player_control_delay);
        replace(&mut self.player_vars, o.player_vars.as_ref());
        self
    }
}
