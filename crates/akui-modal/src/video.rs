#![forbid(unsafe_code)]

//! Video modal: the overlay protocol plus a lazily created player.
//!
//! The player is bound 1:1 to the instance. The first [`VideoModal::play`]
//! asks the [`PlayerFactory`] for a player on the `-player` element; later
//! calls reuse it, loading a different video when the id changes. Each
//! visibility transition schedules play or pause after
//! `player_control_delay`, tracked like the class timers.
//!
//! On iOS/Android with `use_handler_on_mobile`, `play` navigates to
//! `mobile_handler_url + id` and leaves the overlay alone.
//!
//! # Failure Modes
//!
//! - Any call before [`init`]: [`ModalError::NotInitialized`].
//! - Handle used after `dispose`: [`ModalError::Disposed`].
//! - Factory error: propagated; the overlay is already open and the next
//!   `play` retries creation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use akui_dom::{DomError, NodeId, Page};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::config::VideoModalConfig;
use crate::error::{ModalError, OverlayKind};
use crate::overlay::{self, Overlay, SharedOverlay, Surface};
use crate::sequencer::TransitionPhase;

/// Quality requested when switching videos on a live player.
pub const SWITCH_QUALITY: &str = "large";

/// A third-party player bound to one element.
pub trait VideoPlayer {
    fn play_video(&mut self, page: &mut Page);

    fn pause_video(&mut self, page: &mut Page);

    fn load_video_by_id(&mut self, page: &mut Page, video_id: &str, start_seconds: f64, quality: &str);

    /// Release the player; it is not used again.
    fn destroy(&mut self, page: &mut Page);
}

/// Player constructor (e.g. the iframe API's `Player`).
pub trait PlayerFactory {
    fn create(
        &self,
        page: &mut Page,
        target: NodeId,
        video_id: &str,
        start_seconds: f64,
        vars: &Map<String, Value>,
    ) -> Result<Box<dyn VideoPlayer>, DomError>;
}

/// Where the player currently is.
enum PlayerSlot {
    Empty,
    Ready(Box<dyn VideoPlayer>),
    /// Out of the host while player or factory code runs.
    Lent,
}

/// Player slot owned by the video overlay.
///
/// Player and factory calls receive `&mut Page` and may dispatch events that
/// reach the overlay again, so the player is lent out of the host and the
/// overlay borrow released for the duration of every call.
pub(crate) struct PlayerHost {
    target: NodeId,
    factory: Rc<dyn PlayerFactory>,
    slot: PlayerSlot,
    loaded: Option<String>,
    /// Video requested while the player was lent.
    queued: Option<String>,
    vars: Map<String, Value>,
    control_delay: Duration,
    use_handler_on_mobile: bool,
    mobile_handler_url: String,
}

/// What a load needs once the overlay borrow is released.
enum LoadStep {
    Nothing,
    Switch(Box<dyn VideoPlayer>),
    Create(Rc<dyn PlayerFactory>, NodeId, Map<String, Value>),
}

impl PlayerHost {
    fn new(target: NodeId, factory: Rc<dyn PlayerFactory>, config: &VideoModalConfig) -> Self {
        Self {
            target,
            factory,
            slot: PlayerSlot::Empty,
            loaded: None,
            queued: None,
            vars: config.player_vars.clone(),
            control_delay: config.player_control_delay,
            use_handler_on_mobile: config.use_handler_on_mobile,
            mobile_handler_url: config.mobile_handler_url.clone(),
        }
    }

    /// A player exists, possibly lent out.
    pub(crate) fn has_player(&self) -> bool {
        !matches!(self.slot, PlayerSlot::Empty)
    }

    pub(crate) fn control_delay(&self) -> Duration {
        self.control_delay
    }

    pub(crate) fn loaded(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    fn lend(&mut self) -> Option<Box<dyn VideoPlayer>> {
        match std::mem::replace(&mut self.slot, PlayerSlot::Lent) {
            PlayerSlot::Ready(player) => Some(player),
            other => {
                self.slot = other;
                None
            }
        }
    }

    fn plan_load(&mut self, video_id: &str) -> LoadStep {
        match &self.slot {
            PlayerSlot::Lent => {
                trace!(video_id, "player busy; load queued");
                self.queued = Some(video_id.to_owned());
                LoadStep::Nothing
            }
            PlayerSlot::Ready(_) if self.loaded.as_deref() == Some(video_id) => LoadStep::Nothing,
            PlayerSlot::Ready(_) => self.lend().map_or(LoadStep::Nothing, LoadStep::Switch),
            PlayerSlot::Empty => {
                self.slot = PlayerSlot::Lent;
                LoadStep::Create(Rc::clone(&self.factory), self.target, self.vars.clone())
            }
        }
    }

    /// Take the player for disposal; a lent player is destroyed on return.
    pub(crate) fn retire(&mut self) -> Option<Box<dyn VideoPlayer>> {
        self.loaded = None;
        self.queued = None;
        match std::mem::replace(&mut self.slot, PlayerSlot::Empty) {
            PlayerSlot::Ready(player) => Some(player),
            PlayerSlot::Empty | PlayerSlot::Lent => None,
        }
    }
}

/// Put a lent player back. When the host retired it in the meantime (the
/// instance was disposed during the call) the player is destroyed instead.
fn give_back(
    this: &SharedOverlay,
    page: &mut Page,
    mut player: Box<dyn VideoPlayer>,
    loaded: Option<&str>,
) {
    {
        let mut overlay = this.borrow_mut();
        if let Surface::Player(host) = overlay.surface_mut()
            && matches!(host.slot, PlayerSlot::Lent)
        {
            host.slot = PlayerSlot::Ready(player);
            if let Some(id) = loaded {
                host.loaded = Some(id.to_owned());
            }
            return;
        }
    }
    player.destroy(page);
    debug!("player returned after dispose; destroyed");
}

/// Load `video_id`, then anything queued while the player was busy.
fn load_shared(this: &SharedOverlay, page: &mut Page, video_id: &str) -> Result<(), DomError> {
    let mut next = Some(video_id.to_owned());
    while let Some(video_id) = next.take() {
        let step = match this.borrow_mut().surface_mut() {
            Surface::Player(host) => host.plan_load(&video_id),
            Surface::Content(_) => LoadStep::Nothing,
        };
        match step {
            LoadStep::Nothing => {}
            LoadStep::Switch(mut player) => {
                debug!(%video_id, "switching player video");
                player.load_video_by_id(page, &video_id, 0.0, SWITCH_QUALITY);
                give_back(this, page, player, Some(&video_id));
            }
            LoadStep::Create(factory, target, vars) => {
                debug!(%video_id, %target, "creating player");
                match factory.create(page, target, &video_id, 0.0, &vars) {
                    Ok(player) => give_back(this, page, player, Some(&video_id)),
                    Err(err) => {
                        if let Surface::Player(host) = this.borrow_mut().surface_mut()
                            && matches!(host.slot, PlayerSlot::Lent)
                        {
                            host.slot = PlayerSlot::Empty;
                        }
                        return Err(err);
                    }
                }
            }
        }
        next = match this.borrow_mut().surface_mut() {
            Surface::Player(host) => host
                .queued
                .take()
                .filter(|queued| host.loaded.as_deref() != Some(queued.as_str())),
            Surface::Content(_) => None,
        };
    }
    Ok(())
}

/// Play or pause the player after a transition; no-op without one.
pub(crate) fn control_shared(
    this: &SharedOverlay,
    page: &mut Page,
    playing: bool,
) -> Result<(), DomError> {
    let lent = match this.borrow_mut().surface_mut() {
        Surface::Player(host) => host.lend(),
        Surface::Content(_) => None,
    };
    let Some(mut player) = lent else {
        return Ok(());
    };
    if playing {
        player.play_video(page);
    } else {
        player.pause_video(page);
    }
    give_back(this, page, player, None);

    let queued = match this.borrow_mut().surface_mut() {
        Surface::Player(host) => host.queued.take(),
        Surface::Content(_) => None,
    };
    match queued {
        Some(video_id) => load_shared(this, page, &video_id),
        None => Ok(()),
    }
}

/// `play` on a shared overlay; also the click and `popstate` path.
pub(crate) fn play_shared(
    this: &SharedOverlay,
    page: &mut Page,
    video_id: &str,
    update_history: bool,
) -> Result<(), DomError> {
    let handoff = match this.borrow().surface() {
        Surface::Player(host) if host.use_handler_on_mobile && page.user_agent().is_mobile() => {
            Some(format!("{}{video_id}", host.mobile_handler_url))
        }
        _ => None,
    };
    if let Some(url) = handoff {
        debug!(%url, "mobile handoff");
        return page.assign(&url);
    }

    Overlay::set_active(this, page, true, Some(video_id), update_history)?;
    load_shared(this, page, video_id)
}

/// Handle to the page's video modal.
#[derive(Clone)]
pub struct VideoModal {
    inner: SharedOverlay,
}

struct VideoSlot(VideoModal);

impl fmt::Debug for VideoModal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overlay = self.inner.borrow();
        f.debug_struct("VideoModal")
            .field("root", &overlay.root())
            .field("active_id", &overlay.active_id())
            .field("phase", &overlay.phase())
            .field("disposed", &overlay.is_disposed())
            .finish()
    }
}

impl VideoModal {
    /// Create the page's video modal, or return the existing one.
    pub fn init(
        page: &mut Page,
        config: VideoModalConfig,
        factory: Rc<dyn PlayerFactory>,
    ) -> Result<Self, ModalError> {
        if let Some(existing) = Self::get(page) {
            debug!("video modal already initialized");
            return Ok(existing);
        }
        let naming = config.naming();
        let scaffold = overlay::build_scaffold(
            page.document_mut(),
            &naming,
            &["player", "mask"],
            config.modal.add_close_button_to_document,
            config.modal.parent,
        )?;
        let host = PlayerHost::new(scaffold.parts[0], factory, &config);
        let mut core = Overlay::new(OverlayKind::Video, &config.modal, &scaffold, Surface::Player(host));

        if config.modal.hide_containers {
            let selector = format!("[{}]", naming.data());
            let style = page
                .document_mut()
                .create_style(&[(selector.as_str(), "display: none !important")])?;
            core.own_node(style);
        }
        if let Some(src) = &config.api_script_src {
            let doc = page.document_mut();
            let script = doc.create_element("script");
            doc.set_attribute(script, "src", src)?;
            doc.append_child(doc.body(), script)?;
            core.own_node(script);
        }

        let inner = Rc::new(RefCell::new(core));
        let modal = Self { inner };
        if let Err(err) = Overlay::install(&modal.inner, page) {
            if let Err(cleanup) = Overlay::dispose(&modal.inner, page) {
                warn!(%cleanup, "cleanup after failed install");
            }
            return Err(err.into());
        }
        page.insert_extension(VideoSlot(modal.clone()));
        debug!(class_name = %naming.base(), "video modal initialized");
        Ok(modal)
    }

    /// The page's live video modal, if any.
    pub fn get(page: &Page) -> Option<Self> {
        page.extension::<VideoSlot>().map(|slot| slot.0.clone())
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), ModalError> {
        if self.inner.borrow().is_disposed() {
            return Err(ModalError::Disposed {
                kind: OverlayKind::Video,
                operation,
            });
        }
        Ok(())
    }

    /// Open the overlay on `video_id` and push a history entry (when
    /// enabled), or hand off to the mobile handler.
    pub fn play(&self, page: &mut Page, video_id: &str) -> Result<(), ModalError> {
        self.ensure_live("play")?;
        play_shared(&self.inner, page, video_id, true)?;
        Ok(())
    }

    pub fn close(&self, page: &mut Page) -> Result<(), ModalError> {
        self.ensure_live("close")?;
        Overlay::set_active(&self.inner, page, false, None, true)?;
        Ok(())
    }

    /// Destroy the player and undo everything `init` did.
    pub fn dispose(&self, page: &mut Page) -> Result<(), ModalError> {
        self.ensure_live("dispose")?;
        Overlay::dispose(&self.inner, page)?;
        if Self::get(page).is_some_and(|live| Rc::ptr_eq(&live.inner, &self.inner)) {
            page.remove_extension::<VideoSlot>();
        }
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.borrow().active_id().map(str::to_owned)
    }

    /// Video currently loaded in the player.
    pub fn loaded_video(&self) -> Option<String> {
        match self.inner.borrow().surface() {
            Surface::Player(host) => host.loaded().map(str::to_owned),
            Surface::Content(_) => None,
        }
    }

    pub fn has_player(&self) -> bool {
        matches!(self.inner.borrow().surface(), Surface::Player(host) if host.has_player())
    }

    pub fn phase(&self) -> TransitionPhase {
        self.inner.borrow().phase()
    }

    pub fn root(&self) -> NodeId {
        self.inner.borrow().root()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().is_disposed()
    }
}

/// [`VideoModal::init`].
pub fn init(
    page: &mut Page,
    config: VideoModalConfig,
    factory: Rc<dyn PlayerFactory>,
) -> Result<VideoModal, ModalError> {
    VideoModal::init(page, config, factory)
}

fn instance(page: &Page, operation: &'static str) -> Result<VideoModal, ModalError> {
    VideoModal::get(page).ok_or(ModalError::NotInitialized {
        kind: OverlayKind::Video,
        operation,
    })
}

/// Play `video_id` in the page's video modal.
pub fn play(page: &mut Page, video_id: &str) -> Result<(), ModalError> {
    instance(page, "play")?.play(page, video_id)
}

pub fn close(page: &mut Page) -> Result<(), ModalError> {
    instance(page, "close")?.close(page)
}

pub fn dispose(page: &mut Page) -> Result<(), ModalError> {
    instance(page, "dispose")?.dispose(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use akui_dom::{Key, UserAgent};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Log(RefCell<Vec<String>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.borrow_mut().push(entry);
        }

        fn take(&self) -> Vec<String> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    struct FakePlayer(Rc<Log>);

    impl VideoPlayer for FakePlayer {
        fn play_video(&mut self, _: &mut Page) {
            self.0.push("play".into());
        }

        fn pause_video(&mut self, _: &mut Page) {
            self.0.push("pause".into());
        }

        fn load_video_by_id(&mut self, _: &mut Page, id: &str, start: f64, quality: &str) {
            self.0.push(format!("load {id} {start} {quality}"));
        }

        fn destroy(&mut self, _: &mut Page) {
            self.0.push("destroy".into());
        }
    }

    struct FakeFactory(Rc<Log>);

    impl PlayerFactory for FakeFactory {
        fn create(
            &self,
            _: &mut Page,
            _: NodeId,
            video_id: &str,
            start_seconds: f64,
            vars: &Map<String, Value>,
        ) -> Result<Box<dyn VideoPlayer>, DomError> {
            self.0.push(format!(
                "create {video_id} {start_seconds} autoplay={}",
                vars["autoplay"]
            ));
            Ok(Box::new(FakePlayer(Rc::clone(&self.0))))
        }
    }

    /// Runs `hook` from inside `play_video` and `create`, the way an embedded
    /// player forwarding input back into the page would.
    struct Reentrant {
        log: Rc<Log>,
        on_play: fn(&mut Page),
        on_create: fn(&mut Page),
    }

    struct ReentrantPlayer(Rc<Log>, fn(&mut Page));

    impl VideoPlayer for ReentrantPlayer {
        fn play_video(&mut self, page: &mut Page) {
            self.0.push("play".into());
            (self.1)(page);
        }

        fn pause_video(&mut self, _: &mut Page) {
            self.0.push("pause".into());
        }

        fn load_video_by_id(&mut self, _: &mut Page, id: &str, _: f64, _: &str) {
            self.0.push(format!("load {id}"));
        }

        fn destroy(&mut self, _: &mut Page) {
            self.0.push("destroy".into());
        }
    }

    impl PlayerFactory for Reentrant {
        fn create(
            &self,
            page: &mut Page,
            _: NodeId,
            video_id: &str,
            _: f64,
            _: &Map<String, Value>,
        ) -> Result<Box<dyn VideoPlayer>, DomError> {
            self.log.push(format!("create {video_id}"));
            (self.on_create)(page);
            Ok(Box::new(ReentrantPlayer(Rc::clone(&self.log), self.on_play)))
        }
    }

    fn setup_reentrant(
        page: &mut Page,
        on_play: fn(&mut Page),
        on_create: fn(&mut Page),
    ) -> (VideoModal, Rc<Log>) {
        let log = Rc::new(Log::default());
        let factory = Reentrant {
            log: Rc::clone(&log),
            on_play,
            on_create,
        };
        let modal = VideoModal::init(page, VideoModalConfig::default(), Rc::new(factory)).unwrap();
        (modal, log)
    }

    fn press_escape(page: &mut Page) {
        page.key_down(Key::Escape).unwrap();
    }

    fn nothing(_: &mut Page) {}

    fn setup(page: &mut Page, config: VideoModalConfig) -> (VideoModal, Rc<Log>) {
        let log = Rc::new(Log::default());
        let modal = VideoModal::init(page, config, Rc::new(FakeFactory(Rc::clone(&log)))).unwrap();
        (modal, log)
    }

    #[test]
    fn first_play_creates_player_then_reuses() {
        let mut page = Page::default();
        let (modal, log) = setup(&mut page, VideoModalConfig::default());

        modal.play(&mut page, "abc").unwrap();
        assert_eq!(log.take(), vec!["create abc 0 autoplay=1"]);
        assert_eq!(modal.active_id().as_deref(), Some("abc"));

        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();
        assert_eq!(log.take(), vec!["play"]);

        modal.play(&mut page, "xyz").unwrap();
        assert_eq!(log.take(), vec!["load xyz 0 large"]);
        assert_eq!(modal.loaded_video().as_deref(), Some("xyz"));
    }

    #[test]
    fn close_pauses_after_control_delay() {
        let mut page = Page::default();
        let (modal, log) = setup(&mut page, VideoModalConfig::default());
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();
        log.take();

        modal.close(&mut page).unwrap();
        page.advance(Duration::from_millis(99)).unwrap();
        assert!(log.take().is_empty());
        page.advance(Duration::from_millis(1)).unwrap();
        assert_eq!(log.take(), vec!["pause"]);
    }

    #[test]
    fn reopen_cancels_pending_pause() {
        let mut page = Page::default();
        let (modal, log) = setup(&mut page, VideoModalConfig::default());
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();
        log.take();

        modal.close(&mut page).unwrap();
        page.advance(Duration::from_millis(50)).unwrap();
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();
        assert_eq!(log.take(), vec!["play"]);
    }

    #[test]
    fn mobile_user_agent_hands_off() {
        let ua = UserAgent::new("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36");
        let mut page = Page::default().with_user_agent(ua);
        let (modal, log) = setup(&mut page, VideoModalConfig::default());

        modal.play(&mut page, "abc").unwrap();
        assert_eq!(
            page.navigations()[0].as_str(),
            "https://m.youtube.com/watch?v=abc"
        );
        assert!(log.take().is_empty());
        assert_eq!(modal.phase(), TransitionPhase::Hidden);
    }

    #[test]
    fn mobile_handoff_can_be_disabled() {
        let ua = UserAgent::new("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)");
        let mut page = Page::default().with_user_agent(ua);
        let (modal, _) = setup(
            &mut page,
            VideoModalConfig::default().with_handler_on_mobile(false),
        );
        modal.play(&mut page, "abc").unwrap();
        assert!(page.navigations().is_empty());
        assert!(modal.has_player());
    }

    #[test]
    fn api_script_added_and_removed() {
        let mut page = Page::default();
        let (modal, log) = setup(&mut page, VideoModalConfig::default());
        let script = page
            .document()
            .query_attr("src", Some("https://www.youtube.com/iframe_api"))
            .unwrap();
        assert_eq!(page.document().tag_name(script), Some("script"));

        modal.play(&mut page, "abc").unwrap();
        log.take();
        modal.dispose(&mut page).unwrap();
        assert_eq!(log.take(), vec!["destroy"]);
        assert!(!page.document().is_connected(script));
        assert!(VideoModal::get(&page).is_none());
    }

    #[test]
    fn escape_from_inside_play_video_closes() {
        let mut page = Page::default();
        let (modal, log) = setup_reentrant(&mut page, press_escape, nothing);
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();

        assert_eq!(log.take(), vec!["create abc", "play", "pause"]);
        assert_eq!(modal.active_id(), None);
        assert_eq!(modal.phase(), TransitionPhase::Hidden);
        assert!(modal.has_player());
    }

    #[test]
    fn escape_during_create_keeps_player() {
        let mut page = Page::default();
        let (modal, log) = setup_reentrant(&mut page, nothing, press_escape);
        modal.play(&mut page, "abc").unwrap();
        page.run_until_idle().unwrap();

        assert_eq!(log.take(), vec!["create abc", "pause"]);
        assert_eq!(modal.active_id(), None);
        assert_eq!(modal.loaded_video().as_deref(), Some("abc"));
    }

    #[test]
    fn dispose_during_create_destroys_new_player() {
        let mut page = Page::default();
        let baseline = page.total_listeners();
        let (modal, log) = setup_reentrant(&mut page, nothing, |page| dispose(page).unwrap());
        modal.play(&mut page, "abc").unwrap();

        assert_eq!(log.take(), vec!["create abc", "destroy"]);
        assert!(modal.is_disposed());
        assert!(!modal.has_player());
        assert_eq!(page.total_listeners(), baseline);
    }

    #[test]
    fn play_during_create_loads_after() {
        let mut page = Page::default();
        let (modal, log) = setup_reentrant(&mut page, nothing, |page| play(page, "xyz").unwrap());
        modal.play(&mut page, "abc").unwrap();

        assert_eq!(log.take(), vec!["create abc", "load xyz"]);
        assert_eq!(modal.active_id().as_deref(), Some("xyz"));
        assert_eq!(modal.loaded_video().as_deref(), Some("xyz"));
    }

    #[test]
    fn free_functions_require_init() {
        let mut page = Page::default();
        let err = play(&mut page, "abc").unwrap_err();
        assert!(matches!(
            err,
            ModalError::NotInitialized {
                kind: OverlayKind::Video,
                operation: "play"
            }
        ));
    }
}
