#![forbid(unsafe_code)]

//! User-agent capability probe.
//!
//! Pattern-based, like every UA sniffer: good enough to pick a mobile
//! handoff, not a security boundary.

use std::sync::LazyLock;

use regex::Regex;

static IOS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)iPhone|iPad|iPod").expect("static pattern"));
static ANDROID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Android").expect("static pattern"));
static IE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"MSIE/\d+").expect("static pattern"));
static IE_OR_EDGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Edge/\d+|MSIE/\d+|Trident/\d+").expect("static pattern"));

/// Desktop user agent used when the host does not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// `navigator.userAgent` plus `navigator.maxTouchPoints`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    ua: String,
    max_touch_points: u32,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl UserAgent {
    pub fn new(ua: impl Into<String>) -> Self {
        Self {
            ua: ua.into(),
            max_touch_points: 0,
        }
    }

    #[must_use]
    pub fn with_max_touch_points(mut self, points: u32) -> Self {
        self.max_touch_points = points;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.ua
    }

    pub fn max_touch_points(&self) -> u32 {
        self.max_touch_points
    }

    pub fn is_mobile(&self) -> bool {
        self.is_ios() || self.is_android()
    }

    pub fn is_ios(&self) -> bool {
        IOS.is_match(&self.ua) || self.is_ipad()
    }

    /// iPadOS reports a Macintosh UA; touch points give it away.
    pub fn is_ipad(&self) -> bool {
        self.ua.to_lowercase().contains("macintosh") && self.max_touch_points > 2
    }

    pub fn is_android(&self) -> bool {
        ANDROID.is_match(&self.ua)
    }

    pub fn is_chrome(&self) -> bool {
        self.ua.contains("Chrome")
    }

    pub fn is_safari(&self) -> bool {
        !self.is_chrome() && self.ua.contains("Safari")
    }

    pub fn is_firefox(&self) -> bool {
        self.ua.contains("Firefox")
    }

    pub fn is_ie(&self) -> bool {
        IE.is_match(&self.ua)
    }

    pub fn is_ie_or_edge(&self) -> bool {
        IE_OR_EDGE.is_match(&self.ua)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const PIXEL: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";
    const MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.5 Safari/605.1.15";

    #[test]
    fn default_is_desktop_chrome() {
        let ua = UserAgent::default();
        assert!(!ua.is_mobile());
        assert!(ua.is_chrome());
        assert!(!ua.is_safari());
    }

    #[test]
    fn detects_iphone_and_android() {
        assert!(UserAgent::new(IPHONE).is_ios());
        assert!(UserAgent::new(IPHONE).is_mobile());
        assert!(UserAgent::new(PIXEL).is_android());
        assert!(UserAgent::new(PIXEL).is_mobile());
    }

    #[test]
    fn desktop_class_ipad_needs_touch_points() {
        assert!(!UserAgent::new(MAC).is_ios());
        assert!(UserAgent::new(MAC).with_max_touch_points(5).is_ios());
        assert!(UserAgent::new(MAC).is_safari());
    }

    #[test]
    fn legacy_browsers() {
        assert!(UserAgent::new("Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0)").is_ie_or_edge());
        assert!(!UserAgent::new("Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0)").is_ie());
        assert!(UserAgent::new("Mozilla/5.0 (X11; rv:127.0) Gecko/20100101 Firefox/127.0").is_firefox());
    }
}
