#![forbid(unsafe_code)]

//! Controller errors.

use std::fmt;

use akui_dom::DomError;
use thiserror::Error;

/// Which overlay singleton an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Modal,
    Video,
}

impl OverlayKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modal => "modal",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModalError {
    /// An imperative entry point ran before `init`.
    #[error("{kind}::{operation} called before {kind}::init")]
    NotInitialized {
        kind: OverlayKind,
        operation: &'static str,
    },
    /// A handle was used after `dispose` tore its instance down.
    #[error("{kind}::{operation} called on a disposed instance")]
    Disposed {
        kind: OverlayKind,
        operation: &'static str,
    },
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}
