#![forbid(unsafe_code)]

//! Errors raised by the page model.

use thiserror::Error;

use crate::document::NodeId;

/// Errors from document, history and timer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The id does not belong to this document.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// An element-only operation was applied to a text or document node.
    #[error("{0} is not an element")]
    NotAnElement(NodeId),
    /// The insertion would make a node its own ancestor, or insert the
    /// document node somewhere.
    #[error("cannot insert {child} into {parent}: hierarchy request")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    /// The reference node passed to `insert_before` is not a child of the parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
    /// A URL could not be parsed or resolved against the current location.
    #[error("invalid url '{input}': {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
    /// `push_state` was given a URL with a different origin.
    #[error("cannot push state for cross-origin url '{0}'")]
    CrossOrigin(String),
    /// Timers kept rescheduling themselves past the configured step limit.
    #[error("timer step limit of {limit} exceeded at {now_ms}ms")]
    TimerStepLimit { limit: usize, now_ms: u64 },
}
