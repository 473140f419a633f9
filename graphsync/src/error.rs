//! Error taxonomy shared by the lock, the graph and the consumer side.
//!
//! Three kinds of failure cross the lock/store boundary:
//!
//! - [`GraphError::Busy`]: a short write collided with a running long task,
//!   or a long task could not start. Always recoverable, retry later.
//! - [`GraphError::Cancelled`]: a long task observed a cancellation request at
//!   a yield point. The task should unwind its partial work and end.
//! - [`GraphError::Other`]: anything else, carried as a diagnostic message.
//!
//! Module-local errors ([`EmitterError`](crate::emitter::EmitterError),
//! [`AttributeError`](crate::attributes::AttributeError), ...) convert into
//! `Other` so that callers can use `?` across layers.

/// Coarse classification of a [`GraphError`], suitable for reporting
/// across a process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Busy,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Fixed human readable text for the kind
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::Busy => "The graph is currently locked.",
            ErrorKind::Cancelled => "The task was cancelled.",
            ErrorKind::Other => "An unknown error occurred",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{resource} {}", busy_reason(.task))]
    Busy {
        /// Name of the locked resource
        resource: String,
        /// Name of the long task holding the resource, if any
        task: Option<String>,
    },

    #[error("{task} was cancelled")]
    Cancelled { task: String },

    #[error("{0}")]
    Other(String),
}

fn busy_reason(task: &Option<String>) -> String {
    match task {
        Some(task) => format!("cannot be modified since {task} is running"),
        None => "is locked by another operation".to_string(),
    }
}

impl GraphError {
    /// Shorthand for [`GraphError::Other`]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Busy { .. } => ErrorKind::Busy,
            GraphError::Cancelled { .. } => ErrorKind::Cancelled,
            GraphError::Other(_) => ErrorKind::Other,
        }
    }

    /// Name of the task that made the operation fail, for `Busy` and
    /// `Cancelled` errors
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        match self {
            GraphError::Busy { task, .. } => task.as_deref(),
            GraphError::Cancelled { task } => Some(task),
            GraphError::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message_names_task() {
        let err = GraphError::Busy {
            resource: "State".to_string(),
            task: Some("layout".to_string()),
        };
        assert_eq!(err.to_string(), "State cannot be modified since layout is running");
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.task_name(), Some("layout"));
    }

    #[test]
    fn test_busy_without_task() {
        let err = GraphError::Busy {
            resource: "State".to_string(),
            task: None,
        };
        assert_eq!(err.to_string(), "State is locked by another operation");
        assert_eq!(err.task_name(), None);
    }

    #[test]
    fn test_other_and_cancelled() {
        assert_eq!(GraphError::other("boom").to_string(), "boom");
        let err = GraphError::Cancelled {
            task: "layout".to_string(),
        };
        assert_eq!(err.to_string(), "layout was cancelled");
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
