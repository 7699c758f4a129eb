use std::fmt;

use async_trait::async_trait;

/// Whether a unit currently admits new work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Availability {
    Available,
    TemporarilyUnavailable,
    /// Both the pre-start and the post-quit state.
    #[default]
    Unavailable,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::TemporarilyUnavailable => "temporarily unavailable",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Outcome of a lifecycle transition, as reported to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitOperationResult {
    pub ok: bool,
    pub error: Option<String>,
}

impl UnitOperationResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Port implemented by units driven by an external lifecycle orchestrator.
///
/// The orchestrator invokes at most one of `start`, `pause` and `quit` at a time
/// per unit.
#[async_trait]
pub trait Unit: Send + Sync {
    fn name(&self) -> &str;

    fn availability(&self) -> Availability;

    async fn start(&self) -> UnitOperationResult;
    async fn pause(&self) -> UnitOperationResult;
    async fn quit(&self) -> UnitOperationResult;
}
