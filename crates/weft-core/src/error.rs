//! Error taxonomy for the engine.

use std::fmt;

use crate::auth::Action;

/// Faults raised by the engine. Contract violations (reused cycles,
/// locked trees, cyclic model chains, the step ceiling) are fatal and
/// never retried; `PageExpired` and `Unauthorized` are expected
/// conditions surfaced through dedicated response paths.
#[derive(Debug)]
pub enum EngineError {
    EmptyComponentName,
    DuplicateChildName { parent: String, name: String },
    TreeLockedDuringRender { path: String },
    MissingComponent { path: String },
    MissingModel { path: String },
    ModelCycle,
    CycleReused,
    StepCeilingExceeded { steps: usize },
    UnrenderedComponents { report: String },
    Unauthorized { path: String, action: Action },
    PageExpired { page_map: String, page_id: u16 },
    NoVersion { requested: usize, current: usize },
    NoPageFactory { name: String },
    Custom { message: String },
}

impl EngineError {
    pub fn custom(message: impl Into<String>) -> Self {
        EngineError::Custom {
            message: message.into(),
        }
    }

    /// Expected conditions are not logged at error level by the step
    /// loop; everything else is.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            EngineError::PageExpired { .. } | EngineError::Unauthorized { .. }
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EmptyComponentName => write!(f, "component name must not be empty"),
            EngineError::DuplicateChildName { parent, name } => {
                write!(f, "container {parent} already has a child named {name}")
            }
            EngineError::TreeLockedDuringRender { path } => write!(
                f,
                "cannot modify component hierarchy at {path} while the page is rendering"
            ),
            EngineError::MissingComponent { path } => write!(f, "no component at {path}"),
            EngineError::MissingModel { path } => {
                write!(f, "component {path} has no model to set an object on")
            }
            EngineError::ModelCycle => {
                write!(f, "model wrapper chain is self-referential")
            }
            EngineError::CycleReused => write!(
                f,
                "request cycles are non-reusable; this instance already executed"
            ),
            EngineError::StepCeilingExceeded { steps } => write!(
                f,
                "request processing executed {steps} steps, which means it is probably in an infinite loop"
            ),
            EngineError::UnrenderedComponents { report } => write!(
                f,
                "the component(s) below failed to render; a common problem is that you have added a component in code but forgot to reference it in the markup:\n{report}"
            ),
            EngineError::Unauthorized { path, action } => {
                write!(f, "component {path} not authorized for action {action}")
            }
            EngineError::PageExpired { page_map, page_id } => {
                write!(f, "page {page_id} in page map {page_map} has expired")
            }
            EngineError::NoVersion { requested, current } => write!(
                f,
                "version {requested} not available; current version is {current}"
            ),
            EngineError::NoPageFactory { name } => {
                write!(f, "no bookmarkable page registered under {name}")
            }
            EngineError::Custom { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for EngineError {}
