//! Authorization collaborator consulted per component per request.

use std::fmt;

use crate::component::Component;

/// The two actions the engine asks about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Render,
    Enable,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Render => write!(f, "RENDER"),
            Action::Enable => write!(f, "ENABLE"),
        }
    }
}

/// Per-component authorization. Answers are cached as component flags
/// for the duration of a render pass, so a strategy is queried at most
/// once per component per pass.
pub trait AuthorizationStrategy {
    fn is_action_authorized(&self, component: &Component, action: Action) -> bool;
}

/// Default strategy: everything is allowed.
pub struct AllowAll;

impl AuthorizationStrategy for AllowAll {
    fn is_action_authorized(&self, _component: &Component, _action: Action) -> bool {
        true
    }
}
