//! Behaviors: cross-cutting modifiers attached to a component.

use crate::component::Component;
use crate::error::EngineError;

/// A rendering hook attached to a component. All methods default to
/// no-ops so implementations override only what they need.
pub trait Behavior {
    /// Called once when the behavior is attached.
    fn bind(&mut self, _component: &mut Component) {}

    fn before_render(&mut self, _component: &mut Component) -> Result<(), EngineError> {
        Ok(())
    }

    fn after_render(&mut self, _component: &mut Component) -> Result<(), EngineError> {
        Ok(())
    }

    /// Called after the component rendered successfully.
    fn rendered(&mut self, _component: &mut Component) {}

    /// Called when the component's render body failed. Faults raised
    /// here are logged and swallowed; the original render fault is the
    /// one that propagates.
    fn on_exception(
        &mut self,
        _component: &mut Component,
        _error: &EngineError,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn detach(&mut self, _component: &mut Component) {}

    /// Temporary behaviors are removed at detach time.
    fn is_temporary(&self) -> bool {
        false
    }
}
