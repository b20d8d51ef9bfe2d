//! The request processor: resolves an inbound request to a target,
//! dispatches component events and drives the response.

use crate::cycle::{CycleControl, RequestCycle, StepResult};
use crate::error::EngineError;
use crate::markup::escape_html;
use crate::target::{BookmarkablePageTarget, PageTarget, RequestTarget};

/// Outcome of resolving a request.
pub enum Resolution {
    /// Respond with this target.
    Target(Box<dyn RequestTarget>),
    /// Nothing in this application answers the request.
    Unhandled,
    /// Skip straight to responding with whatever targets the resolver
    /// already scheduled on the cycle.
    Restart,
}

/// Collaborator the cycle delegates the three big phases to. The
/// default implementation covers the built-in URL scheme; applications
/// swap in their own to mount custom strategies.
pub trait RequestProcessor {
    /// Maps the request to a response target. Targets scheduled on the
    /// cycle during resolution take precedence over the returned one.
    fn resolve(&self, cycle: &mut RequestCycle<'_>) -> Result<Resolution, EngineError>;

    /// Dispatches component-level events (listener callbacks).
    fn process_events(&self, cycle: &mut RequestCycle<'_>) -> StepResult;

    /// Produces the response for the cycle's current target.
    fn respond(&self, cycle: &mut RequestCycle<'_>) -> StepResult;

    /// Produces an error response after a fault escaped the steps.
    fn respond_with_exception(
        &self,
        cycle: &mut RequestCycle<'_>,
        error: &EngineError,
    ) -> Result<(), EngineError>;
}

/// Built-in URL scheme:
///
/// - `/` renders the application's home page
/// - `/page/<name>` constructs and renders a bookmarkable page
/// - `/render/<map>/<id>` re-renders a stored page
///
/// Event dispatch reads the `event` parameter as a component path on
/// the page named by the `render` segments.
#[derive(Default)]
pub struct DefaultProcessor;

impl RequestProcessor for DefaultProcessor {
    fn resolve(&self, cycle: &mut RequestCycle<'_>) -> Result<Resolution, EngineError> {
        let segments: Vec<String> = cycle
            .request()
            .path_segments()
            .map(str::to_string)
            .collect();
        let parameters = cycle.request().parameters().clone();
        match segments.as_slice() {
            [] => match cycle.application().home_page() {
                Some(home) => Ok(Resolution::Target(Box::new(BookmarkablePageTarget::new(
                    home, parameters,
                )))),
                None => Ok(Resolution::Unhandled),
            },
            [page, name] if page == "page" => Ok(Resolution::Target(Box::new(
                BookmarkablePageTarget::new(name, parameters),
            ))),
            [render, map, id] if render == "render" => match id.parse::<u16>() {
                Ok(page_id) => Ok(Resolution::Target(Box::new(PageTarget::new(map, page_id)))),
                Err(_) => Ok(Resolution::Unhandled),
            },
            _ => Ok(Resolution::Unhandled),
        }
    }

    fn process_events(&self, cycle: &mut RequestCycle<'_>) -> StepResult {
        let event = match cycle.request().parameter("event") {
            Some(path) => path.to_string(),
            None => return Ok(CycleControl::Continue),
        };
        let segments: Vec<String> = cycle
            .request()
            .path_segments()
            .map(str::to_string)
            .collect();
        match segments.as_slice() {
            [render, map, id] if render == "render" => {
                let page_id = id
                    .parse::<u16>()
                    .map_err(|_| EngineError::custom(format!("malformed page id: {id}")))?;
                let map = map.clone();
                cycle.fire_event(&map, page_id, &event)
            }
            _ => Ok(CycleControl::Continue),
        }
    }

    fn respond(&self, cycle: &mut RequestCycle<'_>) -> StepResult {
        cycle.respond_current_target()
    }

    fn respond_with_exception(
        &self,
        cycle: &mut RequestCycle<'_>,
        error: &EngineError,
    ) -> Result<(), EngineError> {
        let response = cycle.response_mut();
        response.reset_buffer();
        response.clear_redirect();
        response.set_content_type("text/html");
        response.write(&format!(
            "<html><body><h1>Internal error</h1><p>{}</p></body></html>",
            escape_html(&error.to_string())
        ));
        Ok(())
    }
}
