//! The request cycle: a single-use state machine driving one request
//! through its processing steps.
//!
//! Steps only ever move forward, except through two sanctioned rewinds:
//! a step returning [`CycleControl::RestartAtRespond`] replans the
//! response around a newly scheduled target, and scheduling a target
//! while already responding rewinds so the new target gets its own
//! respond step. Events are dispatched at most once per request no
//! matter how often the plan rewinds. A step budget turns runaway
//! replanning into a hard fault instead of a hang.

use std::time::Instant;

use ahash::AHashMap;

use crate::application::Application;
use crate::error::EngineError;
use crate::page::{Page, PageRenderContext};
use crate::processor::Resolution;
use crate::request::{Request, Response};
use crate::session::{Session, DEFAULT_PAGE_MAP};
use crate::target::RequestTarget;

/// Processing steps, in execution order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Step {
    NotStarted,
    PrepareRequest,
    ResolveTarget,
    ProcessEvents,
    Respond,
    HandleException,
    DetachRequest,
    Done,
}

impl Step {
    fn next(self) -> Step {
        match self {
            Step::NotStarted => Step::PrepareRequest,
            Step::PrepareRequest => Step::ResolveTarget,
            Step::ResolveTarget => Step::ProcessEvents,
            Step::ProcessEvents => Step::Respond,
            Step::Respond | Step::HandleException => Step::DetachRequest,
            Step::DetachRequest | Step::Done => Step::Done,
        }
    }
}

/// How the cycle proceeds after a successful step.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleControl {
    Continue,
    /// Skip straight back to the respond step, so the most recently
    /// scheduled target produces the response.
    RestartAtRespond,
}

pub type StepResult = Result<CycleControl, EngineError>;

/// Runaway-replan ceiling on executed steps per request.
const MAX_STEPS: usize = i16::MAX as usize;

pub struct RequestCycle<'a> {
    app: &'a Application,
    session: &'a mut Session,
    request: Request,
    response: Response,
    step: Step,
    targets: Vec<Box<dyn RequestTarget>>,
    current_page_map: Option<String>,
    current_page_id: Option<u16>,
    handled: bool,
    executed: bool,
    events_processed: bool,
    handling_exception: bool,
    fault: Option<EngineError>,
    merge_version: bool,
    start: Instant,
}

impl<'a> RequestCycle<'a> {
    pub fn new(app: &'a Application, session: &'a mut Session, request: Request) -> Self {
        RequestCycle {
            app,
            session,
            request,
            response: Response::new(),
            step: Step::NotStarted,
            targets: Vec::new(),
            current_page_map: None,
            current_page_id: None,
            handled: false,
            executed: false,
            events_processed: false,
            handling_exception: false,
            fault: None,
            merge_version: false,
            start: Instant::now(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn application(&self) -> &'a Application {
        self.app
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        self.session
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Whether anything in the application claimed this request.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// The fault the exception response answered, when there was one.
    /// `None` means the request produced its planned response.
    pub fn fault(&self) -> Option<&EngineError> {
        self.fault.as_ref()
    }

    pub fn take_fault(&mut self) -> Option<EngineError> {
        self.fault.take()
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    // ---------------------------------------------------------------
    // entry points
    // ---------------------------------------------------------------

    /// Processes the request from the beginning. Single-use: a second
    /// call on the same instance is a contract violation.
    pub fn process(&mut self) -> Result<(), EngineError> {
        if self.executed {
            return Err(EngineError::CycleReused);
        }
        self.executed = true;
        let outcome = self.steps(Step::PrepareRequest);
        self.detach();
        outcome
    }

    /// Processes the request with a pre-resolved target, skipping the
    /// resolution step.
    pub fn process_with_target(
        &mut self,
        target: Box<dyn RequestTarget>,
    ) -> Result<(), EngineError> {
        if self.executed {
            return Err(EngineError::CycleReused);
        }
        self.executed = true;
        self.targets.push(target);
        self.handled = true;
        let outcome = self.steps(Step::ProcessEvents);
        self.detach();
        outcome
    }

    // ---------------------------------------------------------------
    // target stack
    // ---------------------------------------------------------------

    /// Schedules a target. The newest target is the one that responds;
    /// older ones remain on the stack for detach. Scheduling while the
    /// cycle is already responding rewinds the plan so the new target
    /// gets its own respond step; events are not dispatched again.
    pub fn set_request_target(&mut self, target: Box<dyn RequestTarget>) {
        log::debug!("scheduling target {}", target.describe());
        self.targets.push(target);
        self.handled = true;
        if self.step >= Step::Respond {
            self.step = Step::ProcessEvents;
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Schedules rendering a stored page as the response.
    pub fn set_response_page(&mut self, page_map: &str, page_id: u16) {
        self.set_request_target(Box::new(crate::target::PageTarget::new(page_map, page_id)));
    }

    /// Responds with the newest target. The target leaves the stack
    /// while it runs, then returns to its old position, so targets it
    /// schedules stay above it.
    pub fn respond_current_target(&mut self) -> StepResult {
        if self.targets.is_empty() {
            log::debug!("nothing to respond with for {}", self.request.path());
            return Ok(CycleControl::Continue);
        }
        let index = self.targets.len() - 1;
        let mut target = self.targets.remove(index);
        let result = target.respond(self);
        self.targets.insert(index, target);
        result
    }

    // ---------------------------------------------------------------
    // page plumbing used by targets and event hooks
    // ---------------------------------------------------------------

    /// Reserves an id in the default page map and constructs the named
    /// bookmarkable page. Stateless pages burn the id too.
    pub fn create_page(
        &mut self,
        name: &str,
        parameters: &AHashMap<String, String>,
    ) -> Result<Page, EngineError> {
        let id = self.session.page_map(DEFAULT_PAGE_MAP).reserve_id();
        self.app.create_page(name, id, parameters)
    }

    /// Renders a stored page out of the session.
    pub fn render_session_page(
        &mut self,
        page_map: &str,
        page_id: u16,
    ) -> Result<(), EngineError> {
        self.current_page_map = Some(page_map.to_string());
        self.current_page_id = Some(page_id);
        let app = self.app;
        let merge = self.merge_version;
        let RequestCycle {
            session, response, ..
        } = self;
        let page = session.page(page_map, page_id)?;
        page.set_merge_version(merge);
        let mut ctx = PageRenderContext {
            auth: app.auth_strategy(),
            markup: app.markup_source(),
            persister: app.value_persister(),
            response,
            component_use_check: app.settings().component_use_check,
        };
        page.render_page(&mut ctx)
    }

    /// Renders a page the caller owns, outside the session store.
    pub fn render_detached_page(&mut self, page: &mut Page) -> Result<(), EngineError> {
        page.set_merge_version(self.merge_version);
        let app = self.app;
        let mut ctx = PageRenderContext {
            auth: app.auth_strategy(),
            markup: app.markup_source(),
            persister: app.value_persister(),
            response: &mut self.response,
            component_use_check: app.settings().component_use_check,
        };
        page.render_page(&mut ctx)
    }

    /// Renders a freshly constructed page, then stores it into the
    /// session only if it turned out stateful. Returns the stored id.
    pub fn render_new_page(
        &mut self,
        page_map: &str,
        mut page: Page,
    ) -> Result<Option<u16>, EngineError> {
        self.render_detached_page(&mut page)?;
        page.end_request()?;
        if page.is_page_stateless() {
            log::debug!("page {} is stateless, not stored", page.numeric_id());
            Ok(None)
        } else {
            let id = page.numeric_id();
            self.session.store_page(page_map, page);
            Ok(Some(id))
        }
    }

    /// Closes out a stored page at the end of the request. A page
    /// evicted mid-request is not an error here.
    pub(crate) fn end_session_page(
        &mut self,
        page_map: &str,
        page_id: u16,
    ) -> Result<(), EngineError> {
        match self.session.page(page_map, page_id) {
            Ok(page) => page.end_request(),
            Err(_) => Ok(()),
        }
    }

    /// The page the cycle is currently working on.
    pub fn current_page(&mut self) -> Result<&mut Page, EngineError> {
        let map = self
            .current_page_map
            .clone()
            .unwrap_or_else(|| DEFAULT_PAGE_MAP.to_string());
        let id = self
            .current_page_id
            .ok_or_else(|| EngineError::custom("no page is active on this cycle"))?;
        self.session.page(&map, id)
    }

    /// Dispatches an event to the component at `path` on a stored page.
    /// Disabled or hidden components reject the event.
    pub fn fire_event(
        &mut self,
        page_map: &str,
        page_id: u16,
        path: &str,
    ) -> StepResult {
        self.current_page_map = Some(page_map.to_string());
        self.current_page_id = Some(page_id);
        let merge = self.merge_version;
        let (id, hook) = {
            let page = self.session.page(page_map, page_id)?;
            page.set_merge_version(merge);
            let id = page
                .tree()
                .find(path)
                .ok_or_else(|| EngineError::MissingComponent {
                    path: path.to_string(),
                })?;
            let component = page.tree().get(id)?;
            if !component.is_enabled() || !page.tree().is_visible_in_hierarchy(id) {
                return Err(EngineError::Unauthorized {
                    path: path.to_string(),
                    action: crate::auth::Action::Enable,
                });
            }
            (id, page.tree_mut().get_mut(id)?.hooks_mut().on_event.take())
        };
        let Some(mut hook) = hook else {
            return Ok(CycleControl::Continue);
        };
        let result = hook(self, id);
        match self.session.page(page_map, page_id) {
            Ok(page) => match page.tree_mut().get_mut(id) {
                Ok(component) => component.hooks_mut().on_event = Some(hook),
                Err(_) => log::debug!("event source at {path} vanished during dispatch"),
            },
            Err(_) => log::debug!("page {page_map}/{page_id} vanished during event dispatch"),
        }
        result
    }

    pub fn feedback(&mut self, message: crate::session::FeedbackMessage) {
        self.session.feedback(message);
    }

    // ---------------------------------------------------------------
    // the step loop
    // ---------------------------------------------------------------

    fn steps(&mut self, first: Step) -> Result<(), EngineError> {
        self.step = first;
        let mut executed = 0usize;
        let mut fault: Option<EngineError> = None;
        while self.step < Step::DetachRequest {
            executed += 1;
            if executed > MAX_STEPS {
                let e = EngineError::StepCeilingExceeded { steps: executed };
                log::error!("{e}");
                fault = Some(e);
                break;
            }
            let before = self.step;
            match self.run_step(before) {
                Ok(CycleControl::Continue) => {
                    // a step may have rewound the plan; only advance
                    // when it did not
                    if self.step == before {
                        self.step = before.next();
                    }
                }
                Ok(CycleControl::RestartAtRespond) => {
                    self.step = Step::Respond;
                }
                Err(e) => {
                    if self.handling_exception {
                        log::error!("fault while handling an earlier fault: {e}");
                        fault = Some(e);
                        break;
                    }
                    self.handling_exception = true;
                    self.step = Step::HandleException;
                    if e.is_expected() {
                        log::debug!("expected condition at step {before:?}: {e}");
                    } else {
                        log::error!("step {before:?} failed: {e}");
                    }
                    let processor = self.app.processor();
                    match processor.respond_with_exception(self, &e) {
                        Ok(()) => {
                            // the exception response stands in for the
                            // planned one; the request completes normally
                            self.fault = Some(e);
                        }
                        Err(nested) => {
                            log::error!("exception response failed: {nested}");
                            fault = Some(e);
                        }
                    }
                    break;
                }
            }
        }
        match fault {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_step(&mut self, step: Step) -> StepResult {
        match step {
            Step::PrepareRequest => {
                self.prepare();
                Ok(CycleControl::Continue)
            }
            Step::ResolveTarget => self.resolve(),
            Step::ProcessEvents => {
                // at most once per request; after a respond-phase rewind
                // this step is a pass-through on the way back to Respond
                if self.events_processed {
                    return Ok(CycleControl::Continue);
                }
                self.events_processed = true;
                let processor = self.app.processor();
                processor.process_events(self)
            }
            Step::Respond => {
                let processor = self.app.processor();
                processor.respond(self)
            }
            _ => Ok(CycleControl::Continue),
        }
    }

    fn prepare(&mut self) {
        if self.request.parameter("ajax").is_some() {
            // partial updates fold their changes into the previous
            // version rather than opening a new one
            self.merge_version = true;
        }
        log::debug!(
            "processing {} {}",
            self.request.method(),
            self.request.path()
        );
    }

    fn resolve(&mut self) -> StepResult {
        let processor = self.app.processor();
        match processor.resolve(self)? {
            Resolution::Target(target) => {
                // the resolver's own target sits under anything it
                // scheduled along the way
                self.targets.insert(0, target);
                self.handled = true;
            }
            Resolution::Unhandled => {
                if self.targets.is_empty() {
                    self.handled = false;
                    log::debug!("no target resolved for {}", self.request.path());
                }
            }
            Resolution::Restart => return Ok(CycleControl::RestartAtRespond),
        }
        Ok(CycleControl::Continue)
    }

    /// End-of-request teardown. Every sub-step runs, each isolated so
    /// one failing cleanup cannot starve the others.
    fn detach(&mut self) {
        self.step = Step::DetachRequest;
        let mut targets = std::mem::take(&mut self.targets);
        for target in targets.iter_mut() {
            if let Err(e) = target.detach(self) {
                log::error!("target {} failed to detach: {e}", target.describe());
            }
        }
        if self.app.settings().automatic_feedback_cleanup {
            self.session.cleanup_feedback_messages();
        }
        self.session.request_detached();
        if let Some(hook) = self.app.on_end_request() {
            hook(self.session);
        }
        self.response.flush();
        log::debug!(
            "request for {} took {:?}",
            self.request.path(),
            self.start.elapsed()
        );
        self.step = Step::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::processor::RequestProcessor;

    type Log = Rc<RefCell<Vec<String>>>;

    struct LogTarget {
        name: &'static str,
        log: Log,
    }

    impl LogTarget {
        fn boxed(name: &'static str, log: &Log) -> Box<LogTarget> {
            Box::new(LogTarget {
                name,
                log: Rc::clone(log),
            })
        }
    }

    impl RequestTarget for LogTarget {
        fn respond(&mut self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            self.log.borrow_mut().push(format!("respond:{}", self.name));
            Ok(CycleControl::Continue)
        }

        fn detach(&mut self, _cycle: &mut RequestCycle<'_>) -> Result<(), EngineError> {
            self.log.borrow_mut().push(format!("detach:{}", self.name));
            Ok(())
        }

        fn describe(&self) -> String {
            self.name.to_string()
        }
    }

    struct FixedProcessor {
        resolve: Box<dyn Fn(&mut RequestCycle<'_>) -> Result<Resolution, EngineError>>,
    }

    impl RequestProcessor for FixedProcessor {
        fn resolve(&self, cycle: &mut RequestCycle<'_>) -> Result<Resolution, EngineError> {
            (self.resolve)(cycle)
        }

        fn process_events(&self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            Ok(CycleControl::Continue)
        }

        fn respond(&self, cycle: &mut RequestCycle<'_>) -> StepResult {
            cycle.respond_current_target()
        }

        fn respond_with_exception(
            &self,
            cycle: &mut RequestCycle<'_>,
            error: &EngineError,
        ) -> Result<(), EngineError> {
            cycle.response_mut().reset_buffer();
            cycle.response_mut().write(&format!("error: {error}"));
            Ok(())
        }
    }

    fn app_resolving_to(
        resolve: impl Fn(&mut RequestCycle<'_>) -> Result<Resolution, EngineError> + 'static,
    ) -> Application {
        Application::new("test").with_processor(FixedProcessor {
            resolve: Box::new(resolve),
        })
    }

    #[test]
    fn steps_advance_in_order_and_finish_done() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let resolve_log = Rc::clone(&log);
        let app = app_resolving_to(move |_| {
            Ok(Resolution::Target(Box::new(LogTarget {
                name: "only",
                log: Rc::clone(&resolve_log),
            })))
        });
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle.process().unwrap();
        assert_eq!(cycle.step(), Step::Done);
        assert!(cycle.response().is_flushed());
        assert_eq!(*log.borrow(), vec!["respond:only", "detach:only"]);
    }

    #[test]
    fn targets_pushed_during_resolve_respond_first() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let resolve_log = Rc::clone(&log);
        let app = app_resolving_to(move |cycle| {
            cycle.set_request_target(LogTarget::boxed("scheduled", &resolve_log));
            Ok(Resolution::Target(LogTarget::boxed(
                "resolved",
                &resolve_log,
            )))
        });
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle.process().unwrap();

        // only the newest target responds; the resolver's own target
        // sits at the bottom and is only detached
        assert_eq!(
            *log.borrow(),
            vec!["respond:scheduled", "detach:resolved", "detach:scheduled"]
        );
    }

    struct RestartingTarget {
        restarted: bool,
        log: Log,
    }

    impl RequestTarget for RestartingTarget {
        fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
            if self.restarted {
                self.log.borrow_mut().push("respond:restarting".into());
                return Ok(CycleControl::Continue);
            }
            self.restarted = true;
            cycle.set_request_target(LogTarget::boxed("replacement", &self.log));
            Ok(CycleControl::RestartAtRespond)
        }

        fn describe(&self) -> String {
            "restarting".to_string()
        }
    }

    #[test]
    fn restart_responds_to_latest_target() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let resolve_log = Rc::clone(&log);
        let app = app_resolving_to(move |_| {
            Ok(Resolution::Target(Box::new(RestartingTarget {
                restarted: false,
                log: Rc::clone(&resolve_log),
            })))
        });
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle.process().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["respond:replacement", "detach:replacement"]
        );
    }

    #[test]
    fn restart_during_resolution_skips_straight_to_respond() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let resolve_log = Rc::clone(&log);
        let app = app_resolving_to(move |cycle| {
            cycle.set_request_target(LogTarget::boxed("scheduled", &resolve_log));
            Ok(Resolution::Restart)
        });
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle.process().unwrap();
        // event processing is skipped; respond runs next
        assert_eq!(
            *log.borrow(),
            vec!["respond:scheduled", "detach:scheduled"]
        );
    }

    #[test]
    fn a_cycle_cannot_be_processed_twice() {
        let app = app_resolving_to(|_| Ok(Resolution::Unhandled));
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle.process().unwrap();
        assert!(matches!(cycle.process(), Err(EngineError::CycleReused)));
    }

    #[test]
    fn unhandled_request_still_flushes_the_response() {
        let app = app_resolving_to(|_| Ok(Resolution::Unhandled));
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/nothing"));
        cycle.process().unwrap();
        assert!(!cycle.is_handled());
        assert!(cycle.response().is_flushed());
        assert_eq!(cycle.response().body(), "");
    }

    struct AlwaysRestart;

    impl RequestTarget for AlwaysRestart {
        fn respond(&mut self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            Ok(CycleControl::RestartAtRespond)
        }
    }

    #[test]
    fn runaway_replanning_hits_the_step_ceiling() {
        let app = app_resolving_to(|_| Ok(Resolution::Target(Box::new(AlwaysRestart))));
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        let err = cycle.process().unwrap_err();
        assert!(matches!(err, EngineError::StepCeilingExceeded { .. }));
        // teardown still ran
        assert!(cycle.response().is_flushed());
    }

    struct FailingTarget;

    impl RequestTarget for FailingTarget {
        fn respond(&mut self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            Err(EngineError::custom("boom"))
        }
    }

    #[test]
    fn a_failing_step_produces_an_error_response_and_detaches() {
        let app = app_resolving_to(|_| Ok(Resolution::Target(Box::new(FailingTarget))));
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        // the error response stood in for the planned one, so the
        // request itself completed
        cycle.process().unwrap();
        assert!(matches!(cycle.fault(), Some(EngineError::Custom { .. })));
        assert_eq!(cycle.response().body(), "error: boom");
        assert!(cycle.response().is_flushed());
        assert_eq!(cycle.step(), Step::Done);
    }

    struct BrokenExceptionProcessor;

    impl RequestProcessor for BrokenExceptionProcessor {
        fn resolve(&self, _cycle: &mut RequestCycle<'_>) -> Result<Resolution, EngineError> {
            Ok(Resolution::Target(Box::new(FailingTarget)))
        }

        fn process_events(&self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            Ok(CycleControl::Continue)
        }

        fn respond(&self, cycle: &mut RequestCycle<'_>) -> StepResult {
            cycle.respond_current_target()
        }

        fn respond_with_exception(
            &self,
            _cycle: &mut RequestCycle<'_>,
            _error: &EngineError,
        ) -> Result<(), EngineError> {
            Err(EngineError::custom("error page also failed"))
        }
    }

    #[test]
    fn a_failing_exception_response_propagates_the_original_fault() {
        let app = Application::new("test").with_processor(BrokenExceptionProcessor);
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        let err = cycle.process().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(cycle.fault().is_none());
        assert!(cycle.response().is_flushed());
    }

    #[test]
    fn an_expired_page_is_an_expected_condition() {
        use crate::target::PageTarget;

        // default processor renders the error response
        let app = Application::new("test");
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/render/main/7"));
        cycle
            .process_with_target(Box::new(PageTarget::new("main", 7)))
            .unwrap();
        let err = cycle.take_fault().unwrap();
        assert!(err.is_expected());
        assert!(matches!(err, EngineError::PageExpired { page_id: 7, .. }));
        assert!(cycle.response().body().contains("expired"));
    }

    struct CountingEventsProcessor {
        events: Rc<Cell<usize>>,
    }

    impl RequestProcessor for CountingEventsProcessor {
        fn resolve(&self, _cycle: &mut RequestCycle<'_>) -> Result<Resolution, EngineError> {
            Ok(Resolution::Unhandled)
        }

        fn process_events(&self, _cycle: &mut RequestCycle<'_>) -> StepResult {
            self.events.set(self.events.get() + 1);
            Ok(CycleControl::Continue)
        }

        fn respond(&self, cycle: &mut RequestCycle<'_>) -> StepResult {
            cycle.respond_current_target()
        }

        fn respond_with_exception(
            &self,
            _cycle: &mut RequestCycle<'_>,
            _error: &EngineError,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct SwappingTarget {
        log: Log,
    }

    impl RequestTarget for SwappingTarget {
        fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
            self.log.borrow_mut().push("respond:swapping".into());
            cycle.set_request_target(LogTarget::boxed("replacement", &self.log));
            Ok(CycleControl::Continue)
        }

        fn detach(&mut self, _cycle: &mut RequestCycle<'_>) -> Result<(), EngineError> {
            self.log.borrow_mut().push("detach:swapping".into());
            Ok(())
        }

        fn describe(&self) -> String {
            "swapping".to_string()
        }
    }

    #[test]
    fn replanning_mid_respond_does_not_redispatch_events() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(Cell::new(0usize));
        let app = Application::new("test").with_processor(CountingEventsProcessor {
            events: Rc::clone(&events),
        });
        let mut session = app.new_session();
        let mut cycle = RequestCycle::new(&app, &mut session, Request::get("/"));
        cycle
            .process_with_target(Box::new(SwappingTarget {
                log: Rc::clone(&log),
            }))
            .unwrap();

        // the replacement produced the response, and the rewind did not
        // fire the event step a second time
        assert_eq!(events.get(), 1);
        assert_eq!(
            *log.borrow(),
            vec![
                "respond:swapping",
                "respond:replacement",
                "detach:swapping",
                "detach:replacement"
            ]
        );
    }
}
