//! An in-memory request harness: one application, one live session,
//! and a fresh cycle per processed request.

use weft_core::cycle::RequestCycle;
use weft_core::error::EngineError;
use weft_core::markup::{MarkupRegion, MarkupSource, MarkupStream};
use weft_core::request::{Request, Response};
use weft_core::session::Session;
use weft_core::target::RequestTarget;
use weft_core::Application;

/// Drives requests against an application with a persistent session,
/// the way a browser session would.
pub struct TestEngine {
    app: Application,
    session: Session,
}

impl TestEngine {
    pub fn new(app: Application) -> Self {
        let session = app.new_session();
        TestEngine { app, session }
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Runs one full request cycle.
    pub fn process(&mut self, request: Request) -> TestResult {
        let mut cycle = RequestCycle::new(&self.app, &mut self.session, request);
        let outcome = cycle.process();
        if let Err(e) = &outcome {
            log::debug!("request ended with: {e}");
        }
        let fault = cycle.take_fault();
        TestResult {
            outcome,
            fault,
            response: cycle.into_response(),
        }
    }

    /// Runs one cycle with a pre-resolved target, skipping resolution.
    pub fn process_target(
        &mut self,
        request: Request,
        target: Box<dyn RequestTarget>,
    ) -> TestResult {
        let mut cycle = RequestCycle::new(&self.app, &mut self.session, request);
        let outcome = cycle.process_with_target(target);
        let fault = cycle.take_fault();
        TestResult {
            outcome,
            fault,
            response: cycle.into_response(),
        }
    }

    pub fn get(&mut self, path: &str) -> TestResult {
        self.process(Request::get(path))
    }

    /// Renders a registered bookmarkable page by name.
    pub fn render_bookmarkable(&mut self, name: &str) -> TestResult {
        self.get(&format!("/page/{name}"))
    }
}

/// Outcome of one processed request. `outcome` is the cycle's own
/// verdict; `fault` is the error an exception response answered, for
/// requests that completed with an error page instead of the plan.
pub struct TestResult {
    pub outcome: Result<(), EngineError>,
    pub fault: Option<EngineError>,
    pub response: Response,
}

impl TestResult {
    pub fn body(&self) -> &str {
        self.response.body()
    }

    /// Asserts the request produced its planned response, with no error
    /// page standing in.
    #[track_caller]
    pub fn assert_ok(&self) -> &Self {
        if let Err(e) = &self.outcome {
            panic!("request failed: {e}\nbody: {}", self.response.body());
        }
        if let Some(e) = &self.fault {
            panic!(
                "request answered with an error page: {e}\nbody: {}",
                self.response.body()
            );
        }
        self
    }

    /// The error this request raised, whether it propagated or was
    /// answered by an error page.
    #[track_caller]
    pub fn expect_fault(&self) -> &EngineError {
        match (&self.outcome, &self.fault) {
            (Err(e), _) => e,
            (Ok(()), Some(e)) => e,
            (Ok(()), None) => {
                panic!("request unexpectedly succeeded: {}", self.response.body())
            }
        }
    }

    #[track_caller]
    pub fn assert_body(&self, expected: &str) -> &Self {
        assert_eq!(self.response.body(), expected);
        self
    }

    #[track_caller]
    pub fn assert_body_contains(&self, fragment: &str) -> &Self {
        assert!(
            self.response.body().contains(fragment),
            "body {:?} does not contain {fragment:?}",
            self.response.body()
        );
        self
    }

    #[track_caller]
    pub fn assert_redirect(&self, location: &str) -> &Self {
        assert_eq!(self.response.redirect_location(), Some(location));
        self
    }
}

/// A canned markup source: the same region list for every page key.
pub struct StaticMarkup {
    regions: Vec<MarkupRegion>,
}

impl StaticMarkup {
    /// Builds from `(component, tag)` pairs in document order.
    pub fn new(regions: &[(&str, &str)]) -> Self {
        StaticMarkup {
            regions: regions
                .iter()
                .map(|(component, tag)| MarkupRegion {
                    component: (*component).to_string(),
                    tag: (*tag).to_string(),
                })
                .collect(),
        }
    }
}

impl MarkupSource for StaticMarkup {
    fn markup_for_page(&self, _page_key: Option<&str>) -> MarkupStream {
        MarkupStream::new(self.regions.clone())
    }
}
