//! Application: the immutable configuration shared by every request
//! cycle, with builder-style setup.

use std::rc::Rc;

use ahash::AHashMap;

use crate::auth::{AllowAll, AuthorizationStrategy};
use crate::error::EngineError;
use crate::markup::{MarkupSource, NoMarkup};
use crate::page::{Page, ValuePersister};
use crate::processor::{DefaultProcessor, RequestProcessor};
use crate::session::{EvictionStrategy, LeastRecentlyUsedEviction, Session};

/// Tunables shared by all cycles of an application.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Fail a render when a visible component was never reached.
    pub component_use_check: bool,
    /// Undo history retained per page.
    pub max_page_versions: usize,
    /// Stored pages retained per page map.
    pub max_page_map_entries: usize,
    /// Drop rendered feedback messages when the request detaches.
    pub automatic_feedback_cleanup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            component_use_check: true,
            max_page_versions: 10,
            max_page_map_entries: 5,
            automatic_feedback_cleanup: true,
        }
    }
}

/// Builds a page for a bookmarkable name. The id is session-relative
/// and already reserved by the caller.
pub type PageFactory =
    Rc<dyn Fn(u16, &AHashMap<String, String>) -> Result<Page, EngineError>>;

pub type EndRequestHook = Rc<dyn Fn(&mut Session)>;

pub struct Application {
    name: String,
    settings: Settings,
    auth: Rc<dyn AuthorizationStrategy>,
    markup: Rc<dyn MarkupSource>,
    processor: Rc<dyn RequestProcessor>,
    eviction: Rc<dyn EvictionStrategy>,
    persister: Option<Rc<dyn ValuePersister>>,
    pages: AHashMap<String, PageFactory>,
    home_page: Option<String>,
    on_end_request: Option<EndRequestHook>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        let settings = Settings::default();
        Application {
            name: name.into(),
            eviction: Rc::new(LeastRecentlyUsedEviction::new(
                settings.max_page_map_entries,
            )),
            settings,
            auth: Rc::new(AllowAll),
            markup: Rc::new(NoMarkup),
            processor: Rc::new(DefaultProcessor),
            persister: None,
            pages: AHashMap::new(),
            home_page: None,
            on_end_request: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.eviction = Rc::new(LeastRecentlyUsedEviction::new(
            settings.max_page_map_entries,
        ));
        self.settings = settings;
        self
    }

    pub fn with_authorization(
        mut self,
        strategy: impl AuthorizationStrategy + 'static,
    ) -> Self {
        self.auth = Rc::new(strategy);
        self
    }

    pub fn with_markup(mut self, source: impl MarkupSource + 'static) -> Self {
        self.markup = Rc::new(source);
        self
    }

    pub fn with_processor(mut self, processor: impl RequestProcessor + 'static) -> Self {
        self.processor = Rc::new(processor);
        self
    }

    pub fn with_eviction(mut self, eviction: impl EvictionStrategy + 'static) -> Self {
        self.eviction = Rc::new(eviction);
        self
    }

    pub fn with_value_persister(mut self, persister: impl ValuePersister + 'static) -> Self {
        self.persister = Some(Rc::new(persister));
        self
    }

    /// Registers a bookmarkable page under `name`. The first registered
    /// page becomes the home page unless one was set explicitly.
    pub fn with_page(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(u16, &AHashMap<String, String>) -> Result<Page, EngineError> + 'static,
    ) -> Self {
        let name = name.into();
        if self.home_page.is_none() {
            self.home_page = Some(name.clone());
        }
        self.pages.insert(name, Rc::new(factory));
        self
    }

    pub fn with_home_page(mut self, name: impl Into<String>) -> Self {
        self.home_page = Some(name.into());
        self
    }

    pub fn with_end_request_hook(mut self, hook: impl Fn(&mut Session) + 'static) -> Self {
        self.on_end_request = Some(Rc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn auth_strategy(&self) -> &dyn AuthorizationStrategy {
        &*self.auth
    }

    pub fn markup_source(&self) -> &dyn MarkupSource {
        &*self.markup
    }

    pub fn processor(&self) -> Rc<dyn RequestProcessor> {
        Rc::clone(&self.processor)
    }

    pub fn value_persister(&self) -> Option<&dyn ValuePersister> {
        self.persister.as_deref()
    }

    pub fn home_page(&self) -> Option<&str> {
        self.home_page.as_deref()
    }

    pub fn on_end_request(&self) -> Option<EndRequestHook> {
        self.on_end_request.clone()
    }

    /// A session wired to this application's eviction policy.
    pub fn new_session(&self) -> Session {
        Session::new(Rc::clone(&self.eviction))
    }

    /// Constructs the named bookmarkable page with an already-reserved
    /// id, applying the application's version retention setting.
    pub fn create_page(
        &self,
        name: &str,
        id: u16,
        parameters: &AHashMap<String, String>,
    ) -> Result<Page, EngineError> {
        let factory = self
            .pages
            .get(name)
            .ok_or_else(|| EngineError::NoPageFactory {
                name: name.to_string(),
            })?;
        Ok(factory(id, parameters)?.with_max_versions(self.settings.max_page_versions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_page_becomes_the_home_page() {
        let app = Application::new("demo")
            .with_page("welcome", |id, _| Ok(Page::new(id)))
            .with_page("about", |id, _| Ok(Page::new(id)));
        assert_eq!(app.home_page(), Some("welcome"));
    }

    #[test]
    fn unknown_bookmarkable_name_is_reported() {
        let app = Application::new("demo");
        let err = app
            .create_page("nope", 0, &AHashMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoPageFactory { .. }));
    }
}
