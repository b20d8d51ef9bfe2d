//! Request targets: units of response work scheduled on the cycle's
//! target stack.

use ahash::AHashMap;

use crate::cycle::{CycleControl, RequestCycle, StepResult};
use crate::error::EngineError;
use crate::page::Page;
use crate::session::DEFAULT_PAGE_MAP;

/// One scheduled unit of response work. Targets respond in stack order
/// and every target gets a detach callback at the end of the request,
/// whether or not it responded.
pub trait RequestTarget {
    fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult;

    fn detach(&mut self, _cycle: &mut RequestCycle<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// A URL that re-resolves to this target, when one exists.
    fn url(&self) -> Option<String> {
        None
    }

    fn describe(&self) -> String {
        "target".to_string()
    }
}

/// Renders an existing stateful page out of the session.
pub struct PageTarget {
    page_map: String,
    page_id: u16,
}

impl PageTarget {
    pub fn new(page_map: impl Into<String>, page_id: u16) -> Self {
        PageTarget {
            page_map: page_map.into(),
            page_id,
        }
    }

    pub fn page_id(&self) -> u16 {
        self.page_id
    }
}

impl RequestTarget for PageTarget {
    fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
        cycle.render_session_page(&self.page_map, self.page_id)?;
        Ok(CycleControl::Continue)
    }

    fn detach(&mut self, cycle: &mut RequestCycle<'_>) -> Result<(), EngineError> {
        cycle.end_session_page(&self.page_map, self.page_id)
    }

    fn url(&self) -> Option<String> {
        Some(format!("/render/{}/{}", self.page_map, self.page_id))
    }

    fn describe(&self) -> String {
        format!("page[{}/{}]", self.page_map, self.page_id)
    }
}

/// Constructs a page from a registered factory and renders it. The
/// constructed page is stored back into the session only when it turns
/// out to be stateful.
pub struct BookmarkablePageTarget {
    name: String,
    parameters: AHashMap<String, String>,
    stored: Option<u16>,
}

impl BookmarkablePageTarget {
    pub fn new(name: impl Into<String>, parameters: AHashMap<String, String>) -> Self {
        BookmarkablePageTarget {
            name: name.into(),
            parameters,
            stored: None,
        }
    }

    pub fn page_name(&self) -> &str {
        &self.name
    }

    /// Id of the page this target stored into the session, when it did.
    pub fn stored_page_id(&self) -> Option<u16> {
        self.stored
    }
}

impl RequestTarget for BookmarkablePageTarget {
    fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
        let page = cycle.create_page(&self.name, &self.parameters)?;
        self.stored = cycle.render_new_page(DEFAULT_PAGE_MAP, page)?;
        Ok(CycleControl::Continue)
    }

    fn url(&self) -> Option<String> {
        Some(format!("/page/{}", self.name))
    }

    fn describe(&self) -> String {
        format!("bookmarkable[{}]", self.name)
    }
}

/// Responds with an HTTP redirect instead of a rendered body.
pub struct RedirectTarget {
    location: String,
}

impl RedirectTarget {
    pub fn new(location: impl Into<String>) -> Self {
        RedirectTarget {
            location: location.into(),
        }
    }
}

impl RequestTarget for RedirectTarget {
    fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
        cycle.response_mut().redirect(&self.location);
        Ok(CycleControl::Continue)
    }

    fn url(&self) -> Option<String> {
        Some(self.location.clone())
    }

    fn describe(&self) -> String {
        format!("redirect[{}]", self.location)
    }
}

/// Renders a page the caller already holds, outside any session store.
/// Used by tests and by error pages that never become stateful.
pub struct DetachedPageTarget {
    page: Option<Page>,
}

impl DetachedPageTarget {
    pub fn new(page: Page) -> Self {
        DetachedPageTarget { page: Some(page) }
    }

    pub fn take_page(&mut self) -> Option<Page> {
        self.page.take()
    }
}

impl RequestTarget for DetachedPageTarget {
    fn respond(&mut self, cycle: &mut RequestCycle<'_>) -> StepResult {
        if let Some(page) = self.page.as_mut() {
            cycle.render_detached_page(page)?;
            page.end_request()?;
        }
        Ok(CycleControl::Continue)
    }

    fn describe(&self) -> String {
        "detached-page".to_string()
    }
}
