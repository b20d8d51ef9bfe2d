//! Sessions: named page maps with access-ordered eviction, plus the
//! feedback message store cleaned between requests.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::error::EngineError;
use crate::page::Page;

pub const DEFAULT_PAGE_MAP: &str = "main";

/// Severity of a feedback message.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum FeedbackLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A user-facing message reported against a component path, or against
/// the session when no path is given.
#[derive(Clone, Debug)]
pub struct FeedbackMessage {
    pub reporter: Option<String>,
    pub level: FeedbackLevel,
    pub text: String,
    rendered: bool,
}

impl FeedbackMessage {
    pub fn new(reporter: Option<String>, level: FeedbackLevel, text: impl Into<String>) -> Self {
        FeedbackMessage {
            reporter,
            level,
            text: text.into(),
            rendered: false,
        }
    }

    pub fn mark_rendered(&mut self) {
        self.rendered = true;
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }
}

/// Decides which page to drop when a page map exceeds its capacity.
pub trait EvictionStrategy {
    fn evict(&self, page_map: &mut PageMap);
}

/// Keeps the most recently touched pages; before dropping a page
/// outright its oldest version is expired first, so back-button depth
/// degrades before whole pages disappear.
pub struct LeastRecentlyUsedEviction {
    max_entries: usize,
}

impl LeastRecentlyUsedEviction {
    pub fn new(max_entries: usize) -> Self {
        LeastRecentlyUsedEviction {
            max_entries: max_entries.max(1),
        }
    }
}

impl EvictionStrategy for LeastRecentlyUsedEviction {
    fn evict(&self, page_map: &mut PageMap) {
        while page_map.len() > self.max_entries {
            if let Some(oldest) = page_map.oldest_id() {
                let trimmed = page_map
                    .get_mut(oldest)
                    .map(|page| {
                        if page.version_count() > 1 {
                            page.expire_oldest_version();
                            true
                        } else {
                            false
                        }
                    })
                    .unwrap_or(false);
                if !trimmed {
                    log::debug!("evicting page {oldest} from page map");
                    page_map.remove(oldest);
                }
            } else {
                break;
            }
        }
    }
}

/// An insertion/access-ordered store of pages. The front entry is the
/// least recently used.
#[derive(Default)]
pub struct PageMap {
    name: String,
    pages: IndexMap<u16, Page>,
    next_id: u16,
}

impl PageMap {
    pub fn new(name: impl Into<String>) -> Self {
        PageMap {
            name: name.into(),
            pages: IndexMap::new(),
            next_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Reserves the next session-relative numeric page id. Stateless
    /// pages burn an id too, so a later stateful twin cannot collide
    /// with one already handed out.
    pub fn reserve_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    pub fn put(&mut self, page: Page) {
        self.pages.insert(page.numeric_id(), page);
    }

    /// Fetches a page and marks it most recently used.
    pub fn touch(&mut self, id: u16) -> Option<&mut Page> {
        if self.pages.contains_key(&id) {
            // move to the back of the access order
            if let Some(page) = self.pages.shift_remove(&id) {
                self.pages.insert(id, page);
            }
        }
        self.pages.get_mut(&id)
    }

    pub fn get(&self, id: u16) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Page> {
        self.pages.get_mut(&id)
    }

    pub fn remove(&mut self, id: u16) -> Option<Page> {
        self.pages.shift_remove(&id)
    }

    fn oldest_id(&self) -> Option<u16> {
        self.pages.keys().next().copied()
    }
}

pub struct Session {
    page_maps: AHashMap<String, PageMap>,
    feedback: Vec<FeedbackMessage>,
    eviction: Rc<dyn EvictionStrategy>,
    dirty: bool,
}

impl Session {
    pub fn new(eviction: Rc<dyn EvictionStrategy>) -> Self {
        Session {
            page_maps: AHashMap::new(),
            feedback: Vec::new(),
            eviction,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn page_map(&mut self, name: &str) -> &mut PageMap {
        self.page_maps
            .entry(name.to_string())
            .or_insert_with(|| PageMap::new(name))
    }

    pub fn page_map_names(&self) -> Vec<&str> {
        self.page_maps.keys().map(String::as_str).collect()
    }

    /// Stores a stateful page into its map, evicting if over capacity.
    pub fn store_page(&mut self, page_map: &str, page: Page) {
        let eviction = Rc::clone(&self.eviction);
        let map = self.page_map(page_map);
        map.put(page);
        eviction.evict(map);
        self.dirty = true;
    }

    /// Looks a page up by map and id, refreshing its access order.
    pub fn page(&mut self, page_map: &str, id: u16) -> Result<&mut Page, EngineError> {
        let name = page_map.to_string();
        self.page_map(page_map)
            .touch(id)
            .ok_or(EngineError::PageExpired {
                page_map: name,
                page_id: id,
            })
    }

    pub fn feedback(&mut self, message: FeedbackMessage) {
        self.feedback.push(message);
        self.dirty = true;
    }

    pub fn feedback_messages(&self) -> &[FeedbackMessage] {
        &self.feedback
    }

    pub fn feedback_messages_mut(&mut self) -> &mut [FeedbackMessage] {
        &mut self.feedback
    }

    /// Drops messages already shown to the user.
    pub fn cleanup_feedback_messages(&mut self) {
        let before = self.feedback.len();
        self.feedback.retain(|m| !m.is_rendered());
        if self.feedback.len() != before {
            self.dirty = true;
        }
    }

    /// End-of-request bookkeeping.
    pub fn request_detached(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_capacity(max: usize) -> Session {
        Session::new(Rc::new(LeastRecentlyUsedEviction::new(max)))
    }

    #[test]
    fn reserved_ids_are_never_reissued() {
        let mut map = PageMap::new(DEFAULT_PAGE_MAP);
        let a = map.reserve_id();
        let b = map.reserve_id();
        assert_ne!(a, b);
        // a stateless page that reserved `a` was never stored; the next
        // reservation still moves on
        assert_ne!(map.reserve_id(), a);
    }

    #[test]
    fn touch_refreshes_access_order() {
        let mut session = session_with_capacity(2);
        let map = session.page_map(DEFAULT_PAGE_MAP);
        let (a, b) = (map.reserve_id(), map.reserve_id());
        session.store_page(DEFAULT_PAGE_MAP, Page::new(a));
        session.store_page(DEFAULT_PAGE_MAP, Page::new(b));

        // touching `a` makes `b` the eviction candidate
        session.page(DEFAULT_PAGE_MAP, a).unwrap();
        let c = session.page_map(DEFAULT_PAGE_MAP).reserve_id();
        session.store_page(DEFAULT_PAGE_MAP, Page::new(c));

        assert!(session.page_map(DEFAULT_PAGE_MAP).get(a).is_some());
        assert!(session.page_map(DEFAULT_PAGE_MAP).get(b).is_none());
    }

    #[test]
    fn expired_page_lookup_is_an_expected_error() {
        let mut session = session_with_capacity(1);
        let err = session.page(DEFAULT_PAGE_MAP, 9).unwrap_err();
        assert!(err.is_expected());
        assert!(matches!(err, EngineError::PageExpired { page_id: 9, .. }));
    }

    #[test]
    fn separate_page_maps_do_not_interfere() {
        let mut session = session_with_capacity(1);
        let a = session.page_map("left").reserve_id();
        let b = session.page_map("right").reserve_id();
        session.store_page("left", Page::new(a));
        session.store_page("right", Page::new(b));
        assert!(session.page("left", a).is_ok());
        assert!(session.page("right", b).is_ok());
    }

    #[test]
    fn cleanup_drops_only_rendered_messages() {
        let mut session = session_with_capacity(1);
        session.feedback(FeedbackMessage::new(
            None,
            FeedbackLevel::Info,
            "saved",
        ));
        session.feedback(FeedbackMessage::new(
            Some("0:form".into()),
            FeedbackLevel::Error,
            "required",
        ));
        session.feedback_messages_mut()[0].mark_rendered();
        session.cleanup_feedback_messages();
        assert_eq!(session.feedback_messages().len(), 1);
        assert_eq!(session.feedback_messages()[0].text, "required");
    }
}
