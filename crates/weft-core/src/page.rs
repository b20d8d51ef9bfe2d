//! Pages: the root of a component tree, the unit of versioning and of
//! session storage.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashSet;

use crate::auth::{Action, AuthorizationStrategy};
use crate::component::{
    render_component, Component, ComponentId, ComponentTree, Flags, RenderPass, Role,
};
use crate::error::EngineError;
use crate::markup::MarkupSource;
use crate::model::{DefaultComparator, Model, ModelComparator, ModelValue};
use crate::request::Response;
use crate::version::{Change, UndoVersionManager, VersionManager};

/// Restores client-persisted form values at the start of a render pass.
pub trait ValuePersister {
    fn restore(&self, page: &mut Page);
}

pub type VersionManagerFactory = Rc<dyn Fn(usize) -> Box<dyn VersionManager>>;

pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Everything a page needs from the outside to run one render pass.
pub struct PageRenderContext<'a> {
    pub auth: &'a dyn AuthorizationStrategy,
    pub markup: &'a dyn MarkupSource,
    pub persister: Option<&'a dyn ValuePersister>,
    pub response: &'a mut Response,
    pub component_use_check: bool,
}

pub struct Page {
    numeric_id: u16,
    page_key: Option<String>,
    tree: ComponentTree,
    version_manager: Option<Box<dyn VersionManager>>,
    version_factory: VersionManagerFactory,
    max_versions: usize,
    rendered: HashSet<ComponentId>,
    auto_index: u32,
    rendering: bool,
    version_tracking: bool,
    new_version_started: bool,
    merge_version: bool,
    stateless: Option<bool>,
    stateless_hint: bool,
    dirty: bool,
}

impl Page {
    /// A fresh page. The numeric id is session/page-map unique and
    /// assigned by the page map at construction time; the page starts
    /// dirty and at version 0.
    pub fn new(numeric_id: u16) -> Page {
        let root = Component::new(numeric_id.to_string())
            .expect("numeric page id renders to a non-empty name")
            .with_role(Role::Page);
        Page {
            numeric_id,
            page_key: None,
            tree: ComponentTree::new(root),
            version_manager: None,
            version_factory: Rc::new(|max| Box::new(UndoVersionManager::new(max))),
            max_versions: DEFAULT_MAX_VERSIONS,
            rendered: HashSet::new(),
            auto_index: 0,
            rendering: false,
            version_tracking: true,
            new_version_started: false,
            merge_version: false,
            stateless: None,
            stateless_hint: true,
            dirty: true,
        }
    }

    pub fn with_page_key(mut self, key: impl Into<String>) -> Page {
        self.page_key = Some(key.into());
        self
    }

    pub fn with_version_manager_factory(mut self, factory: VersionManagerFactory) -> Page {
        self.version_factory = factory;
        self
    }

    pub fn with_max_versions(mut self, max_versions: usize) -> Page {
        self.max_versions = max_versions.max(1);
        self
    }

    pub fn with_stateless_hint(mut self, hint: bool) -> Page {
        self.stateless_hint = hint;
        self
    }

    pub fn numeric_id(&self) -> u16 {
        self.numeric_id
    }

    pub fn page_key(&self) -> Option<&str> {
        self.page_key.as_deref()
    }

    pub fn root(&self) -> ComponentId {
        self.tree.root()
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ComponentTree {
        &mut self.tree
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Monotonic counter for generating unique markup ids.
    pub fn next_auto_index(&mut self) -> u32 {
        let index = self.auto_index;
        self.auto_index += 1;
        index
    }

    /// The request-scoped merge flag: changes recorded while set are
    /// folded into the previous version instead of opening a new one.
    pub fn set_merge_version(&mut self, merge: bool) {
        self.merge_version = merge;
    }

    // ---------------------------------------------------------------
    // tree mutation, with change tracking
    // ---------------------------------------------------------------

    pub fn add(
        &mut self,
        parent: ComponentId,
        component: Component,
    ) -> Result<ComponentId, EngineError> {
        let auto = component.is_auto();
        let track = !auto && self.version_tracking && self.tree.is_versioned(parent);
        let id = self.tree.insert(parent, component, self.rendering)?;
        self.dirty = true;
        if track {
            let path = self.tree.path(id);
            self.track_change(Change::Added { path });
        }
        Ok(id)
    }

    pub fn remove(&mut self, id: ComponentId) -> Result<(), EngineError> {
        let auto = self.tree.get(id)?.is_auto();
        let parent = self.tree.get(id)?.parent();
        let track = !auto
            && self.version_tracking
            && parent.map_or(false, |p| self.tree.is_versioned(p));
        let (parent, index, subtree) = self.tree.remove(id, self.rendering)?;
        self.dirty = true;
        if track {
            let parent_path = self.tree.path(parent);
            self.track_change(Change::Removed {
                parent_path,
                index,
                subtree,
            });
        }
        Ok(())
    }

    /// No-op when the value is unchanged; otherwise records an undoable
    /// change capturing the prior value, then flips the flag.
    pub fn set_visible(&mut self, id: ComponentId, visible: bool) -> Result<bool, EngineError> {
        let prior = self.tree.get(id)?.is_visible();
        if prior == visible {
            return Ok(false);
        }
        if self.may_track(id) {
            let path = self.tree.path(id);
            self.track_change(Change::Visibility { path, prior });
        }
        self.tree.get_mut(id)?.set_flag(Flags::VISIBLE, visible);
        self.dirty = true;
        Ok(true)
    }

    pub fn set_enabled(&mut self, id: ComponentId, enabled: bool) -> Result<bool, EngineError> {
        let prior = self.tree.get(id)?.is_enabled();
        if prior == enabled {
            return Ok(false);
        }
        if self.may_track(id) {
            let path = self.tree.path(id);
            self.track_change(Change::Enablement { path, prior });
        }
        self.tree.get_mut(id)?.set_flag(Flags::ENABLED, enabled);
        self.dirty = true;
        Ok(true)
    }

    // ---------------------------------------------------------------
    // models
    // ---------------------------------------------------------------

    /// The component's model, lazily resolved: a component without one
    /// inherits from the nearest ancestor holding an inheritable model,
    /// receiving a wrapped view scoped to its own name. Inheriting
    /// disables versioning for the component, since it now shares state
    /// owned by the ancestor.
    pub fn model(&mut self, id: ComponentId) -> Result<Option<Model>, EngineError> {
        if let Some(model) = self.tree.get(id)?.model() {
            return Ok(Some(model.clone()));
        }
        let name = self.tree.get(id)?.name().to_string();
        let mut current = self.tree.get(id)?.parent();
        while let Some(ancestor) = current {
            let component = self.tree.get(ancestor)?;
            if let Some(model) = component.model() {
                if model.is_inheritable() {
                    let wrapper = model.wrap_for(name);
                    let component = self.tree.get_mut(id)?;
                    component.set_model_raw(Some(wrapper.clone()));
                    component.set_flag(Flags::VERSIONED, false);
                    return Ok(Some(wrapper));
                }
            }
            current = component.parent();
        }
        Ok(None)
    }

    /// Swaps the component's model. The previous model is detached
    /// first; when old and new differ after unwrapping wrapper chains,
    /// an undoable record is captured and the changing/changed
    /// notification pair runs around the swap.
    pub fn set_model(&mut self, id: ComponentId, model: Option<Model>) -> Result<(), EngineError> {
        let prior = self.tree.get(id)?.model().cloned();
        if let Some(prior) = &prior {
            prior.detach();
        }
        let differ = match (&prior, &model) {
            (None, None) => false,
            (Some(a), Some(b)) => !a.shares_root(b)?,
            _ => true,
        };
        if !differ {
            self.tree.get_mut(id)?.set_model_raw(model);
            return Ok(());
        }
        if self.may_track(id) {
            let path = self.tree.path(id);
            self.track_change(Change::ModelReplaced { path, prior });
        }
        self.run_lifecycle_hook(id, HookKind::ModelChanging)?;
        self.tree.get_mut(id)?.set_model_raw(model);
        self.run_lifecycle_hook(id, HookKind::ModelChanged)?;
        self.dirty = true;
        Ok(())
    }

    /// Sets the model object. Fails fast without a model or when the
    /// ENABLE authorization check rejects the change; an equal value
    /// (per the component's comparator) triggers no notifications.
    pub fn set_model_object(
        &mut self,
        auth: &dyn AuthorizationStrategy,
        id: ComponentId,
        value: Box<dyn ModelValue>,
    ) -> Result<bool, EngineError> {
        let path = self.tree.path(id);
        let model = self
            .model(id)?
            .ok_or(EngineError::MissingModel { path: path.clone() })?;
        if !auth.is_action_authorized(self.tree.get(id)?, Action::Enable) {
            return Err(EngineError::Unauthorized {
                path,
                action: Action::Enable,
            });
        }
        let current = model.object();
        let equal = match self.tree.get(id)?.comparator() {
            Some(comparator) => comparator.equal(current.as_deref(), Some(value.as_ref())),
            None => DefaultComparator.equal(current.as_deref(), Some(value.as_ref())),
        };
        if equal {
            return Ok(false);
        }
        if self.may_track(id) {
            self.track_change(Change::Model {
                path,
                prior: current,
            });
        }
        self.run_lifecycle_hook(id, HookKind::ModelChanging)?;
        model.set_object(value);
        self.run_lifecycle_hook(id, HookKind::ModelChanged)?;
        self.dirty = true;
        Ok(true)
    }

    fn run_lifecycle_hook(&mut self, id: ComponentId, kind: HookKind) -> Result<(), EngineError> {
        let hook = {
            let hooks = self.tree.get_mut(id)?.hooks_mut();
            match kind {
                HookKind::ModelChanging => hooks.on_model_changing.take(),
                HookKind::ModelChanged => hooks.on_model_changed.take(),
            }
        };
        if let Some(mut hook) = hook {
            hook(self.tree.get_mut(id)?);
            let hooks = self.tree.get_mut(id)?.hooks_mut();
            match kind {
                HookKind::ModelChanging => hooks.on_model_changing = Some(hook),
                HookKind::ModelChanged => hooks.on_model_changed = Some(hook),
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // versioning
    // ---------------------------------------------------------------

    fn may_track(&self, id: ComponentId) -> bool {
        self.version_tracking
            && self
                .tree
                .get(id)
                .map(|c| !c.is_auto())
                .unwrap_or(false)
            && self.tree.is_versioned(id)
    }

    /// First trackable mutation of a request lazily creates the version
    /// manager and opens a version exactly once.
    fn track_change(&mut self, change: Change) {
        let merge = self.merge_version;
        let manager = self
            .version_manager
            .get_or_insert_with(|| (self.version_factory)(self.max_versions));
        if !self.new_version_started {
            self.new_version_started = true;
            manager.begin_version(merge);
        }
        manager.component_state_changing(change);
    }

    pub fn current_version_number(&self) -> usize {
        self.version_manager
            .as_ref()
            .map_or(0, |m| m.current_version_number())
    }

    pub fn version_count(&self) -> usize {
        self.version_manager.as_ref().map_or(0, |m| m.versions())
    }

    pub fn has_version_manager(&self) -> bool {
        self.version_manager.is_some()
    }

    pub fn expire_oldest_version(&mut self) {
        if let Some(manager) = self.version_manager.as_mut() {
            manager.expire_oldest_version();
        }
    }

    /// Moves the page back to `version`. Version 0 without a manager is
    /// the page itself. Change tracking is suspended while undo records
    /// replay, and landing exactly on version 0 with no ajax delta
    /// collapses the manager away entirely.
    pub fn go_to_version(&mut self, version: usize) -> Result<(), EngineError> {
        self.version_tracking = false;
        let result = match self.version_manager.as_mut() {
            Some(manager) => manager.undo_to(version, &mut self.tree),
            None => {
                self.version_tracking = true;
                return if version == 0 {
                    Ok(())
                } else {
                    Err(EngineError::NoVersion {
                        requested: version,
                        current: 0,
                    })
                };
            }
        };
        self.version_tracking = true;
        result?;
        let pristine = self.version_manager.as_ref().map_or(false, |m| {
            m.current_version_number() == 0 && m.ajax_version_number() == 0
        });
        if pristine {
            self.version_manager = None;
        }
        self.dirty = true;
        Ok(())
    }

    /// Rolls the page state back `versions_back` versions.
    pub fn rollback(&mut self, versions_back: usize) -> Result<(), EngineError> {
        let current = self.current_version_number();
        self.go_to_version(current.saturating_sub(versions_back))
    }

    // ---------------------------------------------------------------
    // render pass
    // ---------------------------------------------------------------

    /// Runs one full render of the page: reset tracking, restore
    /// persisted values, prepare feedback, attach, authorize, render,
    /// then verify full coverage.
    pub fn render_page(&mut self, ctx: &mut PageRenderContext<'_>) -> Result<(), EngineError> {
        self.rendered.clear();
        self.stateless = None;

        if let Some(persister) = ctx.persister {
            persister.restore(self);
        }

        let root = self.tree.root();

        // Feedback-capable components prepare before anything else can
        // restructure the tree under them.
        let mut all = vec![root];
        all.extend(self.tree.descendant_ids(root));
        for id in &all {
            let hook = self.tree.get_mut(*id)?.hooks_mut().prepare_feedback.take();
            if let Some(mut hook) = hook {
                hook(self.tree.get_mut(*id)?);
                self.tree.get_mut(*id)?.hooks_mut().prepare_feedback = Some(hook);
            }
        }

        self.tree.attach(root)?;

        let page_allowed = ctx
            .auth
            .is_action_authorized(self.tree.get(root)?, Action::Render);
        self.tree
            .get_mut(root)?
            .set_flag(Flags::RENDER_ALLOWED, page_allowed);
        if !page_allowed {
            return Err(EngineError::Unauthorized {
                path: self.tree.path(root),
                action: Action::Render,
            });
        }
        for id in self.tree.descendant_ids(root) {
            let allowed = ctx
                .auth
                .is_action_authorized(self.tree.get(id)?, Action::Render);
            self.tree.get_mut(id)?.set_flag(Flags::RENDER_ALLOWED, allowed);
        }

        let mut markup = ctx.markup.markup_for_page(self.page_key.as_deref());
        self.rendering = true;
        let result = {
            let mut pass = RenderPass {
                response: &mut *ctx.response,
                markup: &mut markup,
                rendered: &mut self.rendered,
                auto_index: &mut self.auto_index,
            };
            render_component(&mut self.tree, root, &mut pass)
        };
        self.rendering = false;
        result?;

        if ctx.component_use_check && !ctx.response.is_redirect() {
            self.check_rendering()
        } else {
            self.rendered.clear();
            Ok(())
        }
    }

    /// Full-coverage verification: every visible-in-hierarchy component
    /// must have rendered. Unused auto components are pruned; genuine
    /// omissions are aggregated into one diagnostic.
    fn check_rendering(&mut self) -> Result<(), EngineError> {
        let root = self.tree.root();
        let mut prune = Vec::new();
        let mut offenders = Vec::new();

        let mut stack: Vec<ComponentId> = self
            .tree
            .get(root)
            .map(|c| c.children().iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            let (auto, children) = match self.tree.get(id) {
                Ok(c) => (c.is_auto(), c.children().to_vec()),
                Err(_) => continue,
            };
            if !self.rendered.contains(&id) {
                if auto {
                    // Auto components are transient render-time helpers;
                    // versioning cannot track them, so unused ones are
                    // removed rather than reported.
                    prune.push(id);
                    continue;
                }
                if !self.tree.is_visible_in_hierarchy(id) {
                    continue;
                }
                let role = self.tree.get(id).map(|c| c.role());
                offenders.push(format!(
                    "{}. {} [{}]",
                    offenders.len() + 1,
                    self.tree.path(id),
                    role.map(|r| r.to_string()).unwrap_or_default()
                ));
            }
            stack.extend(children.iter().rev().copied());
        }

        for id in prune {
            if let Err(e) = self.tree.remove(id, false) {
                log::debug!("pruning unused auto component failed: {e}");
            }
        }

        self.rendered.clear();
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(EngineError::UnrenderedComponents {
                report: offenders.join("\n"),
            })
        }
    }

    /// A page is stateless when its own hint and every component's hint
    /// agree; stateless pages are never touched into the session.
    pub fn is_page_stateless(&mut self) -> bool {
        if let Some(cached) = self.stateless {
            return cached;
        }
        let mut stateless = self.stateless_hint && self.version_manager.is_none();
        if stateless {
            let root = self.tree.root();
            let mut ids = vec![root];
            ids.extend(self.tree.descendant_ids(root));
            for id in ids {
                if let Ok(component) = self.tree.get(id) {
                    if !component.stateless_hint() {
                        stateless = false;
                        break;
                    }
                }
            }
        }
        self.stateless = Some(stateless);
        stateless
    }

    // ---------------------------------------------------------------
    // end of request
    // ---------------------------------------------------------------

    /// Detaches the whole tree and closes any version opened during the
    /// request, trimming retained versions to the configured maximum.
    pub fn end_request(&mut self) -> Result<(), EngineError> {
        let root = self.tree.root();
        self.tree.detach(root)?;
        if self.new_version_started {
            self.new_version_started = false;
            if let Some(manager) = self.version_manager.as_mut() {
                manager.end_version(self.merge_version);
                while manager.versions() > self.max_versions {
                    manager.expire_oldest_version();
                }
            }
        }
        self.merge_version = false;
        Ok(())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("numeric_id", &self.numeric_id)
            .field("page_key", &self.page_key)
            .field("components", &self.tree.len())
            .field("version", &self.current_version_number())
            .finish_non_exhaustive()
    }
}

enum HookKind {
    ModelChanging,
    ModelChanged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;
    use crate::markup::{MarkupRegion, MarkupStream, NoMarkup};
    use std::cell::Cell;

    struct FixedMarkup(Vec<MarkupRegion>);

    impl MarkupSource for FixedMarkup {
        fn markup_for_page(&self, _page_key: Option<&str>) -> MarkupStream {
            MarkupStream::new(self.0.clone())
        }
    }

    fn render(page: &mut Page, markup: &dyn MarkupSource) -> Result<String, EngineError> {
        let mut response = Response::new();
        let mut ctx = PageRenderContext {
            auth: &AllowAll,
            markup,
            persister: None,
            response: &mut response,
            component_use_check: true,
        };
        page.render_page(&mut ctx)?;
        Ok(response.body().to_string())
    }

    #[test]
    fn full_render_writes_model_text() {
        let mut page = Page::new(0);
        let root = page.root();
        page.add(
            root,
            Component::new("label")
                .unwrap()
                .with_model(Model::of("a < b".to_string())),
        )
        .unwrap();
        let body = render(&mut page, &NoMarkup).unwrap();
        assert_eq!(body, "a &lt; b");
    }

    #[test]
    fn coverage_check_lists_visible_but_not_invisible_components() {
        let mut page = Page::new(0);
        let root = page.root();
        let a = page.add(root, Component::new("a").unwrap()).unwrap();
        let b = page.add(root, Component::new("b").unwrap()).unwrap();
        page.set_visible(b, false).unwrap();
        let _ = a;

        // Non-empty markup that references neither child: nothing but
        // the page itself renders.
        let markup = FixedMarkup(vec![MarkupRegion {
            component: "unrelated".into(),
            tag: "div".into(),
        }]);
        let err = render(&mut page, &markup).unwrap_err();
        match err {
            EngineError::UnrenderedComponents { report } => {
                assert!(report.contains("0:a"), "report: {report}");
                assert!(!report.contains("0:b"), "report: {report}");
            }
            other => panic!("expected coverage failure, got {other}"),
        }
    }

    #[test]
    fn unused_auto_components_are_pruned_not_reported() {
        let mut page = Page::new(0);
        let root = page.root();
        page.add(root, Component::new("ghost").unwrap().auto())
            .unwrap();
        let markup = FixedMarkup(vec![MarkupRegion {
            component: "unrelated".into(),
            tag: "div".into(),
        }]);
        render(&mut page, &markup).unwrap();
        assert!(page.tree().find("0:ghost").is_none());
    }

    #[test]
    fn unversioned_component_toggle_records_nothing() {
        let mut page = Page::new(0);
        let root = page.root();
        let c = page
            .add(
                root,
                Component::new("c")
                    .unwrap()
                    .with_flag(Flags::VERSIONED, false),
            )
            .unwrap();
        render(&mut page, &NoMarkup).unwrap();
        page.set_visible(c, false).unwrap();
        assert!(!page.has_version_manager());
    }

    #[test]
    fn versioned_toggle_produces_exact_undo() {
        let mut page = Page::new(0);
        let root = page.root();
        let c = page.add(root, Component::new("c").unwrap()).unwrap();
        render(&mut page, &NoMarkup).unwrap();

        page.set_visible(c, false).unwrap();
        page.end_request().unwrap();
        assert_eq!(page.current_version_number(), 1);

        page.go_to_version(0).unwrap();
        assert!(page.tree().get(c).unwrap().is_visible());
        // collapsed back to the pristine representation
        assert!(!page.has_version_manager());
    }

    #[test]
    fn equal_model_object_suppresses_notifications() {
        let changed = std::rc::Rc::new(Cell::new(0usize));
        let counter = std::rc::Rc::clone(&changed);
        let mut page = Page::new(0);
        let root = page.root();
        let c = page
            .add(
                root,
                Component::new("c")
                    .unwrap()
                    .with_model(Model::of(1i64))
                    .on_model_changed(move |_| counter.set(counter.get() + 1)),
            )
            .unwrap();

        assert!(page
            .set_model_object(&AllowAll, c, Box::new(2i64))
            .unwrap());
        assert!(!page
            .set_model_object(&AllowAll, c, Box::new(2i64))
            .unwrap());
        assert_eq!(changed.get(), 1);
    }

    #[test]
    fn missing_model_fails_fast() {
        let mut page = Page::new(0);
        let root = page.root();
        let c = page.add(root, Component::new("c").unwrap()).unwrap();
        let err = page
            .set_model_object(&AllowAll, c, Box::new(1i64))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingModel { .. }));
    }

    #[test]
    fn components_inherit_compound_models_scoped_to_their_name() {
        let mut page = Page::new(0);
        let root = page.root();
        let form = page
            .add(
                root,
                Component::container("form")
                    .unwrap()
                    .with_model(Model::compound()),
            )
            .unwrap();
        let field = page.add(form, Component::new("name").unwrap()).unwrap();

        page.set_model_object(&AllowAll, field, Box::new("ada".to_string()))
            .unwrap();
        let model = page.model(field).unwrap().expect("inherited model");
        assert!(model.object().unwrap().eq_value(&"ada".to_string()));
        // inheriting shares ancestor-owned state, so versioning is off
        assert!(!page.tree().get(field).unwrap().flag(Flags::VERSIONED));
    }

    #[test]
    fn structural_mutation_during_render_is_rejected() {
        let mut page = Page::new(0);
        let root = page.root();
        page.add(root, Component::new("c").unwrap()).unwrap();
        render(&mut page, &NoMarkup).unwrap();

        // simulate the locked phase directly
        page.rendering = true;
        let err = page
            .add(root, Component::new("late").unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::TreeLockedDuringRender { .. }));
        page.rendering = false;
    }

    #[test]
    fn stateless_page_stays_stateless_until_a_version_exists() {
        let mut page = Page::new(0);
        let root = page.root();
        let c = page.add(root, Component::new("c").unwrap()).unwrap();
        assert!(page.is_page_stateless());

        render(&mut page, &NoMarkup).unwrap();
        page.set_visible(c, false).unwrap();
        page.end_request().unwrap();
        page.stateless = None;
        assert!(!page.is_page_stateless());
    }

    #[test]
    fn rollback_across_two_requests_restores_first_mutation() {
        let mut page = Page::new(0);
        let root = page.root();
        let c = page
            .add(
                root,
                Component::new("c").unwrap().with_model(Model::of(0i64)),
            )
            .unwrap();
        render(&mut page, &NoMarkup).unwrap();
        page.end_request().unwrap();

        // request 1
        page.set_model_object(&AllowAll, c, Box::new(1i64)).unwrap();
        page.end_request().unwrap();
        // request 2
        page.set_model_object(&AllowAll, c, Box::new(2i64)).unwrap();
        page.end_request().unwrap();
        assert_eq!(page.current_version_number(), 2);

        page.rollback(1).unwrap();
        let model = page.model(c).unwrap().expect("model");
        assert!(model.object().unwrap().eq_value(&1i64));
    }

    #[test]
    fn debug_output_summarizes_without_dumping_the_tree() {
        let mut page = Page::new(7).with_page_key("demo");
        let root = page.root();
        page.add(root, Component::new("a").unwrap()).unwrap();
        let debug = format!("{page:?}");
        assert!(debug.contains("numeric_id: 7"), "debug: {debug}");
        assert!(debug.contains("demo"), "debug: {debug}");
    }
}
