//! Components: named nodes in the page tree with a model, state flags
//! and lifecycle hooks, plus the slab arena that owns them.
//!
//! Lifecycle hooks are supplied as closures and bracketed by the
//! framework's own pre/post steps, so user code cannot skip the base
//! behavior the way a broken super-call chain could.

use std::fmt;

use hashbrown::HashSet;

use crate::behavior::Behavior;
use crate::cycle::{CycleControl, RequestCycle};
use crate::error::EngineError;
use crate::markup::{escape_html, MarkupStream};
use crate::model::Model;
use crate::model::ModelComparator;
use crate::request::Response;

pub const PATH_SEPARATOR: char = ':';

/// Arena index of a component within its page's tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentId(pub(crate) usize);

/// Component state flags with bitset semantics.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    pub const VISIBLE: Flags = Flags(1 << 0);
    pub const ENABLED: Flags = Flags(1 << 1);
    pub const VERSIONED: Flags = Flags(1 << 2);
    pub const ESCAPE_MODEL_STRINGS: Flags = Flags(1 << 3);
    pub const RENDER_ALLOWED: Flags = Flags(1 << 4);
    pub const RENDERED_ONCE: Flags = Flags(1 << 5);
    pub const ATTACHED: Flags = Flags(1 << 6);
    pub const AUTO: Flags = Flags(1 << 7);
    pub const OUTPUT_MARKUP_ID: Flags = Flags(1 << 8);
    pub const RENDER_BODY_ONLY: Flags = Flags(1 << 9);
    pub const PLACEHOLDER: Flags = Flags(1 << 10);
    pub const STATELESS_HINT: Flags = Flags(1 << 11);

    pub fn defaults() -> Flags {
        Flags(
            Flags::VISIBLE.0
                | Flags::ENABLED.0
                | Flags::VERSIONED.0
                | Flags::ESCAPE_MODEL_STRINGS.0
                | Flags::RENDER_ALLOWED.0
                | Flags::STATELESS_HINT.0,
        )
    }

    #[inline]
    pub fn get(self, flag: Flags) -> bool {
        self.0 & flag.0 != 0
    }

    #[inline]
    pub fn set(&mut self, flag: Flags, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#x})", self.0)
    }
}

/// Role-specific dispatch replaces a deep inheritance hierarchy: the
/// role decides whether children render and how the default body
/// behaves.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Page,
    Container,
    Leaf,
    FormParticipant,
}

impl Role {
    pub fn renders_children(self) -> bool {
        matches!(self, Role::Page | Role::Container)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Page => write!(f, "Page"),
            Role::Container => write!(f, "Container"),
            Role::Leaf => write!(f, "Leaf"),
            Role::FormParticipant => write!(f, "FormParticipant"),
        }
    }
}

/// Hook scope handed to a render-body closure.
pub struct RenderScope<'a> {
    pub response: &'a mut Response,
    pub markup: &'a mut MarkupStream,
}

pub type LifecycleHook = Box<dyn FnMut(&mut Component)>;
pub type FallibleHook = Box<dyn FnMut(&mut Component) -> Result<(), EngineError>>;
pub type RenderHook =
    Box<dyn FnMut(&mut Component, &mut RenderScope<'_>) -> Result<(), EngineError>>;
pub type EventHook =
    Box<dyn FnMut(&mut RequestCycle<'_>, ComponentId) -> Result<CycleControl, EngineError>>;
pub type StatelessHint = Box<dyn Fn(&Component) -> bool>;

/// User-supplied lifecycle closures, all optional.
#[derive(Default)]
pub struct Hooks {
    pub on_attach: Option<LifecycleHook>,
    pub on_detach: Option<LifecycleHook>,
    pub on_before_render: Option<FallibleHook>,
    pub render_body: Option<RenderHook>,
    pub on_model_changing: Option<LifecycleHook>,
    pub on_model_changed: Option<LifecycleHook>,
    pub prepare_feedback: Option<LifecycleHook>,
    pub on_event: Option<EventHook>,
    pub stateless_hint: Option<StatelessHint>,
}

pub struct Component {
    name: String,
    id: ComponentId,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    role: Role,
    flags: Flags,
    markup_id: Option<String>,
    model: Option<Model>,
    behaviors: Option<Vec<Box<dyn Behavior>>>,
    comparator: Option<Box<dyn ModelComparator>>,
    hooks: Hooks,
}

impl Component {
    /// A leaf component. The name is immutable and must be non-empty.
    pub fn new(name: impl Into<String>) -> Result<Component, EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::EmptyComponentName);
        }
        Ok(Component {
            name,
            id: ComponentId(usize::MAX),
            parent: None,
            children: Vec::new(),
            role: Role::Leaf,
            flags: Flags::defaults(),
            markup_id: None,
            model: None,
            behaviors: None,
            comparator: None,
            hooks: Hooks::default(),
        })
    }

    pub fn container(name: impl Into<String>) -> Result<Component, EngineError> {
        Component::new(name).map(|c| c.with_role(Role::Container))
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Marks the component as framework-internal: excluded from
    /// versioning and from full-coverage enforcement, and allowed to
    /// join the tree during the render phase.
    pub fn auto(mut self) -> Self {
        self.flags.set(Flags::AUTO, true);
        self.flags.set(Flags::VERSIONED, false);
        self
    }

    pub fn with_flag(mut self, flag: Flags, on: bool) -> Self {
        self.flags.set(flag, on);
        self
    }

    pub fn with_comparator(mut self, comparator: impl ModelComparator + 'static) -> Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    pub fn on_attach(mut self, hook: impl FnMut(&mut Component) + 'static) -> Self {
        self.hooks.on_attach = Some(Box::new(hook));
        self
    }

    pub fn on_detach(mut self, hook: impl FnMut(&mut Component) + 'static) -> Self {
        self.hooks.on_detach = Some(Box::new(hook));
        self
    }

    pub fn on_before_render(
        mut self,
        hook: impl FnMut(&mut Component) -> Result<(), EngineError> + 'static,
    ) -> Self {
        self.hooks.on_before_render = Some(Box::new(hook));
        self
    }

    pub fn render_with(
        mut self,
        hook: impl FnMut(&mut Component, &mut RenderScope<'_>) -> Result<(), EngineError> + 'static,
    ) -> Self {
        self.hooks.render_body = Some(Box::new(hook));
        self
    }

    pub fn on_event(
        mut self,
        hook: impl FnMut(&mut RequestCycle<'_>, ComponentId) -> Result<CycleControl, EngineError>
            + 'static,
    ) -> Self {
        self.hooks.on_event = Some(Box::new(hook));
        self
    }

    pub fn on_model_changed(mut self, hook: impl FnMut(&mut Component) + 'static) -> Self {
        self.hooks.on_model_changed = Some(Box::new(hook));
        self
    }

    pub fn on_model_changing(mut self, hook: impl FnMut(&mut Component) + 'static) -> Self {
        self.hooks.on_model_changing = Some(Box::new(hook));
        self
    }

    pub fn prepare_feedback_with(mut self, hook: impl FnMut(&mut Component) + 'static) -> Self {
        self.hooks.prepare_feedback = Some(Box::new(hook));
        self
    }

    pub fn stateless_hint_with(mut self, hook: impl Fn(&Component) -> bool + 'static) -> Self {
        self.hooks.stateless_hint = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn flag(&self, flag: Flags) -> bool {
        self.flags.get(flag)
    }

    pub(crate) fn set_flag(&mut self, flag: Flags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn is_visible(&self) -> bool {
        self.flags.get(Flags::VISIBLE)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.get(Flags::ENABLED)
    }

    pub fn is_auto(&self) -> bool {
        self.flags.get(Flags::AUTO)
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub(crate) fn set_model_raw(&mut self, model: Option<Model>) {
        self.model = model;
    }

    pub fn markup_id(&self) -> Option<&str> {
        self.markup_id.as_deref()
    }

    pub fn set_markup_id(&mut self, markup_id: impl Into<String>) {
        self.markup_id = Some(markup_id.into());
    }

    pub fn add_behavior(&mut self, mut behavior: Box<dyn Behavior>) {
        behavior.bind(self);
        self.behaviors.get_or_insert_with(Vec::new).push(behavior);
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.as_ref().map_or(0, Vec::len)
    }

    /// Effective stateless hint: the hook wins over the flag.
    pub fn stateless_hint(&self) -> bool {
        match &self.hooks.stateless_hint {
            Some(hint) => hint(self),
            None => self.flags.get(Flags::STATELESS_HINT),
        }
    }

    pub(crate) fn comparator(&self) -> Option<&dyn ModelComparator> {
        self.comparator.as_deref()
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    pub(crate) fn take_behaviors(&mut self) -> Vec<Box<dyn Behavior>> {
        self.behaviors.take().unwrap_or_default()
    }

    pub(crate) fn restore_behaviors(&mut self, behaviors: Vec<Box<dyn Behavior>>) {
        if !behaviors.is_empty() {
            self.behaviors = Some(behaviors);
        }
    }
}

/// A subtree physically removed from the arena, preserving structure so
/// an undo can reinsert it.
pub struct DetachedComponent {
    pub component: Component,
    pub children: Vec<DetachedComponent>,
}

/// Slab arena owning a page's component tree. Ownership is top-down
/// from the root; ids are slot indices and may be reused after removal.
pub struct ComponentTree {
    slots: Vec<Option<Component>>,
    free: Vec<usize>,
    root: ComponentId,
}

impl ComponentTree {
    pub fn new(mut root: Component) -> Self {
        root.id = ComponentId(0);
        ComponentTree {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: ComponentId(0),
        }
    }

    pub fn root(&self) -> ComponentId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ComponentId) -> Result<&Component, EngineError> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(EngineError::MissingComponent {
                path: format!("#{}", id.0),
            })
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Result<&mut Component, EngineError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EngineError::MissingComponent {
                path: format!("#{}", id.0),
            })
    }

    fn allocate(&mut self, mut component: Component) -> ComponentId {
        match self.free.pop() {
            Some(index) => {
                component.id = ComponentId(index);
                self.slots[index] = Some(component);
                ComponentId(index)
            }
            None => {
                let index = self.slots.len();
                component.id = ComponentId(index);
                self.slots.push(Some(component));
                ComponentId(index)
            }
        }
    }

    /// Adds a child under `parent`. When `locked` (the page is in its
    /// render phase) only auto components may join the tree.
    pub fn insert(
        &mut self,
        parent: ComponentId,
        component: Component,
        locked: bool,
    ) -> Result<ComponentId, EngineError> {
        self.insert_at(parent, usize::MAX, component, locked)
    }

    pub fn insert_at(
        &mut self,
        parent: ComponentId,
        index: usize,
        component: Component,
        locked: bool,
    ) -> Result<ComponentId, EngineError> {
        if locked && !component.flags.get(Flags::AUTO) {
            return Err(EngineError::TreeLockedDuringRender {
                path: self.path(parent),
            });
        }
        {
            let parent_component = self.get(parent)?;
            if parent_component
                .children
                .iter()
                .any(|c| self.get(*c).map(|c| c.name == component.name).unwrap_or(false))
            {
                return Err(EngineError::DuplicateChildName {
                    parent: self.path(parent),
                    name: component.name,
                });
            }
        }
        let mut component = component;
        component.parent = Some(parent);
        let id = self.allocate(component);
        let parent_component = self.get_mut(parent)?;
        let at = index.min(parent_component.children.len());
        parent_component.children.insert(at, id);
        Ok(id)
    }

    /// Physically removes a subtree, returning its position in the
    /// parent and the detached structure.
    pub fn remove(
        &mut self,
        id: ComponentId,
        locked: bool,
    ) -> Result<(ComponentId, usize, DetachedComponent), EngineError> {
        if id == self.root {
            return Err(EngineError::custom("cannot remove the page root"));
        }
        if locked && !self.get(id)?.flags.get(Flags::AUTO) {
            return Err(EngineError::TreeLockedDuringRender {
                path: self.path(id),
            });
        }
        let parent = self
            .get(id)?
            .parent
            .ok_or_else(|| EngineError::MissingComponent {
                path: self.path(id),
            })?;
        let index = {
            let parent_component = self.get(parent)?;
            parent_component
                .children
                .iter()
                .position(|c| *c == id)
                .ok_or_else(|| EngineError::MissingComponent {
                    path: self.path(id),
                })?
        };
        self.get_mut(parent)?.children.remove(index);
        let detached = self.take_subtree(id)?;
        Ok((parent, index, detached))
    }

    fn take_subtree(&mut self, id: ComponentId) -> Result<DetachedComponent, EngineError> {
        let mut component =
            self.slots
                .get_mut(id.0)
                .and_then(Option::take)
                .ok_or(EngineError::MissingComponent {
                    path: format!("#{}", id.0),
                })?;
        self.free.push(id.0);
        let child_ids = std::mem::take(&mut component.children);
        component.parent = None;
        let mut children = Vec::with_capacity(child_ids.len());
        for child in child_ids {
            children.push(self.take_subtree(child)?);
        }
        Ok(DetachedComponent {
            component,
            children,
        })
    }

    /// Reinserts a previously removed subtree at its old position.
    pub fn insert_detached(
        &mut self,
        parent: ComponentId,
        index: usize,
        detached: DetachedComponent,
    ) -> Result<ComponentId, EngineError> {
        let DetachedComponent {
            component,
            children,
        } = detached;
        let id = self.insert_at(parent, index, component, false)?;
        for child in children {
            self.insert_detached(id, usize::MAX, child)?;
        }
        Ok(id)
    }

    /// Dot-free colon path from the root; the root segment is the
    /// page's session-relative numeric id.
    pub fn path(&self, id: ComponentId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            match self.get(c) {
                Ok(component) => {
                    segments.push(component.name.clone());
                    current = component.parent;
                }
                Err(_) => break,
            }
        }
        segments.reverse();
        segments.join(&PATH_SEPARATOR.to_string())
    }

    pub fn find(&self, path: &str) -> Option<ComponentId> {
        let mut segments = path.split(PATH_SEPARATOR);
        let root_name = segments.next()?;
        if self.get(self.root).ok()?.name != root_name {
            return None;
        }
        let mut current = self.root;
        for segment in segments {
            let component = self.get(current).ok()?;
            current = *component.children.iter().find(|c| {
                self.get(**c)
                    .map(|child| child.name == segment)
                    .unwrap_or(false)
            })?;
        }
        Some(current)
    }

    /// Preorder ids of the subtree rooted at `from`, excluding `from`.
    pub fn descendant_ids(&self, from: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack: Vec<ComponentId> = match self.get(from) {
            Ok(c) => c.children.iter().rev().copied().collect(),
            Err(_) => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Ok(component) = self.get(id) {
                stack.extend(component.children.iter().rev().copied());
            }
        }
        out
    }

    /// True only if the component and every ancestor are simultaneously
    /// render-allowed and visible.
    pub fn is_visible_in_hierarchy(&self, id: ComponentId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            match self.get(c) {
                Ok(component) => {
                    if !component.flags.get(Flags::RENDER_ALLOWED)
                        || !component.flags.get(Flags::VISIBLE)
                    {
                        return false;
                    }
                    current = component.parent;
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// Versioned only once rendered, and any unversioned ancestor
    /// vetoes the whole subtree.
    pub fn is_versioned(&self, id: ComponentId) -> bool {
        let component = match self.get(id) {
            Ok(c) => c,
            Err(_) => return false,
        };
        if !component.flags.get(Flags::VERSIONED) || !component.flags.get(Flags::RENDERED_ONCE) {
            return false;
        }
        let mut current = component.parent;
        while let Some(c) = current {
            match self.get(c) {
                Ok(ancestor) => {
                    if !ancestor.flags.get(Flags::VERSIONED) {
                        return false;
                    }
                    current = ancestor.parent;
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// Attaches the subtree. Idempotent per request: an attached
    /// component's hook is not re-run.
    pub fn attach(&mut self, id: ComponentId) -> Result<(), EngineError> {
        {
            let component = self.get_mut(id)?;
            if !component.flags.get(Flags::ATTACHED) {
                component.flags.set(Flags::ATTACHED, true);
                let hook = component.hooks.on_attach.take();
                if let Some(mut hook) = hook {
                    hook(self.get_mut(id)?);
                    self.get_mut(id)?.hooks.on_attach = Some(hook);
                }
            }
        }
        for child in self.get(id)?.children.clone() {
            self.attach(child)?;
        }
        Ok(())
    }

    /// Detaches the subtree. Always runs: the hook fires, the model and
    /// behaviors are detached, then children, regardless of whether the
    /// component was ever attached.
    pub fn detach(&mut self, id: ComponentId) -> Result<(), EngineError> {
        {
            let hook = self.get_mut(id)?.hooks.on_detach.take();
            if let Some(mut hook) = hook {
                hook(self.get_mut(id)?);
                self.get_mut(id)?.hooks.on_detach = Some(hook);
            }
            let component = self.get_mut(id)?;
            component.flags.set(Flags::ATTACHED, false);
            if let Some(model) = &component.model {
                model.detach();
            }
            let mut behaviors = component.take_behaviors();
            for behavior in behaviors.iter_mut() {
                behavior.detach(self.get_mut(id)?);
            }
            behaviors.retain(|b| !b.is_temporary());
            self.get_mut(id)?.restore_behaviors(behaviors);
        }
        for child in self.get(id)?.children.clone() {
            self.detach(child)?;
        }
        Ok(())
    }
}

/// Mutable state threaded through one render pass.
pub(crate) struct RenderPass<'a> {
    pub response: &'a mut Response,
    pub markup: &'a mut MarkupStream,
    pub rendered: &'a mut HashSet<ComponentId>,
    pub auto_index: &'a mut u32,
}

fn ensure_markup_id(
    tree: &mut ComponentTree,
    id: ComponentId,
    auto_index: &mut u32,
    force: bool,
) -> Result<Option<String>, EngineError> {
    let component = tree.get_mut(id)?;
    if let Some(existing) = &component.markup_id {
        return Ok(Some(existing.clone()));
    }
    if force || component.flags.get(Flags::OUTPUT_MARKUP_ID) {
        let generated = format!("{}{}", component.name, *auto_index);
        *auto_index += 1;
        component.markup_id = Some(generated.clone());
        return Ok(Some(generated));
    }
    Ok(None)
}

fn default_body(
    tree: &mut ComponentTree,
    id: ComponentId,
    pass: &mut RenderPass<'_>,
) -> Result<(), EngineError> {
    let component = tree.get(id)?;
    if component.role.renders_children() {
        return Ok(());
    }
    if let Some(model) = component.model() {
        if let Some(object) = model.object() {
            let text = object.render_text();
            let escape = component.flags.get(Flags::ESCAPE_MODEL_STRINGS);
            let text = if escape { escape_html(&text) } else { text };
            pass.response.write(&text);
        }
    }
    Ok(())
}

fn run_body(
    tree: &mut ComponentTree,
    id: ComponentId,
    pass: &mut RenderPass<'_>,
) -> Result<(), EngineError> {
    let hook = tree.get_mut(id)?.hooks.render_body.take();
    match hook {
        Some(mut hook) => {
            let result = {
                let mut scope = RenderScope {
                    response: &mut *pass.response,
                    markup: &mut *pass.markup,
                };
                hook(tree.get_mut(id)?, &mut scope)
            };
            tree.get_mut(id)?.hooks.render_body = Some(hook);
            result
        }
        None => default_body(tree, id, pass),
    }
}

/// Renders one component and, for container roles, its children. The
/// after-render bracket runs even when the body fails, and behaviors
/// get an isolated chance to react to a failing render before the
/// original fault is re-raised.
pub(crate) fn render_component(
    tree: &mut ComponentTree,
    id: ComponentId,
    pass: &mut RenderPass<'_>,
) -> Result<(), EngineError> {
    let (visible, placeholder, render_body_only, name) = {
        let component = tree.get_mut(id)?;
        component.flags.set(Flags::RENDERED_ONCE, true);
        (
            component.flags.get(Flags::RENDER_ALLOWED) && component.flags.get(Flags::VISIBLE),
            component.flags.get(Flags::PLACEHOLDER),
            component.flags.get(Flags::RENDER_BODY_ONLY),
            component.name.clone(),
        )
    };

    if !visible {
        if placeholder {
            let markup_id = ensure_markup_id(tree, id, pass.auto_index, true)?
                .unwrap_or_else(|| name.clone());
            pass.markup
                .write_placeholder(&name, &markup_id, pass.response);
        } else {
            pass.markup.skip_component();
        }
        return Ok(());
    }

    let markup_id = ensure_markup_id(tree, id, pass.auto_index, false)?;
    let region = pass.markup.region_for(&name).cloned();
    let write_tag = region.is_some() && !render_body_only;
    if write_tag {
        if let Some(region) = &region {
            match &markup_id {
                Some(markup_id) => pass
                    .response
                    .write(&format!("<{} id=\"{}\">", region.tag, markup_id)),
                None => pass.response.write(&format!("<{}>", region.tag)),
            }
        }
    }

    let mut behaviors = tree.get_mut(id)?.take_behaviors();

    let mut outcome: Result<(), EngineError> = Ok(());
    for behavior in behaviors.iter_mut() {
        if let Err(e) = behavior.before_render(tree.get_mut(id)?) {
            outcome = Err(e);
            break;
        }
    }
    if outcome.is_ok() {
        let hook = tree.get_mut(id)?.hooks.on_before_render.take();
        if let Some(mut hook) = hook {
            outcome = hook(tree.get_mut(id)?);
            tree.get_mut(id)?.hooks.on_before_render = Some(hook);
        }
    }

    if outcome.is_ok() {
        outcome = run_body(tree, id, pass);
    }

    if outcome.is_ok() && tree.get(id)?.role.renders_children() {
        for child in tree.get(id)?.children.clone() {
            // A child absent from a non-empty markup document does not
            // render; the page's coverage check reports it afterwards.
            let referenced = {
                let child_name = tree.get(child)?.name.clone();
                pass.markup.references(&child_name)
            };
            if !referenced {
                continue;
            }
            if let Err(e) = render_component(tree, child, pass) {
                outcome = Err(e);
                break;
            }
        }
    }

    // The after-render bracket always runs; a fault here only wins when
    // the body itself succeeded.
    for behavior in behaviors.iter_mut() {
        match behavior.after_render(tree.get_mut(id)?) {
            Ok(()) => {}
            Err(e) if outcome.is_ok() => outcome = Err(e),
            Err(e) => log::error!("after-render fault on {} suppressed: {e}", name),
        }
    }

    if region.is_some() {
        if write_tag && outcome.is_ok() {
            if let Some(region) = &region {
                pass.response.write(&format!("</{}>", region.tag));
            }
        }
        pass.markup.skip_component();
    }

    match outcome {
        Ok(()) => {
            for behavior in behaviors.iter_mut() {
                behavior.rendered(tree.get_mut(id)?);
            }
            tree.get_mut(id)?.restore_behaviors(behaviors);
            if !pass.rendered.insert(id) {
                log::debug!("component {name} rendered more than once in this pass");
            }
            Ok(())
        }
        Err(error) => {
            for behavior in behaviors.iter_mut() {
                if let Err(e) = behavior.on_exception(tree.get_mut(id)?, &error) {
                    log::error!("behavior exception hook on {name} failed: {e}");
                }
            }
            tree.get_mut(id)?.restore_behaviors(behaviors);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn tree_with_branch() -> (ComponentTree, ComponentId, ComponentId) {
        let mut tree = ComponentTree::new(
            Component::new("0").unwrap().with_role(Role::Page),
        );
        let root = tree.root();
        let form = tree
            .insert(root, Component::container("form").unwrap(), false)
            .unwrap();
        let field = tree
            .insert(form, Component::new("field").unwrap(), false)
            .unwrap();
        (tree, form, field)
    }

    #[test]
    fn path_joins_names_root_first() {
        let (tree, form, field) = tree_with_branch();
        assert_eq!(tree.path(field), "0:form:field");
        assert_eq!(tree.path(form), "0:form");
        assert_eq!(tree.find("0:form:field"), Some(field));
        assert_eq!(tree.find("0:nope"), None);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            Component::new(""),
            Err(EngineError::EmptyComponentName)
        ));
    }

    #[test]
    fn duplicate_sibling_names_are_rejected() {
        let (mut tree, form, _) = tree_with_branch();
        let err = tree
            .insert(form, Component::new("field").unwrap(), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateChildName { .. }));
    }

    #[test]
    fn locked_tree_rejects_non_auto_children() {
        let (mut tree, form, _) = tree_with_branch();
        let err = tree
            .insert(form, Component::new("late").unwrap(), true)
            .unwrap_err();
        assert!(matches!(err, EngineError::TreeLockedDuringRender { .. }));
        // auto components may still join mid-render
        assert!(tree
            .insert(form, Component::new("auto1").unwrap().auto(), true)
            .is_ok());
    }

    #[test]
    fn attach_is_idempotent_detach_always_runs() {
        let attaches = Rc::new(Cell::new(0usize));
        let detaches = Rc::new(Cell::new(0usize));
        let (a, d) = (Rc::clone(&attaches), Rc::clone(&detaches));

        let mut tree = ComponentTree::new(
            Component::new("0").unwrap().with_role(Role::Page),
        );
        let root = tree.root();
        let id = tree
            .insert(
                root,
                Component::new("c")
                    .unwrap()
                    .on_attach(move |_| a.set(a.get() + 1))
                    .on_detach(move |_| d.set(d.get() + 1)),
                false,
            )
            .unwrap();

        tree.attach(root).unwrap();
        tree.attach(root).unwrap();
        assert_eq!(attaches.get(), 1);

        tree.detach(root).unwrap();
        tree.detach(root).unwrap();
        assert_eq!(detaches.get(), 2);
        assert!(!tree.get(id).unwrap().flag(Flags::ATTACHED));

        // a fresh request attaches again
        tree.attach(root).unwrap();
        assert_eq!(attaches.get(), 2);
    }

    #[test]
    fn detach_detaches_loadable_models() {
        let loads = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&loads);
        let model = Model::loadable(move || {
            counter.set(counter.get() + 1);
            Box::new(1i64)
        });
        let mut tree = ComponentTree::new(
            Component::new("0").unwrap().with_role(Role::Page),
        );
        let root = tree.root();
        tree.insert(
            root,
            Component::new("c").unwrap().with_model(model.clone()),
            false,
        )
        .unwrap();
        model.object();
        assert_eq!(loads.get(), 1);
        tree.detach(root).unwrap();
        model.object();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn visibility_in_hierarchy_short_circuits_on_ancestors() {
        let (mut tree, form, field) = tree_with_branch();
        assert!(tree.is_visible_in_hierarchy(field));
        tree.get_mut(form)
            .unwrap()
            .set_flag(Flags::VISIBLE, false);
        assert!(!tree.is_visible_in_hierarchy(field));
        tree.get_mut(form).unwrap().set_flag(Flags::VISIBLE, true);
        tree.get_mut(form)
            .unwrap()
            .set_flag(Flags::RENDER_ALLOWED, false);
        assert!(!tree.is_visible_in_hierarchy(field));
    }

    #[test]
    fn unversioned_ancestor_vetoes_descendants() {
        let (mut tree, form, field) = tree_with_branch();
        tree.get_mut(field)
            .unwrap()
            .set_flag(Flags::RENDERED_ONCE, true);
        assert!(tree.is_versioned(field));
        tree.get_mut(form)
            .unwrap()
            .set_flag(Flags::VERSIONED, false);
        assert!(!tree.is_versioned(field));
    }

    #[test]
    fn removed_subtree_can_be_reinserted() {
        let (mut tree, form, field) = tree_with_branch();
        let (parent, index, detached) = tree.remove(form, false).unwrap();
        assert!(tree.get(field).is_err());
        let form_again = tree.insert_detached(parent, index, detached).unwrap();
        assert_eq!(tree.path(form_again), "0:form");
        assert!(tree.find("0:form:field").is_some());
    }
}
