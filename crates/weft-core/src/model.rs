//! Models: wrappers around backing values with detach and lazy-fetch
//! support, plus the compound/inherited model machinery components use
//! to share state with an ancestor.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use hashbrown::HashSet;

use crate::error::EngineError;

/// Object-safe view over a model's backing value. Blanket-implemented
/// for any plain value type, so user code stores `String`, `i64` and
/// friends directly.
pub trait ModelValue: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn ModelValue) -> bool;
    fn clone_value(&self) -> Box<dyn ModelValue>;
    fn render_text(&self) -> String;
}

impl<T> ModelValue for T
where
    T: Any + PartialEq + Clone + fmt::Debug + fmt::Display,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn ModelValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |o| self == o)
    }

    fn clone_value(&self) -> Box<dyn ModelValue> {
        Box::new(self.clone())
    }

    fn render_text(&self) -> String {
        self.to_string()
    }
}

type Loader = Box<dyn Fn() -> Box<dyn ModelValue>>;

enum ModelKind {
    /// A plain value slot, optionally backed by a loader that refetches
    /// the value after a detach.
    Basic { loader: Option<Loader> },
    /// A name-keyed slot map. Inheritable: descendants without a model
    /// of their own resolve to a wrapper scoped to their name.
    Compound {
        slots: RefCell<AHashMap<String, Box<dyn ModelValue>>>,
    },
    /// A view onto a compound ancestor model, scoped to one component.
    Wrapper { property: String },
}

struct ModelInner {
    kind: ModelKind,
    value: RefCell<Option<Box<dyn ModelValue>>>,
    nested: RefCell<Option<Model>>,
}

/// Shared handle to a model. Cloning shares the backing state.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    pub fn of(value: impl ModelValue) -> Self {
        let model = Model::empty();
        *model.inner.value.borrow_mut() = Some(Box::new(value));
        model
    }

    pub fn empty() -> Self {
        Model {
            inner: Rc::new(ModelInner {
                kind: ModelKind::Basic { loader: None },
                value: RefCell::new(None),
                nested: RefCell::new(None),
            }),
        }
    }

    /// A model that lazily fetches its value and drops the cached copy
    /// on detach.
    pub fn loadable(loader: impl Fn() -> Box<dyn ModelValue> + 'static) -> Self {
        Model {
            inner: Rc::new(ModelInner {
                kind: ModelKind::Basic {
                    loader: Some(Box::new(loader)),
                },
                value: RefCell::new(None),
                nested: RefCell::new(None),
            }),
        }
    }

    /// An inheritable model holding one slot per component name.
    pub fn compound() -> Self {
        Model {
            inner: Rc::new(ModelInner {
                kind: ModelKind::Compound {
                    slots: RefCell::new(AHashMap::new()),
                },
                value: RefCell::new(None),
                nested: RefCell::new(None),
            }),
        }
    }

    /// Wraps an inheritable model into a view scoped to `property`.
    pub fn wrap_for(&self, property: impl Into<String>) -> Model {
        let wrapper = Model {
            inner: Rc::new(ModelInner {
                kind: ModelKind::Wrapper {
                    property: property.into(),
                },
                value: RefCell::new(None),
                nested: RefCell::new(None),
            }),
        };
        *wrapper.inner.nested.borrow_mut() = Some(self.clone());
        wrapper
    }

    pub fn is_inheritable(&self) -> bool {
        matches!(self.inner.kind, ModelKind::Compound { .. })
    }

    pub fn object(&self) -> Option<Box<dyn ModelValue>> {
        match &self.inner.kind {
            ModelKind::Basic { loader } => {
                if self.inner.value.borrow().is_none() {
                    if let Some(loader) = loader {
                        *self.inner.value.borrow_mut() = Some(loader());
                    }
                }
                self.inner
                    .value
                    .borrow()
                    .as_ref()
                    .map(|v| v.clone_value())
            }
            ModelKind::Compound { .. } => self
                .inner
                .value
                .borrow()
                .as_ref()
                .map(|v| v.clone_value()),
            ModelKind::Wrapper { property } => {
                let nested = self.inner.nested.borrow();
                let nested = nested.as_ref()?;
                match &nested.inner.kind {
                    ModelKind::Compound { slots } => slots
                        .borrow()
                        .get(property)
                        .map(|v| v.clone_value()),
                    _ => nested.object(),
                }
            }
        }
    }

    pub fn set_object(&self, value: Box<dyn ModelValue>) {
        match &self.inner.kind {
            ModelKind::Basic { .. } | ModelKind::Compound { .. } => {
                *self.inner.value.borrow_mut() = Some(value);
            }
            ModelKind::Wrapper { property } => {
                let nested = self.inner.nested.borrow();
                if let Some(nested) = nested.as_ref() {
                    if let ModelKind::Compound { slots } = &nested.inner.kind {
                        slots.borrow_mut().insert(property.clone(), value);
                    } else {
                        nested.set_object(value);
                    }
                }
            }
        }
    }

    pub fn clear_object(&self) {
        *self.inner.value.borrow_mut() = None;
    }

    pub fn nested(&self) -> Option<Model> {
        self.inner.nested.borrow().clone()
    }

    /// Drops any lazily-fetched value and detaches nested models. The
    /// nested walk carries a visited set, matching `root_model`.
    pub fn detach(&self) {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut current = self.clone();
        loop {
            if !seen.insert(Rc::as_ptr(&current.inner) as usize) {
                return;
            }
            if let ModelKind::Basic { loader: Some(_) } = &current.inner.kind {
                current.inner.value.borrow_mut().take();
            }
            match current.nested() {
                Some(next) => current = next,
                None => return,
            }
        }
    }

    /// Unwraps the nested-model chain to the root. The walk is bounded
    /// by a visited set so a self-referential chain surfaces as
    /// `ModelCycle` instead of looping forever.
    pub fn root_model(&self) -> Result<Model, EngineError> {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut current = self.clone();
        loop {
            let addr = Rc::as_ptr(&current.inner) as usize;
            if !seen.insert(addr) {
                return Err(EngineError::ModelCycle);
            }
            match current.nested() {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
    }

    /// Whether two models ultimately share the same backing state.
    pub fn shares_root(&self, other: &Model) -> Result<bool, EngineError> {
        let a = self.root_model()?;
        let b = other.root_model()?;
        Ok(Rc::ptr_eq(&a.inner, &b.inner))
    }

    pub(crate) fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    pub(crate) fn set_nested_for_test(&self, nested: Model) {
        *self.inner.nested.borrow_mut() = Some(nested);
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.kind {
            ModelKind::Basic { .. } => "Basic",
            ModelKind::Compound { .. } => "Compound",
            ModelKind::Wrapper { .. } => "Wrapper",
        };
        write!(f, "Model({kind}, {:?})", self.inner.value.borrow())
    }
}

/// Decides whether a new model object differs from the current one.
pub trait ModelComparator {
    fn equal(&self, current: Option<&dyn ModelValue>, candidate: Option<&dyn ModelValue>) -> bool;
}

/// Null-aware value equality.
pub struct DefaultComparator;

impl ModelComparator for DefaultComparator {
    fn equal(&self, current: Option<&dyn ModelValue>, candidate: Option<&dyn ModelValue>) -> bool {
        match (current, candidate) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_value(b),
            _ => false,
        }
    }
}
