#![doc = r"Core engine for the Weft server-side component framework: the
component tree, page versioning and the request-cycle state machine."]

pub mod application;
pub mod auth;
pub mod behavior;
pub mod component;
pub mod cycle;
pub mod error;
pub mod markup;
pub mod model;
pub mod page;
pub mod processor;
pub mod request;
pub mod session;
pub mod target;
pub mod version;

pub use application::{Application, PageFactory, Settings};
pub use auth::{Action, AllowAll, AuthorizationStrategy};
pub use behavior::Behavior;
pub use component::{
    Component, ComponentId, ComponentTree, Flags, RenderScope, Role, PATH_SEPARATOR,
};
pub use cycle::{CycleControl, RequestCycle, Step, StepResult};
pub use error::EngineError;
pub use markup::{escape_html, MarkupRegion, MarkupSource, MarkupStream, NoMarkup};
pub use model::{DefaultComparator, Model, ModelComparator, ModelValue};
pub use page::{Page, PageRenderContext, ValuePersister};
pub use processor::{DefaultProcessor, RequestProcessor, Resolution};
pub use request::{Cookie, Request, Response};
pub use session::{
    EvictionStrategy, FeedbackLevel, FeedbackMessage, LeastRecentlyUsedEviction, PageMap,
    Session, DEFAULT_PAGE_MAP,
};
pub use target::{
    BookmarkablePageTarget, DetachedPageTarget, PageTarget, RedirectTarget, RequestTarget,
};
pub use version::{Change, UndoVersionManager, VersionManager};
