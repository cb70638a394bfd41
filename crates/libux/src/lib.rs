//! Minimal UI toolkit core.
//!
//! A [`State`] holds a tree of [`Value`]s addressed by dotted paths and
//! notifies subscribers through an [`EventHub`] whenever something changes.
//! [`Template`] compiles `<% %>` micro-templates into a small program that
//! renders markup from such a tree.

pub mod component;
pub mod diff;
pub mod event_hub;
pub mod locale;
pub mod path;
pub mod state;
pub mod template;
pub mod value;

pub use component::{Component, ComponentBuilder, ComponentEvent};
pub use diff::{Diff, clone_at};
pub use event_hub::{
    Dispatch, EventHub, EventNames, Handler, HandlerError, HubEvent, Reply, handler,
};
pub use locale::Locale;
pub use path::PathError;
pub use state::{State, StateBuilder, StateEvent};
pub use template::{Helpers, Template, TemplateCompileError, TemplateSettings};
pub use value::{Map, Value};
