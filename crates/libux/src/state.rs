//! Observable, path-addressed state container.
//!
//! A `State` exclusively owns one root `Value` and one parameter bag. Every
//! mutation goes through the methods below and is announced on the
//! container's own `EventHub` with the path and the new and old values.

use crate::diff::{self, Diff};
use crate::event_hub::{Dispatch, EventHub, EventNames, Handler, HubEvent};
use crate::path::{self, PathError};
use crate::value::Value;
use serde::{Serialize, Serializer};

/// Change notifications emitted by a `State`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// A path was overwritten. The empty path means the whole root was replaced.
    Updated {
        path: String,
        new: Value,
        old: Option<Value>,
    },
    Added { path: String, new: Value },
    Deleted { path: String, old: Option<Value> },
    /// The parameter bag was replaced.
    Changed { new: Value, old: Value },
}

impl StateEvent {
    pub const UPDATED: &'static str = "updated";
    pub const ADDED: &'static str = "added";
    pub const DELETED: &'static str = "deleted";
    pub const CHANGED: &'static str = "changed";

    /// `None` for `Changed`, which is not tied to a path.
    pub fn path(&self) -> Option<&str> {
        match self {
            StateEvent::Updated { path, .. }
            | StateEvent::Added { path, .. }
            | StateEvent::Deleted { path, .. } => Some(path),
            StateEvent::Changed { .. } => None,
        }
    }

    pub fn new_value(&self) -> Option<&Value> {
        match self {
            StateEvent::Updated { new, .. }
            | StateEvent::Added { new, .. }
            | StateEvent::Changed { new, .. } => Some(new),
            StateEvent::Deleted { .. } => None,
        }
    }

    pub fn old_value(&self) -> Option<&Value> {
        match self {
            StateEvent::Updated { old, .. } | StateEvent::Deleted { old, .. } => old.as_ref(),
            StateEvent::Changed { old, .. } => Some(old),
            StateEvent::Added { .. } => None,
        }
    }
}

impl HubEvent for StateEvent {
    fn name(&self) -> &str {
        match self {
            StateEvent::Updated { .. } => Self::UPDATED,
            StateEvent::Added { .. } => Self::ADDED,
            StateEvent::Deleted { .. } => Self::DELETED,
            StateEvent::Changed { .. } => Self::CHANGED,
        }
    }
}

type Initializer = Box<dyn FnOnce(&Value) -> Value>;

/// Construction options for a `State`.
#[must_use]
pub struct StateBuilder {
    params: Value,
    initializer: Option<Initializer>,
    handlers: Vec<(EventNames, Handler<StateEvent>)>,
}

impl StateBuilder {
    pub fn params(mut self, params: impl Into<Value>) -> Self {
        self.params = params.into();
        self
    }

    /// Replace the default initializer, which seeds the root from `params.state`.
    pub fn data(mut self, initializer: impl FnOnce(&Value) -> Value + 'static) -> Self {
        self.initializer = Some(Box::new(initializer));
        self
    }

    /// Subscribe a handler before the container is handed out.
    pub fn on(mut self, names: impl Into<EventNames>, handler: Handler<StateEvent>) -> Self {
        self.handlers.push((names.into(), handler));
        self
    }

    pub fn build(self) -> State {
        let params = non_null(self.params);
        let state = match self.initializer {
            Some(initializer) => initializer(&params),
            None => default_data(&params),
        };
        let events = EventHub::new();
        for (names, handler) in self.handlers {
            events.on(names, handler);
        }
        State {
            params,
            state: non_null(state),
            events,
        }
    }
}

fn default_data(params: &Value) -> Value {
    params
        .get("state")
        .filter(|state| !state.is_null())
        .cloned()
        .unwrap_or_else(Value::map)
}

fn non_null(value: Value) -> Value {
    if value.is_null() { Value::map() } else { value }
}

#[derive(Debug)]
pub struct State {
    params: Value,
    state: Value,
    events: EventHub<StateEvent>,
}

impl Default for State {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl State {
    pub fn new(params: impl Into<Value>) -> Self {
        Self::builder().params(params).build()
    }

    pub fn builder() -> StateBuilder {
        StateBuilder {
            params: Value::map(),
            initializer: None,
            handlers: Vec::new(),
        }
    }

    pub fn on(&self, names: impl Into<EventNames>, handler: Handler<StateEvent>) {
        self.events.on(names, handler);
    }

    pub fn off(&self, names: impl Into<EventNames>, handler: Option<&Handler<StateEvent>>) {
        self.events.off(names, handler);
    }

    pub fn events(&self) -> &EventHub<StateEvent> {
        &self.events
    }

    /// Live root. Mutations must go through this type to be observed.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Replace the root wholesale; `null` becomes an empty map.
    pub fn set_state(&mut self, value: impl Into<Value>) -> Dispatch {
        let new = non_null(value.into());
        let old = std::mem::replace(&mut self.state, new.clone());
        log::debug!("state replaced");
        self.events.dispatch(&StateEvent::Updated {
            path: String::new(),
            new,
            old: Some(old),
        })
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn set_params(&mut self, value: impl Into<Value>) -> Dispatch {
        let new = value.into();
        let old = std::mem::replace(&mut self.params, new.clone());
        self.events.dispatch(&StateEvent::Changed { new, old })
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        path::get(&self.state, path)
    }

    /// Independent copy of the value at `path`.
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        diff::clone_at(&self.state, path)
    }

    /// Changes that would turn the current root into `new`.
    pub fn diff(&self, new: &Value) -> Option<Diff> {
        diff::diff(new, &self.state)
    }

    pub fn exists(&self, path: &str) -> bool {
        path::exists(&self.state, path)
    }

    /// True when at least one of `paths` exists.
    pub fn exists_any<P: AsRef<str>>(&self, paths: impl IntoIterator<Item = P>) -> bool {
        paths
            .into_iter()
            .any(|path| path::exists(&self.state, path.as_ref()))
    }

    /// Append to the list at `path`, or set the key when it holds anything else.
    pub fn add(&mut self, path: &str, value: impl Into<Value>) -> Result<Dispatch, PathError> {
        if path.is_empty() {
            return Ok(Dispatch::none());
        }
        let new = value.into();
        path::resolve_mut(&mut self.state, path)?.append(new.clone())?;
        log::debug!("added `{path}`");
        Ok(self.events.dispatch(&StateEvent::Added {
            path: path.to_owned(),
            new,
        }))
    }

    /// Remove the entry at `path`, splicing lists. A missing path still
    /// notifies, with no old value.
    pub fn delete(&mut self, path: &str) -> Result<Dispatch, PathError> {
        if path.is_empty() {
            return Ok(Dispatch::none());
        }
        let old = if path::exists(&self.state, path) {
            path::resolve_mut(&mut self.state, path)?.remove()
        } else {
            None
        };
        log::debug!("deleted `{path}`");
        Ok(self.events.dispatch(&StateEvent::Deleted {
            path: path.to_owned(),
            old,
        }))
    }

    pub fn update(&mut self, path: &str, value: impl Into<Value>) -> Result<Dispatch, PathError> {
        if path.is_empty() {
            return Ok(Dispatch::none());
        }
        let new = value.into();
        let old = path::set(&mut self.state, path, new.clone())?;
        log::debug!("updated `{path}`");
        Ok(self.events.dispatch(&StateEvent::Updated {
            path: path.to_owned(),
            new,
            old,
        }))
    }

    /// Apply `(path, value)` pairs in order, one `updated` event each.
    ///
    /// Stops at the first failing path; entries before it stay applied.
    pub fn update_many<P, V>(&mut self, entries: impl IntoIterator<Item = (P, V)>) -> Result<Dispatch, PathError>
    where
        P: AsRef<str>,
        V: Into<Value>,
    {
        let mut dispatches = Vec::new();
        for (path, value) in entries {
            dispatches.push(self.update(path.as_ref(), value)?);
        }
        Ok(Dispatch::all(dispatches))
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.state.serialize(serializer)
    }
}
