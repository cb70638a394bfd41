//! A `State` paired with compiled templates.
//!
//! The component keeps the markup of its default template up to date: every
//! mutation made through it re-renders and fires `rendered`. Mounting the
//! markup anywhere is left to the caller.

use crate::event_hub::{Dispatch, EventHub, EventNames, Handler, HubEvent};
use crate::path::PathError;
use crate::state::{State, StateBuilder, StateEvent};
use crate::template::{Helpers, Template, TemplateCompileError, TemplateSettings};
use crate::value::Value;
use indexmap::IndexMap;

pub const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentEvent {
    Rendered { template: String, html: String },
}

impl ComponentEvent {
    pub const RENDERED: &'static str = "rendered";
}

impl HubEvent for ComponentEvent {
    fn name(&self) -> &str {
        match self {
            ComponentEvent::Rendered { .. } => Self::RENDERED,
        }
    }
}

#[must_use]
pub struct ComponentBuilder {
    state: StateBuilder,
    templates: IndexMap<String, String>,
    helpers: Helpers,
    handlers: Vec<(EventNames, Handler<ComponentEvent>)>,
}

impl ComponentBuilder {
    pub fn params(mut self, params: impl Into<Value>) -> Self {
        self.state = self.state.params(params);
        self
    }

    pub fn data(mut self, initializer: impl FnOnce(&Value) -> Value + 'static) -> Self {
        self.state = self.state.data(initializer);
        self
    }

    /// Subscribe to state events before the first render.
    pub fn on_state(mut self, names: impl Into<EventNames>, handler: Handler<StateEvent>) -> Self {
        self.state = self.state.on(names, handler);
        self
    }

    pub fn on(mut self, names: impl Into<EventNames>, handler: Handler<ComponentEvent>) -> Self {
        self.handlers.push((names.into(), handler));
        self
    }

    /// The template rendered by `render`.
    pub fn template(self, text: impl Into<String>) -> Self {
        self.named_template(DEFAULT_TEMPLATE, text)
    }

    pub fn named_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(name.into(), text.into());
        self
    }

    pub fn helper(mut self, name: impl Into<String>, helper: impl Fn(&[Value]) -> Value + 'static) -> Self {
        self.helpers.insert(name, helper);
        self
    }

    /// Compile every template and render the default one.
    pub fn build(self) -> Result<Component, TemplateCompileError> {
        let settings = TemplateSettings::default().with_variable("state");
        let mut templates = IndexMap::new();
        for (name, text) in self.templates {
            let template = Template::compile_with(&text, &settings, self.helpers.clone())?;
            templates.insert(name, template);
        }
        let events = EventHub::new();
        for (names, handler) in self.handlers {
            events.on(names, handler);
        }
        let mut component = Component {
            state: self.state.build(),
            templates,
            events,
            html: String::new(),
        };
        drop(component.render());
        Ok(component)
    }
}

#[derive(Debug)]
pub struct Component {
    state: State,
    templates: IndexMap<String, Template>,
    events: EventHub<ComponentEvent>,
    html: String,
}

impl Component {
    pub fn builder() -> ComponentBuilder {
        ComponentBuilder {
            state: State::builder(),
            templates: IndexMap::new(),
            helpers: Helpers::new(),
            handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Markup of the last default render.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn on(&self, names: impl Into<EventNames>, handler: Handler<ComponentEvent>) {
        self.events.on(names, handler);
    }

    pub fn off(&self, names: impl Into<EventNames>, handler: Option<&Handler<ComponentEvent>>) {
        self.events.off(names, handler);
    }

    /// `this` inside templates.
    fn owner(&self) -> Value {
        Value::object([
            ("state", self.state.state().clone()),
            ("params", self.state.params().clone()),
        ])
    }

    /// Render a named template without touching `html`.
    pub fn render_template(&self, name: &str) -> Option<(String, Dispatch)> {
        let template = self.templates.get(name)?;
        let html = template.render_with(self.state.state(), &self.owner());
        let dispatch = self.events.dispatch(&ComponentEvent::Rendered {
            template: name.to_owned(),
            html: html.clone(),
        });
        Some((html, dispatch))
    }

    /// Re-render the default template. A component without one renders empty.
    pub fn render(&mut self) -> Dispatch {
        match self.render_template(DEFAULT_TEMPLATE) {
            Some((html, dispatch)) => {
                self.html = html;
                dispatch
            }
            None => Dispatch::none(),
        }
    }

    fn rerender(&mut self, changed: Dispatch) -> Dispatch {
        Dispatch::all([changed, self.render()])
    }

    pub fn update(&mut self, path: &str, value: impl Into<Value>) -> Result<Dispatch, PathError> {
        let changed = self.state.update(path, value)?;
        Ok(self.rerender(changed))
    }

    pub fn update_many<P, V>(&mut self, entries: impl IntoIterator<Item = (P, V)>) -> Result<Dispatch, PathError>
    where
        P: AsRef<str>,
        V: Into<Value>,
    {
        let changed = self.state.update_many(entries)?;
        Ok(self.rerender(changed))
    }

    pub fn add(&mut self, path: &str, value: impl Into<Value>) -> Result<Dispatch, PathError> {
        let changed = self.state.add(path, value)?;
        Ok(self.rerender(changed))
    }

    pub fn delete(&mut self, path: &str) -> Result<Dispatch, PathError> {
        let changed = self.state.delete(path)?;
        Ok(self.rerender(changed))
    }

    pub fn set_state(&mut self, value: impl Into<Value>) -> Dispatch {
        let changed = self.state.set_state(value);
        self.rerender(changed)
    }
}
