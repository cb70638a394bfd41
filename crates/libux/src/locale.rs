//! Translation lookup on top of a `State` holding the current language.

use crate::event_hub::{Dispatch, EventNames, Handler};
use crate::path::{self, PathError};
use crate::state::{State, StateEvent};
use crate::value::Value;

pub const FALLBACK_LANG: &str = "en";

/// Params are `{ locales: { <lang>: { ..translations } }, lang }`; the state
/// is `{ lang }`.
#[derive(Debug)]
pub struct Locale {
    state: State,
}

impl Locale {
    pub fn new(params: impl Into<Value>) -> Self {
        let mut state = State::new(params);
        let lang = state
            .params()
            .get("lang")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_LANG)
            .to_owned();
        let lang = resolve_lang(state.params(), &lang);
        // the root is always a map, so a top-level key cannot fail
        if let Err(error) = state.update("lang", lang) {
            log::warn!("failed to store the initial language: {error}");
        }
        Self { state }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn on(&self, names: impl Into<EventNames>, handler: Handler<StateEvent>) {
        self.state.on(names, handler);
    }

    pub fn off(&self, names: impl Into<EventNames>, handler: Option<&Handler<StateEvent>>) {
        self.state.off(names, handler);
    }

    fn locales(&self) -> Option<&Value> {
        self.state.params().get("locales")
    }

    /// Languages with translations, in declaration order.
    pub fn languages(&self) -> Vec<&str> {
        self.locales()
            .and_then(Value::as_map)
            .map(|locales| locales.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn lang(&self) -> &str {
        self.state
            .get("lang")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_LANG)
    }

    /// Switch language; one without translations falls back to `en`.
    pub fn set_lang(&mut self, lang: &str) -> Result<Dispatch, PathError> {
        let lang = resolve_lang(self.state.params(), lang);
        log::debug!("language set to `{lang}`");
        self.state.update("lang", lang)
    }

    /// Translation at `path` in the current language, with `%{name}`
    /// placeholders replaced from `data`. Unknown paths translate to themselves.
    pub fn t(&self, path: &str, data: &Value) -> String {
        let translation = self
            .locales()
            .and_then(|locales| locales.get(self.lang()))
            .and_then(|strings| path::get(strings, path));
        let mut text = match translation {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(value @ (Value::Number(_) | Value::Bool(_))) => value.to_string(),
            _ => return path.to_owned(),
        };
        if let Some(fields) = data.as_map() {
            for (name, value) in fields {
                text = text.replacen(&format!("%{{{name}}}"), &value.to_string(), 1);
            }
        }
        text
    }
}

fn resolve_lang(params: &Value, lang: &str) -> String {
    let known = params
        .get("locales")
        .is_some_and(|locales| locales.get(lang).is_some());
    (if known { lang } else { FALLBACK_LANG }).to_owned()
}
