//! Micro-templating: compile once, render many times.
//!
//! Template text is split by three delimiter patterns into escaped
//! interpolations, raw interpolations and evaluation regions. The regions
//! are stitched into one intermediate program made of `print(...)` calls and
//! the verbatim evaluation code, which is then lexed and parsed into an AST.
//! Rendering walks that AST with the data argument as the implicit scope.

use crate::value::Value;
use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::prelude::{Input, Parser};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use thiserror::Error;

mod eval;
mod lexer;
mod parser;

pub use eval::{escape_html, truthy};
use lexer::{Token, lexer};
use parser::{ParseError, Span, Spanned, Statement, parser};

pub const DEFAULT_ESCAPE: &str = r"<%-([\s\S]+?)%>";
pub const DEFAULT_INTERPOLATE: &str = r"<%=([\s\S]+?)%>";
pub const DEFAULT_EVALUATE: &str = r"<%([\s\S]+?)%>";

/// Delimiters and the name under which the data argument is reachable.
///
/// A pattern set to `None` disables that region kind. The first capture
/// group of each pattern is the region content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub variable: String,
    pub escape: Option<String>,
    pub interpolate: Option<String>,
    pub evaluate: Option<String>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            variable: "data".to_owned(),
            escape: Some(DEFAULT_ESCAPE.to_owned()),
            interpolate: Some(DEFAULT_INTERPOLATE.to_owned()),
            evaluate: Some(DEFAULT_EVALUATE.to_owned()),
        }
    }
}

impl TemplateSettings {
    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }
}

pub type Helper = Rc<dyn Fn(&[Value]) -> Value>;

/// Functions of the template owner, callable as `name(..)`, `this.name(..)`
/// or read getter-style as `this.name`.
#[derive(Clone, Default)]
pub struct Helpers(IndexMap<String, Helper>);

impl Helpers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, helper: impl Fn(&[Value]) -> Value + 'static) -> Self {
        self.insert(name, helper);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, helper: impl Fn(&[Value]) -> Value + 'static) {
        self.0.insert(name.into(), Rc::new(helper));
    }

    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.0.get(name)
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

/// One problem found in the generated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub label: String,
    /// Byte range in the generated source.
    pub span: Range<usize>,
}

impl Diagnostic {
    fn from_error<T: fmt::Display>(error: ParseError<'_, T>) -> Self {
        Self {
            message: error.to_string(),
            label: error.reason().to_string(),
            span: error.span().into_range(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateCompileError {
    #[error("invalid {kind} pattern")]
    InvalidPattern {
        kind: &'static str,
        source: regex::Error,
    },
    #[error("the {kind} pattern has no capture group")]
    MissingCapture { kind: &'static str },
    #[error("template does not compile ({} syntax error(s))", .diagnostics.len())]
    Syntax {
        generated: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl TemplateCompileError {
    /// The intermediate program, when compilation got that far.
    pub fn generated_source(&self) -> Option<&str> {
        match self {
            Self::Syntax { generated, .. } => Some(generated),
            Self::InvalidPattern { .. } | Self::MissingCapture { .. } => None,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Syntax { diagnostics, .. } => diagnostics,
            Self::InvalidPattern { .. } | Self::MissingCapture { .. } => &[],
        }
    }

    /// Human-readable report, with syntax errors pointed out in the generated source.
    pub fn report(&self, filename: &str) -> String {
        let Self::Syntax {
            generated,
            diagnostics,
        } = self
        else {
            return self.to_string();
        };
        let mut report_bytes = Vec::new();
        for diagnostic in diagnostics {
            let written = Report::build(ReportKind::Error, (filename, diagnostic.span.clone()))
                .with_config(Config::default().with_color(false))
                .with_message(&diagnostic.message)
                .with_label(
                    Label::new((filename, diagnostic.span.clone())).with_message(&diagnostic.label),
                )
                .finish()
                .write((filename, Source::from(generated.as_str())), &mut report_bytes);
            if let Err(error) = written {
                log::warn!("failed to render a template diagnostic: {error}");
            }
        }
        String::from_utf8_lossy(&report_bytes).into_owned()
    }
}

const KINDS: [&str; 3] = ["escape", "interpolate", "evaluate"];
const ESCAPE: usize = 0;
const INTERPOLATE: usize = 1;
const EVALUATE: usize = 2;

/// The three region patterns folded into one alternation, tried in
/// `escape`, `interpolate`, `evaluate` order at each position.
struct Matcher {
    regex: Regex,
    groups: [Option<usize>; 3],
}

impl Matcher {
    fn new(settings: &TemplateSettings) -> Result<Self, TemplateCompileError> {
        let patterns = [&settings.escape, &settings.interpolate, &settings.evaluate];
        let mut alternatives = Vec::new();
        let mut groups = [None; 3];
        let mut next_group = 1;
        for ((kind, pattern), group) in KINDS.into_iter().zip(patterns).zip(&mut groups) {
            let Some(pattern) = pattern else {
                continue;
            };
            let regex = Regex::new(pattern)
                .map_err(|source| TemplateCompileError::InvalidPattern { kind, source })?;
            let captures = regex.captures_len() - 1;
            if captures == 0 {
                return Err(TemplateCompileError::MissingCapture { kind });
            }
            *group = Some(next_group);
            next_group += captures;
            alternatives.push(format!("(?:{pattern})"));
        }
        alternatives.push("$".to_owned());
        let regex = Regex::new(&alternatives.join("|")).map_err(|source| {
            TemplateCompileError::InvalidPattern {
                kind: "combined",
                source,
            }
        })?;
        Ok(Self { regex, groups })
    }

    fn generate(&self, text: &str) -> String {
        let mut source = String::new();
        let mut index = 0;
        for captures in self.regex.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            push_literal(&mut source, &text[index..whole.start()]);
            index = whole.end();
            let region = |kind: usize| {
                self.groups[kind]
                    .and_then(|group| captures.get(group))
                    .map(|region| region.as_str())
            };
            if let Some(code) = region(ESCAPE) {
                source.push_str(&format!("print(escape(({code})));\n"));
            } else if let Some(code) = region(INTERPOLATE) {
                source.push_str(&format!("print(({code}));\n"));
            } else if let Some(code) = region(EVALUATE) {
                source.push_str(code);
                source.push('\n');
            }
        }
        push_literal(&mut source, &text[index..]);
        source
    }
}

fn push_literal(source: &mut String, literal: &str) {
    if literal.is_empty() {
        return;
    }
    source.push_str("print('");
    for character in literal.chars() {
        match character {
            '\\' => source.push_str("\\\\"),
            '\'' => source.push_str("\\'"),
            '\r' => source.push_str("\\r"),
            '\n' => source.push_str("\\n"),
            '\u{2028}' => source.push_str("\\u2028"),
            '\u{2029}' => source.push_str("\\u2029"),
            other => source.push(other),
        }
    }
    source.push_str("');\n");
}

fn parse_program(source: &str) -> Result<Vec<Spanned<Statement>>, Vec<Diagnostic>> {
    let (tokens, errors) = lexer().parse(source).into_output_errors();
    if !errors.is_empty() {
        return Err(errors.into_iter().map(Diagnostic::from_error).collect());
    }
    let tokens: Vec<_> = tokens
        .unwrap_or_default()
        .into_iter()
        .filter(|token| !matches!(token.node, Token::Comment(_)))
        .collect();
    let input = tokens
        .as_slice()
        .map(Span::from(source.len()..source.len()), |Spanned { node, span }| (node, span));
    parser()
        .parse(input)
        .into_result()
        .map_err(|errors| errors.into_iter().map(Diagnostic::from_error).collect())
}

/// A compiled template. Cheap to clone.
#[derive(Clone)]
pub struct Template {
    program: Rc<[Spanned<Statement>]>,
    source: Rc<str>,
    variable: Rc<str>,
    helpers: Helpers,
}

impl Template {
    /// Compile with default settings and no helpers.
    pub fn compile(text: &str) -> Result<Self, TemplateCompileError> {
        Self::compile_with(text, &TemplateSettings::default(), Helpers::new())
    }

    pub fn compile_with(
        text: &str,
        settings: &TemplateSettings,
        helpers: Helpers,
    ) -> Result<Self, TemplateCompileError> {
        let source = Matcher::new(settings)?.generate(text);
        let program = match parse_program(&source) {
            Ok(program) => program,
            Err(diagnostics) => {
                log::debug!("template failed to compile with {} error(s)", diagnostics.len());
                return Err(TemplateCompileError::Syntax {
                    generated: source,
                    diagnostics,
                });
            }
        };
        log::debug!("template compiled into {} statement(s)", program.len());
        Ok(Self {
            program: program.into(),
            source: source.into(),
            variable: settings.variable.as_str().into(),
            helpers,
        })
    }

    /// The intermediate program the template was compiled into.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Render with `data` as both the scope and `this`.
    pub fn render(&self, data: &Value) -> String {
        self.render_with(data, data)
    }

    /// Render with a separate owner value bound to `this`.
    pub fn render_with(&self, data: &Value, this: &Value) -> String {
        eval::Interpreter::new(data, this, &self.variable, &self.helpers).run(&self.program)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("variable", &self.variable)
            .field("helpers", &self.helpers)
            .field("statements", &self.program.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generate(text: &str) -> String {
        Matcher::new(&TemplateSettings::default()).unwrap().generate(text)
    }

    #[test]
    fn test_generated_source_shape() {
        assert_eq!(
            generate("a<%- x %>b<%= y %><% if (z) { %>c\n<% } %>"),
            "print('a');\nprint(escape(( x )));\nprint('b');\nprint(( y ));\n if (z) { \nprint('c\\n');\n } \n"
        );
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(generate("it's \\ \r\u{2028}"), "print('it\\'s \\\\ \\r\\u2028');\n");
        let template = Template::compile("it's \\ \r\n\u{2028}\u{2029}").unwrap();
        assert_eq!(template.render(&Value::map()), "it's \\ \r\n\u{2028}\u{2029}");
    }

    #[test]
    fn test_escape_wins_over_evaluate() {
        let template = Template::compile("<%- '<' %><%= '<' %>").unwrap();
        assert_eq!(template.render(&Value::map()), "&lt;<");
    }

    #[test]
    fn test_custom_delimiters_are_honoured() {
        let settings = TemplateSettings {
            variable: "model".into(),
            escape: Some(r"\{\{-(.+?)\}\}".into()),
            interpolate: Some(r"\{\{(.+?)\}\}".into()),
            evaluate: None,
        };
        let template = Template::compile_with("{{ model.a }}|{{- b }}|<% ignored %>", &settings, Helpers::new()).unwrap();
        let data = Value::from(json!({"a": 1, "b": "<i>"}));
        assert_eq!(template.render(&data), "1|&lt;i&gt;|<% ignored %>");
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: TemplateSettings = serde_json::from_value(json!({"variable": "it", "evaluate": null})).unwrap();
        assert_eq!(settings.variable, "it");
        assert_eq!(settings.escape.as_deref(), Some(DEFAULT_ESCAPE));
        assert_eq!(settings.evaluate, None);
    }

    #[test]
    fn test_pattern_errors() {
        let broken = TemplateSettings {
            escape: Some("(".into()),
            ..TemplateSettings::default()
        };
        assert!(matches!(
            Template::compile_with("", &broken, Helpers::new()),
            Err(TemplateCompileError::InvalidPattern { kind: "escape", .. })
        ));
        let no_group = TemplateSettings {
            interpolate: Some("<%=.+?%>".into()),
            ..TemplateSettings::default()
        };
        let error = Template::compile_with("", &no_group, Helpers::new()).unwrap_err();
        assert!(matches!(error, TemplateCompileError::MissingCapture { kind: "interpolate" }));
        assert_eq!(error.generated_source(), None);
    }

    #[test]
    fn test_syntax_error_report_points_into_generated_source() {
        let error = Template::compile("<% if (data.ok { %>x<% } %>").unwrap_err();
        let source = error.generated_source().unwrap();
        assert!(source.contains("if (data.ok {"));
        assert!(!error.diagnostics().is_empty());
        let report = error.report("broken.html");
        assert!(report.contains("broken.html"));
    }

    #[test]
    fn test_both_loop_forms_stop_at_the_guard() {
        let limit = eval::MAX_LOOP_ITERATIONS;
        let data = Value::object([("items", Value::list(vec![Value::Null; limit + 1]))]);
        let each =
            Template::compile("<% let n = 0; for (const x of data.items) n += 1; %><%= n %>").unwrap();
        assert_eq!(each.render(&data), limit.to_string());

        let endless = Template::compile("<% let i = 0; for (;;) i++; %><%= i %>").unwrap();
        assert_eq!(endless.render(&Value::map()), limit.to_string());
    }

    #[test]
    fn test_helpers_bound_to_owner() {
        let helpers = Helpers::new()
            .with("shout", |args: &[Value]| Value::from(args.first().map_or(String::new(), |a| a.to_string().to_uppercase())))
            .with("className", |_: &[Value]| Value::from("done"));
        let template = Template::compile_with(
            "<%= shout(name) %> <%= this.shout('x') %> <%= this.className %>",
            &TemplateSettings::default(),
            helpers,
        )
        .unwrap();
        assert_eq!(template.render(&Value::from(json!({"name": "ab"}))), "AB X done");
    }
}
