//! Tree-walking interpreter for compiled templates.
//!
//! Values follow the loose typing of the region language: truthiness,
//! `==` coercion and `+` concatenation behave as template authors expect.
//! Nothing here fails; unresolvable names evaluate to `null`.

use super::Helpers;
use super::parser::{
    AssignmentOperator, BinaryOperator, DeclarationKind, Expression, LoopKind, Spanned, Statement,
    UnaryOperator,
};
use crate::value::{Map, Value};
use std::borrow::Cow;
use std::cell::RefCell;

pub(super) const MAX_LOOP_ITERATIONS: usize = 100_000;

pub struct Interpreter<'a> {
    data: &'a Value,
    this: &'a Value,
    variable: &'a str,
    helpers: &'a Helpers,
    frames: Vec<Map>,
    output: RefCell<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(data: &'a Value, this: &'a Value, variable: &'a str, helpers: &'a Helpers) -> Self {
        Self {
            data,
            this,
            variable,
            helpers,
            frames: vec![Map::new()],
            output: RefCell::new(String::new()),
        }
    }

    pub fn run(mut self, program: &[Spanned<Statement>]) -> String {
        for statement in program {
            self.exec(statement);
        }
        self.output.into_inner()
    }

    fn exec(&mut self, statement: &Spanned<Statement>) {
        match &statement.node {
            Statement::Declaration { kind, name, value } => {
                let value = value
                    .as_ref()
                    .map_or(Value::Null, |value| self.eval(value).into_owned());
                let frame = match kind {
                    DeclarationKind::Var => self.frames.first_mut(),
                    DeclarationKind::Let | DeclarationKind::Const => self.frames.last_mut(),
                };
                if let Some(frame) = frame {
                    frame.insert(name.clone(), value);
                }
            }
            Statement::Assignment {
                name,
                operator,
                value,
            } => {
                let value = self.eval(value).into_owned();
                let value = match operator {
                    AssignmentOperator::Set => value,
                    AssignmentOperator::Add => add(&self.lookup(name), &value),
                };
                self.assign(name, value);
            }
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                if truthy(&self.eval(condition)) {
                    self.exec_block(then, None);
                } else {
                    self.exec_block(otherwise, None);
                }
            }
            Statement::ForEach {
                binding,
                kind,
                iterable,
                body,
            } => {
                let items = iteration_items(&self.eval(iterable), *kind);
                if items.len() > MAX_LOOP_ITERATIONS {
                    warn_loop_guard();
                }
                for item in items.into_iter().take(MAX_LOOP_ITERATIONS) {
                    self.exec_block(body, Some((binding, item)));
                }
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                self.frames.push(Map::new());
                if let Some(init) = init {
                    self.exec(init);
                }
                let mut iterations = 0;
                while condition
                    .as_ref()
                    .is_none_or(|condition| truthy(&self.eval(condition)))
                {
                    if iterations == MAX_LOOP_ITERATIONS {
                        warn_loop_guard();
                        break;
                    }
                    iterations += 1;
                    self.exec_block(body, None);
                    if let Some(step) = step {
                        self.exec(step);
                    }
                }
                self.frames.pop();
            }
            Statement::Expression(expression) => {
                self.eval(expression);
            }
        }
    }

    fn exec_block(&mut self, statements: &[Spanned<Statement>], binding: Option<(&String, Value)>) {
        let mut frame = Map::new();
        if let Some((name, value)) = binding {
            frame.insert(name.clone(), value);
        }
        self.frames.push(frame);
        for statement in statements {
            self.exec(statement);
        }
        self.frames.pop();
    }

    /// Innermost local holding `name`, else the outermost frame.
    fn assign(&mut self, name: &str, value: Value) {
        let frame = match self.frames.iter().rposition(|frame| frame.contains_key(name)) {
            Some(position) => self.frames.get_mut(position),
            None => self.frames.first_mut(),
        };
        if let Some(frame) = frame {
            frame.insert(name.to_owned(), value);
        }
    }

    fn lookup(&self, name: &str) -> Cow<'_, Value> {
        if let Some(local) = self.frames.iter().rev().find_map(|frame| frame.get(name)) {
            return Cow::Borrowed(local);
        }
        if let Some(own) = self.data.get(name) {
            return Cow::Borrowed(own);
        }
        if name == self.variable {
            return Cow::Borrowed(self.data);
        }
        if let Some(member) = self.this.get(name) {
            return Cow::Borrowed(member);
        }
        if let Some(helper) = self.helpers.get(name) {
            return Cow::Owned(helper(&[]));
        }
        log::debug!("template name `{name}` is not defined");
        Cow::Owned(Value::Null)
    }

    fn eval(&self, expression: &Spanned<Expression>) -> Cow<'_, Value> {
        match &expression.node {
            Expression::Literal(value) => Cow::Owned(value.clone()),
            Expression::Alias(name) => self.lookup(name),
            Expression::This => Cow::Borrowed(self.this),
            Expression::List(items) => Cow::Owned(
                items
                    .iter()
                    .map(|item| self.eval(item).into_owned())
                    .collect(),
            ),
            Expression::Object(fields) => Cow::Owned(Value::Map(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), self.eval(value).into_owned()))
                    .collect(),
            )),
            Expression::Member { object, property } => {
                if matches!(object.node, Expression::This) && self.this.get(property).is_none() {
                    if let Some(helper) = self.helpers.get(property) {
                        return Cow::Owned(helper(&[]));
                    }
                }
                member(self.eval(object), property)
            }
            Expression::Index { object, index } => {
                let index = self.eval(index);
                let object = self.eval(object);
                match index.as_ref() {
                    Value::Number(number)
                        if *number >= 0.0
                            && number.fract() == 0.0
                            && matches!(object.as_ref(), Value::List(_)) =>
                    {
                        project(object, |object| object.get_index(*number as usize))
                    }
                    key => member(object, &key.to_string()),
                }
            }
            Expression::Call { callee, arguments } => {
                let arguments: Vec<Value> = arguments
                    .iter()
                    .map(|argument| self.eval(argument).into_owned())
                    .collect();
                Cow::Owned(self.call(callee, &arguments))
            }
            Expression::Unary { operator, operand } => {
                let operand = self.eval(operand);
                Cow::Owned(match operator {
                    UnaryOperator::Not => Value::Bool(!truthy(&operand)),
                    UnaryOperator::Negate => Value::Number(-to_number(&operand)),
                    UnaryOperator::Plus => Value::Number(to_number(&operand)),
                    UnaryOperator::Typeof => Value::from(type_of(&operand)),
                })
            }
            Expression::Binary {
                operator: BinaryOperator::And,
                operand_a,
                operand_b,
            } => {
                let a = self.eval(operand_a);
                if truthy(&a) { self.eval(operand_b) } else { a }
            }
            Expression::Binary {
                operator: BinaryOperator::Or,
                operand_a,
                operand_b,
            } => {
                let a = self.eval(operand_a);
                if truthy(&a) { a } else { self.eval(operand_b) }
            }
            Expression::Binary {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = self.eval(operand_a);
                let b = self.eval(operand_b);
                Cow::Owned(binary(*operator, &a, &b))
            }
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if truthy(&self.eval(condition)) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn call(&self, callee: &Spanned<Expression>, arguments: &[Value]) -> Value {
        match &callee.node {
            Expression::Alias(name) => match name.as_str() {
                "print" => {
                    let mut output = self.output.borrow_mut();
                    for argument in arguments {
                        if !argument.is_null() {
                            output.push_str(&argument.to_string());
                        }
                    }
                    Value::Null
                }
                "escape" => Value::String(
                    arguments
                        .first()
                        .map_or_else(String::new, escape_html),
                ),
                _ => match self.helpers.get(name) {
                    Some(helper) => helper(arguments),
                    None => {
                        log::debug!("template function `{name}` is not defined");
                        Value::Null
                    }
                },
            },
            Expression::Member { object, property } => {
                if matches!(object.node, Expression::This) {
                    if let Some(helper) = self.helpers.get(property) {
                        return helper(arguments);
                    }
                }
                let receiver = self.eval(object);
                method(&receiver, property, arguments).unwrap_or_else(|| {
                    log::debug!("template method `{property}` is not defined for {}", receiver.kind());
                    Value::Null
                })
            }
            _ => {
                log::debug!("template call target is not a function");
                Value::Null
            }
        }
    }
}

fn warn_loop_guard() {
    log::warn!("template loop stopped after {MAX_LOOP_ITERATIONS} iterations");
}

fn project<'v>(value: Cow<'v, Value>, key: impl FnOnce(&Value) -> Option<&Value>) -> Cow<'v, Value> {
    match value {
        Cow::Borrowed(value) => key(value).map_or(Cow::Owned(Value::Null), Cow::Borrowed),
        Cow::Owned(value) => Cow::Owned(key(&value).cloned().unwrap_or_default()),
    }
}

fn member<'v>(value: Cow<'v, Value>, property: &str) -> Cow<'v, Value> {
    let computed = match (value.as_ref(), property) {
        (Value::List(items), "length") => Some(Value::from(items.len())),
        (Value::String(text), "length") => Some(Value::from(text.chars().count())),
        (Value::String(text), index) => Some(
            index
                .parse::<usize>()
                .ok()
                .and_then(|index| text.chars().nth(index))
                .map_or(Value::Null, |character| Value::from(character.to_string())),
        ),
        _ => None,
    };
    match computed {
        Some(computed) => Cow::Owned(computed),
        None => project(value, |value| value.child(property)),
    }
}

fn method(receiver: &Value, name: &str, arguments: &[Value]) -> Option<Value> {
    let argument = arguments.first();
    let value = match (receiver, name) {
        (Value::List(items), "join") => {
            let separator = argument.map_or_else(|| ",".to_owned(), Value::to_string);
            Value::String(
                items
                    .iter()
                    .map(|item| if item.is_null() { String::new() } else { item.to_string() })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        (Value::List(items), "includes") => {
            Value::Bool(argument.is_some_and(|argument| items.contains(argument)))
        }
        (Value::List(items), "indexOf") => Value::Number(
            argument
                .and_then(|argument| items.iter().position(|item| item == argument))
                .map_or(-1.0, |position| position as f64),
        ),
        (Value::String(text), "includes") => {
            Value::Bool(argument.is_some_and(|argument| text.contains(&argument.to_string())))
        }
        (Value::String(text), "indexOf") => Value::Number(
            argument
                .and_then(|argument| text.find(&argument.to_string()))
                .map_or(-1.0, |byte| text[..byte].chars().count() as f64),
        ),
        (Value::String(text), "toUpperCase") => Value::String(text.to_uppercase()),
        (Value::String(text), "toLowerCase") => Value::String(text.to_lowercase()),
        (Value::String(text), "trim") => Value::String(text.trim().to_owned()),
        (value, "toString") => Value::String(value.to_string()),
        _ => return None,
    };
    Some(value)
}

fn iteration_items(iterable: &Value, kind: LoopKind) -> Vec<Value> {
    match (iterable, kind) {
        (Value::List(items), LoopKind::Of) => items.clone(),
        (Value::String(text), LoopKind::Of) => text
            .chars()
            .map(|character| Value::from(character.to_string()))
            .collect(),
        (Value::Map(fields), LoopKind::In) => fields.keys().map(|key| Value::from(key.as_str())).collect(),
        (Value::List(items), LoopKind::In) => (0..items.len()).map(|index| Value::from(index.to_string())).collect(),
        (Value::String(text), LoopKind::In) => (0..text.chars().count())
            .map(|index| Value::from(index.to_string()))
            .collect(),
        (other, _) => {
            log::debug!("template loop over a {} does nothing", other.kind());
            Vec::new()
        }
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => *number != 0.0 && !number.is_nan(),
        Value::String(text) => !text.is_empty(),
        Value::Date(_) | Value::List(_) | Value::Map(_) => true,
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(value) => f64::from(u8::from(*value)),
        Value::Number(number) => *number,
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                0.0
            } else {
                text.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Date(date) => date.timestamp_millis() as f64,
        Value::List(items) => match items.as_slice() {
            [] => 0.0,
            [item] => to_number(item),
            _ => f64::NAN,
        },
        Value::Map(_) => f64::NAN,
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Date(_) | Value::List(_) | Value::Map(_) => "object",
    }
}

fn add(a: &Value, b: &Value) -> Value {
    let concatenates = |value: &Value| {
        matches!(value, Value::String(_) | Value::Date(_) | Value::List(_) | Value::Map(_))
    };
    if concatenates(a) || concatenates(b) {
        Value::String(format!("{a}{b}"))
    } else {
        Value::Number(to_number(a) + to_number(b))
    }
}

fn loose_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), _)
        | (_, Value::Bool(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_)) => to_number(a) == to_number(b),
        _ => strict_equal(a, b),
    }
}

fn strict_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => a == b,
    }
}

fn binary(operator: BinaryOperator, a: &Value, b: &Value) -> Value {
    let number = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(a), to_number(b)));
    let compare = |f: fn(std::cmp::Ordering) -> bool| {
        let ordering = match (a, b) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => to_number(a).partial_cmp(&to_number(b)),
        };
        Value::Bool(ordering.is_some_and(f))
    };
    match operator {
        BinaryOperator::Multiply => number(|a, b| a * b),
        BinaryOperator::Divide => number(|a, b| a / b),
        BinaryOperator::Remainder => number(|a, b| a % b),
        BinaryOperator::Add => add(a, b),
        BinaryOperator::Subtract => number(|a, b| a - b),
        BinaryOperator::Less => compare(|ordering| ordering.is_lt()),
        BinaryOperator::LessOrEqual => compare(|ordering| ordering.is_le()),
        BinaryOperator::Greater => compare(|ordering| ordering.is_gt()),
        BinaryOperator::GreaterOrEqual => compare(|ordering| ordering.is_ge()),
        BinaryOperator::Equal => Value::Bool(loose_equal(a, b)),
        BinaryOperator::NotEqual => Value::Bool(!loose_equal(a, b)),
        BinaryOperator::StrictEqual => Value::Bool(strict_equal(a, b)),
        BinaryOperator::StrictNotEqual => Value::Bool(!strict_equal(a, b)),
        // short-circuited in `eval`
        BinaryOperator::And => Value::Bool(truthy(a) && truthy(b)),
        BinaryOperator::Or => Value::Bool(truthy(a) || truthy(b)),
    }
}

/// HTML-escape the string form of `value`; `null` becomes empty.
pub fn escape_html(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    let text = value.to_string();
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&Value::from("")));
        assert!(!truthy(&Value::Number(f64::NAN)));
        assert!(truthy(&Value::from(json!([]))));
        assert!(truthy(&Value::map()));
    }

    #[test]
    fn test_add_concatenates_with_strings() {
        assert_eq!(add(&Value::from(1), &Value::from(2)), Value::from(3));
        assert_eq!(add(&Value::from("a"), &Value::from(1)), Value::from("a1"));
        assert_eq!(add(&Value::from(json!([1, 2])), &Value::from("")), Value::from("1,2"));
    }

    #[test]
    fn test_loose_and_strict_equality() {
        assert!(loose_equal(&Value::from(1), &Value::from("1")));
        assert!(!strict_equal(&Value::from(1), &Value::from("1")));
        assert!(loose_equal(&Value::from(true), &Value::from(1)));
        assert!(!loose_equal(&Value::Null, &Value::from(0)));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(&Value::from(r#"<a href="x">&</a>"#)), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(escape_html(&Value::Null), "");
        assert_eq!(escape_html(&Value::from(2)), "2");
        assert_eq!(escape_html(&Value::from("it's")), "it's");
    }

    #[test]
    fn test_methods() {
        let list = Value::from(json!(["a", null, "c"]));
        assert_eq!(method(&list, "join", &[Value::from("-")]), Some(Value::from("a--c")));
        assert_eq!(method(&list, "indexOf", &[Value::from("c")]), Some(Value::from(2)));
        assert_eq!(method(&Value::from(" Hi "), "trim", &[]), Some(Value::from("Hi")));
        assert_eq!(method(&Value::from(1), "nope", &[]), None);
    }
}
