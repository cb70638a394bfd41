//! Dotted-path addressing into a `Value` tree.
//!
//! `"list.2.text"` walks map keys and list indices positionally. Reads never
//! change the tree; `resolve_mut` creates missing map levels on the way down
//! so a write always has a parent container to land in.

use crate::value::Value;
use smallvec::SmallVec;
use std::cmp::Ordering;
use thiserror::Error;

pub type Segments<'p> = SmallVec<[&'p str; 4]>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("an empty path does not address a slot")]
    EmptyPath,
    #[error("cannot write `{segment}` of `{path}` into a {kind} value")]
    NotAContainer {
        path: String,
        segment: String,
        kind: &'static str,
    },
    #[error("`{segment}` of `{path}` is not a list index")]
    InvalidIndex { path: String, segment: String },
    #[error("index {index} of `{path}` is out of range for a list of length {len}")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Split a path into its segments. The empty path has none.
pub fn segments(path: &str) -> Segments<'_> {
    if path.is_empty() {
        SmallVec::new()
    } else {
        path.split('.').collect()
    }
}

/// Read-only lookup.
pub fn get<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    segments(path)
        .iter()
        .try_fold(root, |value, segment| value.child(segment))
}

/// Result of a read-only resolution.
///
/// For an existing path `container[key] == value`. When the path runs past
/// the existing structure, `value` is `None`, `key` is the last segment and
/// `container` is the nearest existing container on the way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'v, 'p> {
    pub value: Option<&'v Value>,
    pub key: Option<&'p str>,
    pub container: Option<&'v Value>,
}

pub fn resolve<'v, 'p>(root: &'v Value, path: &'p str) -> Resolved<'v, 'p> {
    let segments = segments(path);
    let Some((&last, parents)) = segments.split_last() else {
        return Resolved {
            value: Some(root),
            key: None,
            container: None,
        };
    };
    let mut container = root;
    for segment in parents {
        match container.child(segment) {
            Some(next) if next.is_container() => container = next,
            _ => {
                return Resolved {
                    value: None,
                    key: Some(last),
                    container: Some(container),
                };
            }
        }
    }
    Resolved {
        value: container.child(last),
        key: Some(last),
        container: Some(container),
    }
}

/// Whether the terminal segment is an own key (or in-range index) of its
/// parent. Missing intermediate levels mean `false`; nothing is created.
pub fn exists(root: &Value, path: &str) -> bool {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    parents
        .iter()
        .try_fold(root, |value, segment| value.child(segment))
        .is_some_and(|container| has_key(container, last))
}

fn has_key(container: &Value, key: &str) -> bool {
    match container {
        Value::Map(map) => map.contains_key(key),
        Value::List(items) => key.parse::<usize>().is_ok_and(|index| index < items.len()),
        _ => false,
    }
}

/// Write-through resolution: every missing map level is created as an empty
/// map, and a list accepts an index equal to its length (a new map is
/// appended). Scalars, dates and `null` are never overwritten on the way.
pub fn resolve_mut<'v, 'p>(root: &'v mut Value, path: &'p str) -> Result<Slot<'v, 'p>, PathError> {
    let segments = segments(path);
    let Some((&last, parents)) = segments.split_last() else {
        return Err(PathError::EmptyPath);
    };
    let mut container = root;
    for segment in parents {
        container = descend_or_create(container, segment, path)?;
    }
    if !container.is_container() {
        return Err(PathError::NotAContainer {
            path: path.to_owned(),
            segment: last.to_owned(),
            kind: container.kind(),
        });
    }
    Ok(Slot {
        container,
        key: last,
        path,
    })
}

fn descend_or_create<'v>(value: &'v mut Value, segment: &str, path: &str) -> Result<&'v mut Value, PathError> {
    match value {
        Value::Map(map) => Ok(map.entry(segment.to_owned()).or_insert_with(Value::map)),
        Value::List(items) => {
            let index = parse_index(segment, path)?;
            if index == items.len() {
                items.push(Value::map());
            }
            let len = items.len();
            items
                .get_mut(index)
                .ok_or_else(|| PathError::IndexOutOfRange {
                    path: path.to_owned(),
                    index,
                    len,
                })
        }
        other => Err(PathError::NotAContainer {
            path: path.to_owned(),
            segment: segment.to_owned(),
            kind: other.kind(),
        }),
    }
}

fn parse_index(segment: &str, path: &str) -> Result<usize, PathError> {
    segment.parse().map_err(|_| PathError::InvalidIndex {
        path: path.to_owned(),
        segment: segment.to_owned(),
    })
}

/// A `(container, key)` pair inside a tree, obtained from `resolve_mut`.
/// The container is always a map or a list.
#[derive(Debug)]
pub struct Slot<'v, 'p> {
    container: &'v mut Value,
    key: &'p str,
    path: &'p str,
}

impl<'v, 'p> Slot<'v, 'p> {
    pub fn key(&self) -> &'p str {
        self.key
    }

    pub fn container(&self) -> &Value {
        self.container
    }

    pub fn is_in_list(&self) -> bool {
        matches!(self.container, Value::List(_))
    }

    pub fn get(&self) -> Option<&Value> {
        self.container.child(self.key)
    }

    pub fn contains(&self) -> bool {
        has_key(self.container, self.key)
    }

    /// Store `value`, returning what was there. For a list, an index equal to
    /// the length appends.
    pub fn set(self, value: Value) -> Result<Option<Value>, PathError> {
        match self.container {
            Value::Map(map) => Ok(map.insert(self.key.to_owned(), value)),
            Value::List(items) => {
                let index = parse_index(self.key, self.path)?;
                match index.cmp(&items.len()) {
                    Ordering::Less => Ok(Some(std::mem::replace(&mut items[index], value))),
                    Ordering::Equal => {
                        items.push(value);
                        Ok(None)
                    }
                    Ordering::Greater => Err(PathError::IndexOutOfRange {
                        path: self.path.to_owned(),
                        index,
                        len: items.len(),
                    }),
                }
            }
            other => Err(PathError::NotAContainer {
                path: self.path.to_owned(),
                segment: self.key.to_owned(),
                kind: other.kind(),
            }),
        }
    }

    /// Push onto the list stored at the slot, or store `value` directly when
    /// the slot holds anything else (or nothing).
    pub fn append(self, value: Value) -> Result<(), PathError> {
        if let Some(Value::List(items)) = self.container.child_mut(self.key) {
            items.push(value);
            return Ok(());
        }
        self.set(value).map(drop)
    }

    /// Remove the entry: lists are spliced, maps keep the order of the rest.
    pub fn remove(self) -> Option<Value> {
        match self.container {
            Value::Map(map) => map.shift_remove(self.key),
            Value::List(items) => {
                let index = self.key.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        }
    }
}

/// `resolve_mut(root, path)?.set(value)`.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<Option<Value>, PathError> {
    resolve_mut(root, path)?.set(value)
}
