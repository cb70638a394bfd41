//! Named publish/subscribe channel.
//!
//! Handlers are registered under one or more event names and run
//! synchronously, in registration order, the moment an event is dispatched.
//! A handler may hand back a pending future; the `Dispatch` returned to the
//! caller resolves once every such future has completed.

use futures_util::future::{self, FutureExt, LocalBoxFuture, TryJoinAll};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("event handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An event that knows the name it is dispatched under.
pub trait HubEvent {
    fn name(&self) -> &str;
}

/// What a handler returns.
pub enum Reply {
    Done,
    Failed(HandlerError),
    Pending(LocalBoxFuture<'static, Result<(), HandlerError>>),
}

impl Reply {
    pub fn pending(work: impl Future<Output = Result<(), HandlerError>> + 'static) -> Self {
        Reply::Pending(work.boxed_local())
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Done
    }
}

impl From<Result<(), HandlerError>> for Reply {
    fn from(result: Result<(), HandlerError>) -> Self {
        match result {
            Ok(()) => Reply::Done,
            Err(error) => Reply::Failed(error),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Done => write!(f, "Done"),
            Reply::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
            Reply::Pending(_) => write!(f, "Pending"),
        }
    }
}

pub type Handler<E> = Rc<dyn Fn(&E) -> Reply>;

/// Wrap a closure returning `()`, `Result<(), HandlerError>` or `Reply`.
///
/// Keep the returned `Rc` around to unsubscribe it later with `off`.
pub fn handler<E: 'static, R: Into<Reply> + 'static>(f: impl Fn(&E) -> R + 'static) -> Handler<E> {
    Rc::new(move |event: &E| f(event).into())
}

/// One event name or several.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventNames(SmallVec<[String; 2]>);

impl EventNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        Self(SmallVec::from_elem(name.to_owned(), 1))
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        Self(SmallVec::from_elem(name, 1))
    }
}

impl From<&[&str]> for EventNames {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|name| (*name).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        Self(names.into_iter().collect())
    }
}

pub struct EventHub<E> {
    subscriptions: RefCell<IndexMap<String, Vec<Handler<E>>>>,
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            subscriptions: RefCell::new(IndexMap::new()),
        }
    }
}

impl<E> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscriptions = self.subscriptions.borrow();
        f.debug_map()
            .entries(subscriptions.iter().map(|(name, handlers)| (name, handlers.len())))
            .finish()
    }
}

impl<E: HubEvent> EventHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under every name. Registering twice means running twice.
    pub fn on(&self, names: impl Into<EventNames>, handler: Handler<E>) {
        let mut subscriptions = self.subscriptions.borrow_mut();
        for name in names.into().iter() {
            subscriptions
                .entry(name.to_owned())
                .or_default()
                .push(handler.clone());
        }
    }

    /// Without a handler every registration under the names is dropped;
    /// with one, only its first registration per name.
    pub fn off(&self, names: impl Into<EventNames>, handler: Option<&Handler<E>>) {
        let mut subscriptions = self.subscriptions.borrow_mut();
        for name in names.into().iter() {
            let Some(handler) = handler else {
                subscriptions.shift_remove(name);
                continue;
            };
            if let Some(handlers) = subscriptions.get_mut(name) {
                if let Some(position) = handlers.iter().position(|h| Rc::ptr_eq(h, handler)) {
                    handlers.remove(position);
                }
            }
        }
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.subscriptions.borrow().get(name).map_or(0, Vec::len)
    }

    /// Run every handler registered under `event.name()`.
    ///
    /// All handlers have been invoked when this returns. Pending replies only
    /// make progress while the returned `Dispatch` is polled.
    pub fn dispatch(&self, event: &E) -> Dispatch {
        // Snapshot, so handlers may subscribe or unsubscribe while running.
        let handlers = self
            .subscriptions
            .borrow()
            .get(event.name())
            .cloned()
            .unwrap_or_default();
        log::trace!("dispatching `{}` to {} handler(s)", event.name(), handlers.len());
        let replies: Vec<Reply> = handlers.iter().map(|handler| handler(event)).collect();
        Dispatch::from_replies(replies)
    }
}

type Settled = LocalBoxFuture<'static, Result<usize, HandlerError>>;

/// Completion of one or more dispatches.
///
/// Resolves to the number of handlers that ran, or to the first handler
/// error. Dropping it is fine; the handlers have already been invoked.
#[pin_project::pin_project]
pub struct Dispatch {
    #[pin]
    inner: TryJoinAll<Settled>,
}

impl Dispatch {
    /// A dispatch that reached nobody.
    pub fn none() -> Self {
        Self::from_parts(Vec::new())
    }

    /// Merge several dispatches into one.
    pub fn all(dispatches: impl IntoIterator<Item = Dispatch>) -> Self {
        Self::from_parts(dispatches.into_iter().map(FutureExt::boxed_local).collect())
    }

    fn from_replies(replies: Vec<Reply>) -> Self {
        let parts = replies
            .into_iter()
            .map(|reply| match reply {
                Reply::Done => future::ready(Ok(1)).boxed_local(),
                Reply::Failed(error) => future::ready(Err(error)).boxed_local(),
                Reply::Pending(work) => work.map(|result| result.map(|()| 1)).boxed_local(),
            })
            .collect();
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<Settled>) -> Self {
        Self {
            inner: future::try_join_all(parts),
        }
    }
}

impl Future for Dispatch {
    type Output = Result<usize, HandlerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project()
            .inner
            .poll(cx)
            .map_ok(|counts| counts.into_iter().sum())
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}
