//! Core types for the callbacks registry
//!
//! This module defines the handle types shared by every part of the registry.
//! Handlers and scopes are compared by identity (the address of their shared
//! allocation), never by value, so two closures with identical bodies are
//! still two distinct handlers.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Result type for registry operations that run user code
pub type Result<T> = std::result::Result<T, CallbackError>;

/// A registered invocable callback
///
/// A `Handler` receives the scope it was registered with (if any) and the
/// arguments of the fire that triggered it. Cloning a `Handler` yields the
/// *same* handler: clones compare equal under [`Handler::ptr_eq`].
///
/// # Example
/// ```
/// use callbacks::Handler;
///
/// let handler: Handler<i32, ()> = Handler::new(|_, args: &[i32]| {
///     println!("fired with {:?}", args);
///     Ok(())
/// });
/// let alias = handler.clone();
/// assert!(handler.ptr_eq(&alias));
/// ```
pub struct Handler<A, S: ?Sized = dyn Any> {
    inner: Rc<dyn Fn(Option<&S>, &[A]) -> anyhow::Result<()>>,
}

impl<A, S: ?Sized> Handler<A, S> {
    /// Wrap a closure as a handler with a fresh identity
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&S>, &[A]) -> anyhow::Result<()> + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    /// True if both handles refer to the same handler
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    /// Invoke the handler bound to `scope`
    pub(crate) fn call(&self, scope: Option<&S>, args: &[A]) -> anyhow::Result<()> {
        (self.inner)(scope, args)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }
}

impl<A, S: ?Sized> Clone for Handler<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A, S: ?Sized> fmt::Debug for Handler<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.addr()).finish()
    }
}

/// Identity comparison for optional scopes
///
/// Two absent scopes are equal; two present scopes are equal only when they
/// point at the same allocation.
pub fn same_scope<S: ?Sized>(a: Option<&Rc<S>>, b: Option<&Rc<S>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const (),
        _ => false,
    }
}

/// What a call to [`Callbacks::remove`](crate::Callbacks::remove) should drop
///
/// The variant is picked from the type of the argument: a [`Handler`] (alone
/// or paired with a scope) removes one subscription, a bare scope removes every
/// subscription bound to it.
pub enum Target<'a, A, S: ?Sized = dyn Any> {
    /// Remove the subscription registered for this (handler, scope) pair
    Handler(&'a Handler<A, S>, Option<&'a Rc<S>>),
    /// Remove every subscription bound to this scope
    Scope(Option<&'a Rc<S>>),
}

impl<'a, A, S: ?Sized> From<&'a Handler<A, S>> for Target<'a, A, S> {
    fn from(handler: &'a Handler<A, S>) -> Self {
        Target::Handler(handler, None)
    }
}

impl<'a, A, S: ?Sized> From<(&'a Handler<A, S>, &'a Rc<S>)> for Target<'a, A, S> {
    fn from((handler, scope): (&'a Handler<A, S>, &'a Rc<S>)) -> Self {
        Target::Handler(handler, Some(scope))
    }
}

impl<'a, A, S: ?Sized> From<(&'a Handler<A, S>, Option<&'a Rc<S>>)> for Target<'a, A, S> {
    fn from((handler, scope): (&'a Handler<A, S>, Option<&'a Rc<S>>)) -> Self {
        Target::Handler(handler, scope)
    }
}

impl<'a, A, S: ?Sized> From<&'a Rc<S>> for Target<'a, A, S> {
    fn from(scope: &'a Rc<S>) -> Self {
        Target::Scope(Some(scope))
    }
}

/// Errors surfaced by the registry
///
/// The registry never fails on its own; every variant carries the error a
/// user-supplied handler or buffered action returned.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("handler at position {position} failed: {source}")]
    Handler {
        /// Index of the failing handler within the delivery snapshot
        position: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("buffered action failed: {0}")]
    Action(#[source] anyhow::Error),
}

impl CallbackError {
    /// Wrap a failure from the handler at `position` of a delivery snapshot
    ///
    /// A `CallbackError` raised by a nested registry call inside the handler
    /// is passed through unchanged rather than wrapped again.
    pub fn from_handler(position: usize, source: anyhow::Error) -> Self {
        source
            .downcast::<CallbackError>()
            .unwrap_or_else(|source| CallbackError::Handler { position, source })
    }

    /// Wrap a failure from a buffered action, passing nested `CallbackError`s through
    pub fn from_action(source: anyhow::Error) -> Self {
        source
            .downcast::<CallbackError>()
            .unwrap_or_else(CallbackError::Action)
    }

    /// The error returned by the user's handler or action
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            CallbackError::Handler { source, .. } => source,
            CallbackError::Action(source) => source,
        }
    }

    /// Unwrap into the error returned by the user's handler or action
    pub fn into_cause(self) -> anyhow::Error {
        match self {
            CallbackError::Handler { source, .. } => source,
            CallbackError::Action(source) => source,
        }
    }
}
