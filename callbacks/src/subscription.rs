//! Subscription records
//!
//! A subscription pairs a handler with the scope it is bound to. The
//! (handler, scope) pair is the subscription's identity: the registry holds at
//! most one subscription per pair.

use crate::types::{same_scope, Handler};
use std::fmt;
use std::rc::Rc;

/// How long a subscription stays registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionKind {
    /// Stays registered until removed
    Persistent,
    /// Removed right after its first successful invocation
    Once,
}

/// One registered interest
pub(crate) struct Subscription<A, S: ?Sized> {
    /// The caller's handler. For `Once` subscriptions this is still the
    /// original handler, so removal by the caller's handle matches.
    handler: Handler<A, S>,
    scope: Option<Rc<S>>,
    kind: SubscriptionKind,
}

impl<A, S: ?Sized> Subscription<A, S> {
    pub(crate) fn new(handler: Handler<A, S>, scope: Option<Rc<S>>, kind: SubscriptionKind) -> Self {
        Self {
            handler,
            scope,
            kind,
        }
    }

    pub(crate) fn handler(&self) -> &Handler<A, S> {
        &self.handler
    }

    pub(crate) fn scope(&self) -> Option<&Rc<S>> {
        self.scope.as_ref()
    }

    pub(crate) fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Identity match on both handler and scope
    pub(crate) fn matches(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> bool {
        self.is_bound_to(scope) && self.handler.ptr_eq(handler)
    }

    pub(crate) fn is_bound_to(&self, scope: Option<&Rc<S>>) -> bool {
        same_scope(self.scope.as_ref(), scope)
    }

    /// Call the handler bound to this subscription's scope
    pub(crate) fn invoke(&self, args: &[A]) -> anyhow::Result<()> {
        self.handler.call(self.scope.as_deref(), args)
    }
}

impl<A, S: ?Sized> Clone for Subscription<A, S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            scope: self.scope.clone(),
            kind: self.kind,
        }
    }
}

impl<A, S: ?Sized> fmt::Debug for Subscription<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handler", &self.handler)
            .field("scoped", &self.scope.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}
