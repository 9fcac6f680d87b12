//! Subscription registry
//!
//! This module provides [`Callbacks`], the registry handlers subscribe to.
//! All state sits behind `RefCell`/`Cell` so that a handler holding an
//! `Rc<Callbacks>` can add, remove or fire on the same registry while it is
//! being invoked.
//!
//! Two rules keep that reentrancy safe:
//! 1. Delivery iterates over a snapshot of the subscription list taken before
//!    the first handler runs.
//! 2. No `RefCell` borrow is held while user code runs, including the drop
//!    glue of removed handlers and scopes.

use crate::config::CallbacksConfig;
use crate::stats::{Counters, RegistryStats};
use crate::subscription::{Subscription, SubscriptionKind};
use crate::types::{CallbackError, Handler, Result, Target};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Registry of handlers for a single implicit channel
///
/// `A` is the argument type of a fire (each fire carries a slice of them),
/// `S` the scope type handlers are bound to.
///
/// # Example
/// ```
/// use callbacks::{Callbacks, Handler};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let callbacks: Callbacks<u32, Cell<u32>> = Callbacks::new();
/// let total = Rc::new(Cell::new(0));
/// let handler = Handler::new(|scope: Option<&Cell<u32>>, args: &[u32]| {
///     if let Some(total) = scope {
///         total.set(total.get() + args.iter().sum::<u32>());
///     }
///     Ok(())
/// });
///
/// callbacks
///     .add(&handler, Some(&total))
///     .fire(&[1, 2])?
///     .fire(&[3])?;
/// assert_eq!(total.get(), 6);
/// # Ok::<(), callbacks::CallbackError>(())
/// ```
pub struct Callbacks<A, S: ?Sized = dyn Any> {
    /// Live subscriptions in firing order
    subscriptions: RefCell<Vec<Subscription<A, S>>>,
    /// Number of nested buffered sections currently open
    buffer_depth: Cell<usize>,
    /// Arguments of the most recent fire received while buffering
    pending: RefCell<Option<Vec<A>>>,
    counters: Counters,
    config: CallbacksConfig,
}

impl<A, S: ?Sized> Callbacks<A, S> {
    /// Create an empty registry with default settings
    pub fn new() -> Self {
        Self::with_config(CallbacksConfig::default())
    }

    /// Create an empty registry with the given settings
    pub fn with_config(config: CallbacksConfig) -> Self {
        Self {
            subscriptions: RefCell::new(Vec::with_capacity(config.initial_capacity)),
            buffer_depth: Cell::new(0),
            pending: RefCell::new(None),
            counters: Counters::new(config.track_stats),
            config,
        }
    }

    /// Register `handler` bound to `scope`
    ///
    /// Does nothing if the same (handler, scope) pair is already registered,
    /// whether through `add` or `once`.
    pub fn add(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> &Self {
        self.register(handler, scope, SubscriptionKind::Persistent)
    }

    /// Alias for [`add`](Self::add)
    pub fn on(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> &Self {
        self.add(handler, scope)
    }

    /// Register `handler` bound to `scope` for a single delivery
    ///
    /// The subscription is removed right after the handler returns `Ok`. It
    /// can also be removed beforehand with the same `handler` handle.
    pub fn once(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> &Self {
        self.register(handler, scope, SubscriptionKind::Once)
    }

    /// Alias for [`once`](Self::once)
    pub fn one(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> &Self {
        self.once(handler, scope)
    }

    /// Unsubscribe a handler or an entire scope
    ///
    /// ```
    /// use callbacks::{Callbacks, Handler, Target};
    /// use std::rc::Rc;
    ///
    /// let callbacks: Callbacks<(), str> = Callbacks::new();
    /// let handler = Handler::new(|_, _| Ok(()));
    /// let scope: Rc<str> = Rc::from("panel");
    ///
    /// callbacks.add(&handler, None).add(&handler, Some(&scope));
    /// callbacks.remove(&handler); // the unscoped one
    /// callbacks.remove(&scope); // everything bound to `scope`
    /// callbacks.remove(Target::Scope(None)); // everything unscoped
    /// assert!(callbacks.is_empty());
    /// ```
    pub fn remove<'t>(&self, target: impl Into<Target<'t, A, S>>) -> &Self
    where
        A: 't,
        S: 't,
    {
        match target.into() {
            Target::Handler(handler, scope) => self.remove_handler(handler, scope),
            Target::Scope(scope) => self.remove_scope(scope),
        }
    }

    /// Alias for [`remove`](Self::remove)
    pub fn off<'t>(&self, target: impl Into<Target<'t, A, S>>) -> &Self
    where
        A: 't,
        S: 't,
    {
        self.remove(target)
    }

    /// Remove the subscription registered for (`handler`, `scope`), if any
    pub fn remove_handler(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> &Self {
        let removed = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let index = subscriptions.iter().position(|s| s.matches(handler, scope));
            index.map(|index| subscriptions.remove(index))
        };

        if let Some(removed) = removed {
            log::debug!(
                "{}: removed {:?} subscription ({} left)",
                self.config.name,
                removed.kind(),
                self.len()
            );
        }
        self
    }

    /// Remove every subscription bound to `scope`, keeping the others in order
    pub fn remove_scope(&self, scope: Option<&Rc<S>>) -> &Self {
        let removed: Vec<Subscription<A, S>> = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscriptions)
                .into_iter()
                .partition(|s| s.is_bound_to(scope));
            *subscriptions = kept;
            removed
        };

        if !removed.is_empty() {
            log::debug!(
                "{}: removed {} subscription(s) by scope ({} left)",
                self.config.name,
                removed.len(),
                self.len()
            );
        }
        self
    }

    /// Drop every subscription
    ///
    /// Buffering depth and any pending payload are left untouched.
    pub fn remove_all(&self) -> &Self {
        let removed = std::mem::take(&mut *self.subscriptions.borrow_mut());
        log::debug!("{}: removed all {} subscription(s)", self.config.name, removed.len());
        self
    }

    /// Alias for [`remove_all`](Self::remove_all)
    pub fn empty(&self) -> &Self {
        self.remove_all()
    }

    /// True if (`handler`, `scope`) is currently registered
    pub fn contains(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>) -> bool {
        self.subscriptions
            .borrow()
            .iter()
            .any(|s| s.matches(handler, scope))
    }

    /// Number of registered subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// True if nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.subscriptions.borrow().is_empty()
    }

    /// Number of buffered sections currently open
    pub fn buffer_depth(&self) -> usize {
        self.buffer_depth.get()
    }

    /// True while inside at least one buffered section
    pub fn is_buffering(&self) -> bool {
        self.buffer_depth.get() > 0
    }

    /// True if a fire is waiting for the outermost buffered section to close
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Counters collected so far
    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot(self.len())
    }

    /// Settings this registry was created with
    pub fn config(&self) -> &CallbacksConfig {
        &self.config
    }

    fn register(&self, handler: &Handler<A, S>, scope: Option<&Rc<S>>, kind: SubscriptionKind) -> &Self {
        let total = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            if subscriptions.iter().any(|s| s.matches(handler, scope)) {
                None
            } else {
                subscriptions.push(Subscription::new(handler.clone(), scope.cloned(), kind));
                Some(subscriptions.len())
            }
        };

        match total {
            Some(total) => log::debug!("{}: added {:?} subscription ({} total)", self.config.name, kind, total),
            None => log::debug!("{}: ignoring duplicate {:?} subscription", self.config.name, kind),
        }
        self
    }

    /// Invoke every subscription of a fresh snapshot with `args`
    ///
    /// Stops at the first failing handler; the rest of the snapshot is skipped.
    /// Returns the number of subscribers the snapshot held.
    fn deliver(&self, args: &[A]) -> Result<usize> {
        let snapshot: Vec<Subscription<A, S>> = self.subscriptions.borrow().clone();
        if snapshot.is_empty() {
            log::trace!("{}: no subscribers, discarding fire", self.config.name);
            self.counters.discard();
            return Ok(0);
        }

        log::trace!(
            "{}: delivering {} argument(s) to {} subscriber(s)",
            self.config.name,
            args.len(),
            snapshot.len()
        );

        for (position, subscription) in snapshot.iter().enumerate() {
            subscription
                .invoke(args)
                .map_err(|source| CallbackError::from_handler(position, source))?;
            self.counters.delivery();

            if subscription.kind() == SubscriptionKind::Once {
                self.remove_handler(subscription.handler(), subscription.scope());
            }
        }
        Ok(snapshot.len())
    }

    /// Close one buffered section, flushing the pending payload on the last one
    fn leave_buffer(&self) -> Result<()> {
        let depth = self.buffer_depth.get().saturating_sub(1);
        self.buffer_depth.set(depth);
        if depth > 0 {
            return Ok(());
        }

        let pending = self.pending.borrow_mut().take();
        match pending {
            Some(args) => {
                log::trace!("{}: flushing buffered fire", self.config.name);
                if self.deliver(&args)? > 0 {
                    self.counters.flush();
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<A: Clone, S: ?Sized> Callbacks<A, S> {
    /// Fire the channel with `args`
    ///
    /// Outside a buffered section every current subscriber is invoked in
    /// registration order, over a snapshot taken before the first call. With
    /// no subscribers the fire is dropped. Inside a buffered section nothing is
    /// invoked; `args` replace whatever fire was pending.
    pub fn fire(&self, args: &[A]) -> Result<&Self> {
        self.counters.fire();

        if self.is_buffering() {
            log::trace!(
                "{}: buffering fire at depth {}",
                self.config.name,
                self.buffer_depth.get()
            );
            self.pending.replace(Some(args.to_vec()));
            self.counters.coalesce();
            return Ok(self);
        }

        self.deliver(args)?;
        Ok(self)
    }

    /// Alias for [`fire`](Self::fire)
    pub fn trigger(&self, args: &[A]) -> Result<&Self> {
        self.fire(args)
    }

    /// Run `action` with fires coalesced
    ///
    /// Every fire made while `action` runs (on this registry) only records its
    /// arguments. When the outermost buffered section closes, the most recent
    /// of them is delivered once. The close happens on every exit path: after
    /// `Ok`, after `Err`, and while a panic unwinds.
    ///
    /// A failing delivery takes precedence over the action's own error.
    ///
    /// ```
    /// use callbacks::{Callbacks, Handler};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let sink = Rc::clone(&seen);
    /// let callbacks: Callbacks<i32, ()> = Callbacks::new();
    /// callbacks.add(&Handler::new(move |_, args: &[i32]| {
    ///     sink.borrow_mut().push(args.to_vec());
    ///     Ok(())
    /// }), None);
    ///
    /// let answer = callbacks.buffer(|| {
    ///     callbacks.fire(&[1])?;
    ///     callbacks.fire(&[2])?;
    ///     Ok(42)
    /// })?;
    ///
    /// assert_eq!(answer, 42);
    /// assert_eq!(*seen.borrow(), vec![vec![2]]);
    /// # Ok::<(), callbacks::CallbackError>(())
    /// ```
    pub fn buffer<R, F>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> anyhow::Result<R>,
    {
        self.buffer_with(&(), |_| action())
    }

    /// Like [`buffer`](Self::buffer), passing `scope` to the action
    pub fn buffer_with<T, R, F>(&self, scope: &T, action: F) -> Result<R>
    where
        T: ?Sized,
        F: FnOnce(&T) -> anyhow::Result<R>,
    {
        self.buffer_depth.set(self.buffer_depth.get() + 1);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(scope)));
        let flushed = self.leave_buffer();

        match outcome {
            Ok(result) => {
                flushed?;
                result.map_err(CallbackError::from_action)
            }
            Err(payload) => {
                if let Err(e) = flushed {
                    log::warn!(
                        "{}: delivery failed while a buffered action was panicking: {}",
                        self.config.name,
                        e
                    );
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<A, S: ?Sized> Default for Callbacks<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S: ?Sized> fmt::Debug for Callbacks<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("name", &self.config.name)
            .field("subscriptions", &self.len())
            .field("buffer_depth", &self.buffer_depth.get())
            .field("pending", &self.has_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<Vec<i32>>>>;

    fn recorder() -> (Handler<i32, ()>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let handler = Handler::new(move |_, args: &[i32]| {
            sink.borrow_mut().push(args.to_vec());
            Ok(())
        });
        (handler, log)
    }

    #[test]
    fn test_add_is_idempotent() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();

        callbacks.add(&handler, None).add(&handler, None);
        assert_eq!(callbacks.len(), 1);

        callbacks.fire(&[]).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_add_and_once_share_identity() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, _) = recorder();

        callbacks.add(&handler, None).once(&handler, None);
        assert_eq!(callbacks.len(), 1);

        callbacks.remove_all().once(&handler, None).add(&handler, None);
        assert_eq!(callbacks.len(), 1);
        assert!(callbacks.contains(&handler, None));
    }

    #[test]
    fn test_once_fires_once() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();

        callbacks
            .once(&handler, None)
            .fire(&[1])
            .unwrap()
            .fire(&[2])
            .unwrap()
            .fire(&[3])
            .unwrap();

        assert_eq!(*log.borrow(), vec![vec![1]]);
        assert!(callbacks.is_empty());
    }

    #[test]
    fn test_once_removable_by_original_handler() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();

        callbacks.once(&handler, None).remove(&handler).fire(&[1]).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_fire_without_subscribers_is_not_remembered() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();

        callbacks.fire(&[1]).unwrap();
        callbacks.add(&handler, None).fire(&[2]).unwrap().fire(&[3]).unwrap();

        assert_eq!(*log.borrow(), vec![vec![2], vec![3]]);
        assert_eq!(callbacks.stats().discarded, 1);
    }

    #[test]
    fn test_failing_handler_stops_delivery() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (before, before_log) = recorder();
        let (after, after_log) = recorder();
        let failing: Handler<i32, ()> = Handler::new(|_, _| anyhow::bail!("handler exploded"));

        callbacks.add(&before, None).add(&failing, None).add(&after, None);
        let err = callbacks.fire(&[7]).unwrap_err();

        assert!(matches!(err, CallbackError::Handler { position: 1, .. }));
        assert_eq!(err.cause().to_string(), "handler exploded");
        assert_eq!(before_log.borrow().len(), 1);
        assert!(after_log.borrow().is_empty());
    }

    #[test]
    fn test_failing_once_handler_stays_registered() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let failing: Handler<i32, ()> = Handler::new(|_, _| anyhow::bail!("not yet"));

        callbacks.once(&failing, None);
        assert!(callbacks.fire(&[]).is_err());
        assert!(callbacks.contains(&failing, None));
    }

    #[test]
    fn test_nested_buffers_flush_on_outermost_close() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();
        callbacks.add(&handler, None);

        callbacks
            .buffer(|| {
                callbacks.fire(&[1])?;
                callbacks.buffer(|| {
                    callbacks.fire(&[2])?;
                    Ok(())
                })?;
                assert_eq!(callbacks.buffer_depth(), 1);
                assert!(log.borrow().is_empty()); // Inner close does not deliver
                callbacks.fire(&[3])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(*log.borrow(), vec![vec![3]]);
        assert_eq!(callbacks.buffer_depth(), 0);
        assert!(!callbacks.has_pending());
    }

    #[test]
    fn test_buffer_scope_is_passed_to_action() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, log) = recorder();
        callbacks.add(&handler, None);

        let doubled = callbacks
            .buffer_with(&21, |value: &i32| {
                callbacks.fire(&[*value])?;
                Ok(value * 2)
            })
            .unwrap();

        assert_eq!(doubled, 42);
        assert_eq!(*log.borrow(), vec![vec![21]]);
    }

    #[test]
    fn test_remove_all_keeps_pending_payload() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();
        callbacks.add(&first, None);

        callbacks
            .buffer(|| {
                callbacks.fire(&[5])?;
                callbacks.remove_all().add(&second, None);
                assert!(callbacks.has_pending());
                Ok(())
            })
            .unwrap();

        assert!(first_log.borrow().is_empty());
        assert_eq!(*second_log.borrow(), vec![vec![5]]);
    }

    #[test]
    fn test_stats() {
        let callbacks: Callbacks<i32, ()> = Callbacks::new();
        let (handler, _) = recorder();
        callbacks.add(&handler, None);

        callbacks.fire(&[1]).unwrap();
        callbacks
            .buffer(|| {
                callbacks.fire(&[2])?;
                callbacks.fire(&[3])?;
                Ok(())
            })
            .unwrap();

        let stats = callbacks.stats();
        assert_eq!(stats.subscriptions, 1);
        assert_eq!(stats.fires, 3);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.deliveries, 2);
    }

    #[test]
    fn test_debug_output() {
        let callbacks: Callbacks<i32, ()> =
            Callbacks::with_config(CallbacksConfig::new().with_name("selection"));
        let rendered = format!("{:?}", callbacks);

        assert!(rendered.contains("selection"));
        assert!(rendered.contains("buffer_depth: 0"));
    }
}
