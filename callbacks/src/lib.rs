//! Callbacks Library
//!
//! A minimal in-process publish/subscribe registry. Handlers subscribe to a
//! single implicit channel, the channel is fired with a slice of arguments,
//! and fires can be buffered so that a burst of them reaches subscribers as a
//! single notification.
//!
//! # Architecture
//!
//! The library is one self-contained primitive, meant to be embedded in other
//! components as the building block of observable state:
//! - Subscriptions are identified by (handler, scope) *identity*, so adding the
//!   same pair twice is a no-op
//! - Delivery iterates over a snapshot, so handlers may add, remove or fire on
//!   the registry they are being called from
//! - Buffered sections coalesce fires and deliver the last one when the
//!   outermost section closes, on every exit path
//!
//! The library does NOT:
//! - Route between named channels or topics
//! - Defer delivery to a later time slice
//! - Deliver across threads (`Callbacks` is neither `Send` nor `Sync`)
//!
//! # Example Usage
//!
//! ```
//! use callbacks::{Callbacks, Handler};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let handler: Handler<i32, ()> = Handler::new(move |_, args: &[i32]| {
//!     sink.borrow_mut().push(args.to_vec());
//!     Ok(())
//! });
//!
//! let callbacks: Callbacks<i32, ()> = Callbacks::new();
//! callbacks.add(&handler, None).fire(&[1, 2])?;
//!
//! // Only the last fire of a buffered section is delivered
//! callbacks.buffer(|| {
//!     callbacks.fire(&[3])?;
//!     callbacks.fire(&[4])?;
//!     Ok(())
//! })?;
//!
//! callbacks.remove(&handler).fire(&[5])?;
//! assert_eq!(*seen.borrow(), vec![vec![1, 2], vec![4]]);
//! # Ok::<(), callbacks::CallbackError>(())
//! ```

// Public modules
pub mod config;
pub mod registry;
pub mod stats;
pub mod types;

// Re-export main types for convenience
pub use config::CallbacksConfig;
pub use registry::Callbacks;
pub use stats::RegistryStats;
pub use types::{same_scope, CallbackError, Handler, Result, Target};

// Internal modules (not exposed in public API)
mod subscription;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
