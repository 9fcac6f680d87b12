//! Observable state built on top of a callbacks registry
//!
//! Run with: `RUST_LOG=trace cargo run --example observable_state`

use anyhow::Result;
use callbacks::{Callbacks, CallbacksConfig, Handler};
use std::cell::RefCell;
use std::rc::Rc;

/// A value that notifies subscribers with (old, new) whenever it changes
struct Observable<T: Clone + PartialEq + 'static> {
    value: RefCell<T>,
    changed: Callbacks<T, str>,
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    fn new(name: &str, value: T) -> Self {
        Self {
            value: RefCell::new(value),
            changed: Callbacks::with_config(CallbacksConfig::new().with_name(name)),
        }
    }

    fn get(&self) -> T {
        self.value.borrow().clone()
    }

    fn set(&self, value: T) -> Result<()> {
        let old = self.value.replace(value.clone());
        if old != value {
            self.changed.fire(&[old, value])?;
        }
        Ok(())
    }

    /// Apply several updates, notifying subscribers once at the end
    fn transaction<F>(&self, updates: F) -> Result<()>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        self.changed.buffer(|| updates(self))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    log::info!("callbacks v{}", callbacks::VERSION);

    let total = Observable::new("cart-total", 0u32);

    let widget: Rc<str> = Rc::from("total-widget");
    let render = Handler::new(|scope: Option<&str>, change: &[u32]| {
        println!("[{}] total {} -> {}", scope.unwrap_or("?"), change[0], change[1]);
        Ok(())
    });
    total.changed.add(&render, Some(&widget));

    let audit_log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&audit_log);
    let audit = Handler::new(move |_, change: &[u32]| {
        sink.borrow_mut().push((change[0], change[1]));
        Ok(())
    });
    total.changed.once(&audit, None);

    total.set(10)?;
    total.set(10)?; // Unchanged, nothing fired

    total.transaction(|t| {
        t.set(25)?;
        t.set(40)?;
        t.set(42)
    })?;

    total.changed.remove(&widget);
    total.set(0)?;

    println!("final total: {}", total.get());
    println!("audit log: {:?}", audit_log.borrow());
    println!("stats: {:?}", total.changed.stats());

    Ok(())
}
