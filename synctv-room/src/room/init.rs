use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

enum InitState<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
}

/// Exactly-once slot for state built after construction.
///
/// The first caller of [`InitCell::get_or_init`] runs the initializer; racing
/// callers block until it finishes and then observe the same value.
pub struct InitCell<T> {
    state: Mutex<InitState<T>>,
    ready: Condvar,
}

impl<T> InitCell<T> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(InitState::Uninitialized),
            ready: Condvar::new(),
        }
    }

    /// Returns the value and whether this call produced it
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> (Arc<T>, bool) {
        let mut state = self.state.lock();
        loop {
            match &*state {
                InitState::Ready(value) => return (value.clone(), false),
                InitState::Initializing => self.ready.wait(&mut state),
                InitState::Uninitialized => break,
            }
        }
        *state = InitState::Initializing;
        drop(state);

        let guard = ResetOnUnwind { cell: self };
        let value = Arc::new(init());
        std::mem::forget(guard);

        let mut state = self.state.lock();
        *state = InitState::Ready(value.clone());
        drop(state);
        self.ready.notify_all();
        (value, true)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.state.lock() {
            InitState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), InitState::Ready(_))
    }
}

/// Hands the cell back to the next caller if the initializer panics
struct ResetOnUnwind<'a, T> {
    cell: &'a InitCell<T>,
}

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        *self.cell.state.lock() = InitState::Uninitialized;
        self.cell.ready.notify_all();
    }
}

impl<T> Default for InitCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
