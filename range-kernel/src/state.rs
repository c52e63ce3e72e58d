use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable value published behind a read/write guard. Readers clone the
/// `Arc` and drop the guard right away, writers swap the whole value.
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self { current: RwLock::new(Arc::new(value)) }
    }

    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Returns the previous value.
    pub fn replace(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
