use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Identifiable;

/// Kind of mutation reported to listeners.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    /// An entry was added.
    Add,
    /// An entry was removed.
    Remove,
    /// An entry was replaced. Bags never emit it; rollback rejects it.
    Update,
}

/// A single mutation of a bag.
///
/// For additions `key` and `new_value` hold the added entry; for removals
/// `key` and `old_value` hold the removed one.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Mutation kind.
    pub kind: ChangeKind,
    /// The entry the event is about.
    pub key: Identifiable,
    /// Value after the mutation.
    pub new_value: Option<Identifiable>,
    /// Value before the mutation.
    pub old_value: Option<Identifiable>,
}

impl ChangeEvent {
    /// Event for an added entry.
    pub fn add(value: Identifiable) -> Self {
        Self {
            kind: ChangeKind::Add,
            key: value.clone(),
            new_value: Some(value),
            old_value: None,
        }
    }

    /// Event for a removed entry.
    pub fn remove(value: Identifiable) -> Self {
        Self {
            kind: ChangeKind::Remove,
            key: value.clone(),
            new_value: None,
            old_value: Some(value),
        }
    }
}

/// Receives bag mutations synchronously, in registration order.
pub trait ChangeListener: Send + Sync {
    /// Called after the mutation has been applied.
    fn on_change(&self, event: &ChangeEvent);
}

/// A listener that keeps every event it sees, e.g. to roll a bag back later.
#[derive(Debug, Default)]
pub struct ChangeLog {
    events: Mutex<Vec<ChangeEvent>>,
}

impl ChangeLog {
    /// Copies the recorded events.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Moves the recorded events out, leaving the log empty.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ChangeListener for ChangeLog {
    fn on_change(&self, event: &ChangeEvent) {
        self.events.lock().push(event.clone());
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<Arc<dyn ChangeListener>>,
}

impl Listeners {
    pub fn add(&mut self, listener: Arc<dyn ChangeListener>) {
        self.entries.push(listener);
    }

    /// Removes the first registration of this exact listener instance.
    pub fn remove(&mut self, listener: &Arc<dyn ChangeListener>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        match self
            .entries
            .iter()
            .position(|l| std::ptr::eq(Arc::as_ptr(l) as *const (), target))
        {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn fire(&self, event: &ChangeEvent) {
        for listener in &self.entries {
            listener.on_change(event);
        }
    }

    pub fn as_slice(&self) -> &[Arc<dyn ChangeListener>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
