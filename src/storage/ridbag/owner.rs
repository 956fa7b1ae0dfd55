use std::sync::Arc;

use crate::types::{same_allocation, Identifiable, Record, Result, Rid, RidBagError};

use super::RidBag;

/// Collaborator told which entries a record currently references.
pub trait RecordTracker: Send + Sync {
    /// `owner` now references `entry`.
    fn track(&self, owner: &Arc<dyn Record>, entry: &Identifiable);
    /// `owner` no longer references `entry`.
    fn untrack(&self, owner: &Arc<dyn Record>, entry: &Identifiable);
}

/// A [`RecordTracker`] that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopTracker;

impl RecordTracker for NoopTracker {
    fn track(&self, _owner: &Arc<dyn Record>, _entry: &Identifiable) {}
    fn untrack(&self, _owner: &Arc<dyn Record>, _entry: &Identifiable) {}
}

/// Resolves links to their in-memory records.
pub trait RecordLoader: Send + Sync {
    /// Returns the record stored under `rid`, if it can be resolved.
    fn load(&self, rid: Rid) -> Option<Arc<dyn Record>>;
}

fn same_record(a: &Arc<dyn Record>, b: &Arc<dyn Record>) -> bool {
    match (a.identity(), b.identity()) {
        (Some(x), Some(y)) => x == y,
        _ => same_allocation(a, b),
    }
}

/// Returns the record form of `entry` when `loader` resolves its link to a
/// record with the same identity.
pub(crate) fn resolve(loader: &dyn RecordLoader, entry: Identifiable) -> Identifiable {
    match entry {
        Identifiable::Link(rid) => match loader.load(rid) {
            Some(record) if record.identity() == Some(rid) => Identifiable::Record(record),
            _ => Identifiable::Link(rid),
        },
        record => record,
    }
}

impl RidBag {
    /// The record this bag belongs to.
    pub fn owner(&self) -> Option<&Arc<dyn Record>> {
        self.owner.as_ref()
    }

    /// Attaches the bag to `owner`, or detaches it with `None`.
    ///
    /// Every entry is untracked under the previous owner and tracked under the
    /// new one. Replacing one owner with a different one is rejected with
    /// [`RidBagError::IllegalState`] and leaves the bag untouched.
    pub fn set_owner(&mut self, owner: Option<Arc<dyn Record>>) -> Result<()> {
        if let (Some(current), Some(next)) = (&self.owner, &owner) {
            if !same_record(current, next) {
                let who = current
                    .identity()
                    .map_or_else(|| "a transient record".to_string(), |rid| rid.to_string());
                return Err(RidBagError::IllegalState(format!(
                    "this bag is already owned by {who}; copy it to assign another owner"
                )));
            }
        }
        if self.owner.is_none() && owner.is_none() {
            return Ok(());
        }
        self.load_chain()?;

        let tracker = self.options.tracker.clone();
        if let Some(previous) = &self.owner {
            for handle in self.chain.handles() {
                for entry in self.arena[*handle].entries()? {
                    tracker.untrack(previous, entry);
                }
            }
        }
        self.owner = owner;
        if let Some(next) = &self.owner {
            for handle in self.chain.handles() {
                for entry in self.arena[*handle].entries()? {
                    tracker.track(next, entry);
                }
            }
        }
        Ok(())
    }

    /// Replaces every link that `loader` can resolve with its record.
    /// Unresolvable links stay as they are.
    pub fn convert_links_to_records(&mut self, loader: &dyn RecordLoader) -> Result<()> {
        self.load_chain()?;
        for at in 0..self.chain.len() {
            let Some(handle) = self.chain.get(at) else {
                break;
            };
            for slot in 0..self.arena[handle].current_index() {
                let Identifiable::Link(rid) = *self.arena[handle].get_at(slot)? else {
                    continue;
                };
                let resolved = resolve(loader, Identifiable::Link(rid));
                if resolved.is_record() {
                    self.arena[handle].set_at(resolved, slot)?;
                }
            }
        }
        Ok(())
    }

    /// Replaces every record with its link.
    ///
    /// Returns `Ok(false)` at the first record without an identity. Entries
    /// converted before that point stay converted.
    pub fn convert_records_to_links(&mut self) -> Result<bool> {
        self.load_chain()?;
        for at in 0..self.chain.len() {
            let Some(handle) = self.chain.get(at) else {
                break;
            };
            for slot in 0..self.arena[handle].current_index() {
                let identity = match self.arena[handle].get_at(slot)? {
                    Identifiable::Link(_) => continue,
                    Identifiable::Record(record) => record.identity(),
                };
                match identity {
                    Some(rid) => self.arena[handle].set_at(Identifiable::Link(rid), slot)?,
                    None => return Ok(false),
                }
            }
        }
        Ok(true)
    }

    /// Drops resolved records so the bag only holds links. Same contract as
    /// [`RidBag::convert_records_to_links`].
    pub fn detach(&mut self) -> Result<bool> {
        self.convert_records_to_links()
    }
}
