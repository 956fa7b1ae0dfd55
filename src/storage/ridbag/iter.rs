use std::iter::FusedIterator;

use crate::types::{Identifiable, Result};

use super::owner::resolve;
use super::RidBag;

/// Cursor over a bag's entries in chain order, then slot order.
///
/// Nodes are loaded as the cursor reaches them. A load failure is yielded
/// once and ends the iteration.
pub struct RidBagIter<'a> {
    bag: &'a mut RidBag,
    at: usize,
    slot: usize,
    resolve: bool,
    done: bool,
}

impl<'a> Iterator for RidBagIter<'a> {
    type Item = Result<Identifiable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let Some(handle) = self.bag.chain.get(self.at) else {
                self.done = true;
                return None;
            };
            if let Err(err) = self.bag.load_node(handle) {
                self.done = true;
                return Some(Err(err));
            }
            let node = &self.bag.arena[handle];
            if self.slot < node.current_index() {
                let entry = match node.get_at(self.slot) {
                    Ok(entry) => entry.clone(),
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                };
                self.slot += 1;
                return Some(Ok(match (&self.bag.options.loader, self.resolve) {
                    (Some(loader), true) => resolve(loader.as_ref(), entry),
                    _ => entry,
                }));
            }
            self.at += 1;
            self.slot = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.bag.len()))
        }
    }
}

impl<'a> FusedIterator for RidBagIter<'a> {}

impl RidBag {
    /// Iterates the entries. With auto-convert enabled and a loader
    /// configured, links are yielded as their resolved records.
    pub fn iter(&mut self) -> RidBagIter<'_> {
        let resolve = self.auto_convert_to_record;
        self.iter_with(resolve)
    }

    /// Iterates the entries exactly as stored.
    pub fn raw_iter(&mut self) -> RidBagIter<'_> {
        self.iter_with(false)
    }

    /// Collects the stored entries.
    pub fn to_vec(&mut self) -> Result<Vec<Identifiable>> {
        self.raw_iter().collect()
    }

    fn iter_with(&mut self, resolve: bool) -> RidBagIter<'_> {
        RidBagIter {
            bag: self,
            at: 0,
            slot: 0,
            resolve,
            done: false,
        }
    }
}
