use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::common::ShapeHash;
use crate::tuple::template::Template;
use crate::tuple::Tuple;

/// In-memory associative index over tuples and waiting templates, bucketed
/// by shape hash.
///
/// Tuples within a bucket sit in an insertion order randomised at insert
/// time; together with the first-fit scan in [`TupleStore::get_match`] this
/// approximates nondeterministic selection among matching tuples without
/// collecting all matches. Templates are kept in FIFO registration order.
///
/// All operations are safe for concurrent callers; the map entries provide
/// the per-bucket critical sections, so a `get_match` scan is atomic with
/// respect to concurrent inserts and removals on the same bucket. Predicate
/// patterns run inside that critical section and must not call back into
/// the store.
pub struct TupleStore {
    tuples: DashMap<ShapeHash, Vec<Tuple>>,
    templates: DashMap<ShapeHash, Vec<Arc<Template>>>,
}

impl TupleStore {
    pub fn new() -> Self {
        Self {
            tuples: DashMap::new(),
            templates: DashMap::new(),
        }
    }

    /// Places the tuple at a uniformly random index of its shape bucket.
    pub fn store_tuple(&self, tuple: Tuple) {
        match self.tuples.entry(tuple.shape()) {
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                let at = rand::thread_rng().gen_range(0..=bucket.len());
                bucket.insert(at, tuple);
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![tuple]);
            }
        }
    }

    /// Appends the template to its shape bucket (FIFO).
    pub fn store_template(&self, template: Arc<Template>) {
        self.templates
            .entry(template.shape())
            .or_default()
            .push(template);
    }

    /// Removes one tuple equal to `tuple`, dropping the bucket if emptied.
    /// Absence is tolerated.
    pub fn remove_tuple(&self, tuple: &Tuple) {
        if let Entry::Occupied(mut entry) = self.tuples.entry(tuple.shape()) {
            let bucket = entry.get_mut();
            if let Some(pos) = bucket.iter().position(|candidate| candidate == tuple) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                entry.remove();
            }
        }
    }

    /// Removes the template with this unique id, dropping the bucket if
    /// emptied. Absence is tolerated.
    pub fn remove_template(&self, template: &Template) {
        if let Entry::Occupied(mut entry) = self.templates.entry(template.shape()) {
            let bucket = entry.get_mut();
            if let Some(pos) = bucket
                .iter()
                .position(|candidate| candidate.id() == template.id())
            {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                entry.remove();
            }
        }
    }

    /// First-fit scan of the template's shape bucket. On a hit the tuple is
    /// removed when `destroy` is set, and the template is unregistered
    /// either way.
    pub fn get_match(&self, template: &Template, destroy: bool) -> Option<Tuple> {
        let mut found = None;
        if let Entry::Occupied(mut entry) = self.tuples.entry(template.shape()) {
            let bucket = entry.get_mut();
            if let Some(pos) = bucket.iter().position(|tuple| template.matches(tuple)) {
                found = Some(if destroy {
                    bucket.remove(pos)
                } else {
                    bucket[pos].clone()
                });
            }
            if bucket.is_empty() {
                entry.remove();
            }
        }
        if found.is_some() {
            self.remove_template(template);
        }
        found
    }

    /// Matching templates for a freshly stored tuple, in registration order.
    /// A single tuple can satisfy at most one destructive taker, so the scan
    /// stops after the first destructive template, inclusive.
    pub fn waiting_templates(&self, tuple: &Tuple) -> Vec<Arc<Template>> {
        let mut woken = Vec::new();
        if let Some(bucket) = self.templates.get(&tuple.shape()) {
            for template in bucket.iter() {
                if template.matches(tuple) {
                    woken.push(Arc::clone(template));
                    if template.destructive() {
                        break;
                    }
                }
            }
        }
        woken
    }

    /// Snapshot of all stored tuples.
    pub fn all_tuples(&self) -> Vec<Tuple> {
        self.tuples
            .iter()
            .flat_map(|bucket| bucket.value().clone())
            .collect()
    }

    /// Snapshot of all registered templates.
    pub fn all_templates(&self) -> Vec<Arc<Template>> {
        self.templates
            .iter()
            .flat_map(|bucket| bucket.value().clone())
            .collect()
    }

    /// Drops all tuples and templates.
    pub fn delete_storage(&self) {
        self.tuples.clear();
        self.templates.clear();
    }

    /// Tuple bucket sizes per shape hash, sorted for a stable snapshot.
    pub fn tuple_bucket_counts(&self) -> Vec<(ShapeHash, usize)> {
        let mut counts: Vec<(ShapeHash, usize)> = self
            .tuples
            .iter()
            .map(|bucket| (*bucket.key(), bucket.value().len()))
            .collect();
        counts.sort_unstable();
        counts
    }

    /// Template bucket sizes per shape hash, sorted for a stable snapshot.
    pub fn template_bucket_counts(&self) -> Vec<(ShapeHash, usize)> {
        let mut counts: Vec<(ShapeHash, usize)> = self
            .templates
            .iter()
            .map(|bucket| (*bucket.key(), bucket.value().len()))
            .collect();
        counts.sort_unstable();
        counts
    }
}

impl Default for TupleStore {
    fn default() -> Self {
        Self::new()
    }
}
