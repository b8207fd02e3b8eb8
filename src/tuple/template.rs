use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::common::{ShapeHash, TemplateId};
use crate::error::SpaceError;

use super::value::Value;
use super::{shape_of, Tuple};

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(1);

/// A single template field: a concrete value, a wildcard, or a predicate.
/// Wildcards and predicates are the "formals"; the shape hash ignores the
/// tag, only the field name counts.
#[derive(Clone)]
pub enum Pattern {
    Concrete(Value),
    Wildcard,
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl Pattern {
    pub fn predicate<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Pattern::Predicate(Arc::new(test))
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Pattern::Concrete(expected) => expected == value,
            Pattern::Wildcard => true,
            Pattern::Predicate(test) => test(value),
        }
    }
}

impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        Pattern::Concrete(value)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Concrete(value) => f.debug_tuple("Concrete").field(value).finish(),
            Pattern::Wildcard => write!(f, "Wildcard"),
            Pattern::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// The per-template condition. A producer that matches a waiting template
/// signals exactly this waiter. A signal only means "look again"; waits
/// re-check their surroundings after every wakeup.
pub(crate) struct Waiter {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn notify(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        *signalled = true;
        self.cond.notify_one();
    }

    /// Blocks until signalled or until the budget elapses (`None` blocks
    /// indefinitely). Consumes a pending signal either way.
    pub(crate) fn wait(&self, budget: Option<Duration>) {
        let mut signalled = self.signalled.lock().unwrap();
        match budget {
            None => {
                while !*signalled {
                    signalled = self.cond.wait(signalled).unwrap();
                }
            }
            Some(budget) => {
                let deadline = Instant::now() + budget;
                while !*signalled {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    signalled = self.cond.wait_timeout(signalled, deadline - now).unwrap().0;
                }
            }
        }
        *signalled = false;
    }
}

/// A tuple-shaped query. Each field is a [`Pattern`]; the destructive flag
/// records whether the template came from a `take` or a `get`. The unique id
/// lets a waiter be unregistered without affecting otherwise-equal siblings.
pub struct Template {
    fields: HashMap<String, Pattern>,
    destructive: bool,
    id: TemplateId,
    shape: ShapeHash,
    waiter: Waiter,
}

impl Template {
    pub(crate) fn new(
        fields: HashMap<String, Pattern>,
        destructive: bool,
    ) -> Result<Self, SpaceError> {
        if fields.is_empty() {
            return Err(SpaceError::InvalidTemplate("empty field map".to_owned()));
        }
        if fields.keys().any(|key| key.is_empty()) {
            return Err(SpaceError::InvalidTemplate("empty field name".to_owned()));
        }
        let shape = shape_of(fields.keys().map(String::as_str));
        Ok(Self {
            fields,
            destructive,
            id: NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed),
            shape,
            waiter: Waiter::new(),
        })
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn shape(&self) -> ShapeHash {
        self.shape
    }

    pub fn destructive(&self) -> bool {
        self.destructive
    }

    pub(crate) fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    /// The match relation: the key sets must be equal, and under every key
    /// the pattern must accept the tuple's value. Field order is irrelevant.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        if self.shape != tuple.shape() || self.fields.len() != tuple.fields().len() {
            return false;
        }
        self.fields.iter().all(|(key, pattern)| {
            tuple.get(key).map_or(false, |value| pattern.accepts(value))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{Pattern, Template, Waiter};
    use crate::tuple::value::Value;
    use crate::tuple::Tuple;

    fn tuple(pairs: &[(&str, Value)]) -> Tuple {
        let fields: HashMap<String, Value> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Tuple::new(fields).unwrap()
    }

    fn template(pairs: Vec<(&str, Pattern)>, destructive: bool) -> Template {
        let fields: HashMap<String, Pattern> = pairs
            .into_iter()
            .map(|(key, pattern)| (key.to_owned(), pattern))
            .collect();
        Template::new(fields, destructive).unwrap()
    }

    #[test]
    fn concrete_fields_match_on_value_and_type() {
        let subject = tuple(&[("price", Value::I64(10))]);

        let hit = template(vec![("price", Pattern::Concrete(Value::I64(10)))], false);
        assert!(hit.matches(&subject));

        let wrong_value = template(vec![("price", Pattern::Concrete(Value::I64(11)))], false);
        assert!(!wrong_value.matches(&subject));

        let wrong_type = template(vec![("price", Pattern::Concrete(Value::I32(10)))], false);
        assert!(!wrong_type.matches(&subject));
    }

    #[test]
    fn wildcards_match_anything_under_the_same_keys() {
        let subject = tuple(&[("name", Value::Str("v".to_owned())), ("age", Value::I64(22))]);

        let all_formal = template(
            vec![("name", Pattern::Wildcard), ("age", Pattern::Wildcard)],
            true,
        );
        assert!(all_formal.matches(&subject));

        let missing_key = template(vec![("name", Pattern::Wildcard)], true);
        assert!(!missing_key.matches(&subject));

        let extra_key = template(
            vec![
                ("name", Pattern::Wildcard),
                ("age", Pattern::Wildcard),
                ("city", Pattern::Wildcard),
            ],
            true,
        );
        assert!(!extra_key.matches(&subject));
    }

    #[test]
    fn predicates_are_applied_to_the_field_value() {
        let subject = tuple(&[("price", Value::I64(10))]);

        let above = template(
            vec![("price", Pattern::predicate(|v| v.as_i64() > 5))],
            true,
        );
        assert!(above.matches(&subject));

        let below = template(
            vec![("price", Pattern::predicate(|v| v.as_i64() > 50))],
            true,
        );
        assert!(!below.matches(&subject));
    }

    #[test]
    fn ids_are_unique() {
        let a = template(vec![("k", Pattern::Wildcard)], true);
        let b = template(vec![("k", Pattern::Wildcard)], true);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.shape(), b.shape());
    }

    #[test]
    fn waiter_times_out_without_a_signal() {
        let waiter = Waiter::new();
        let start = Instant::now();
        waiter.wait(Some(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn waiter_wakes_on_notify() {
        let waiter = Waiter::new();
        thread::scope(|scope| {
            let waiter = &waiter;
            scope.spawn(move || {
                let start = Instant::now();
                waiter.wait(Some(Duration::from_secs(5)));
                assert!(start.elapsed() < Duration::from_secs(2));
            });
            scope.spawn(move || {
                thread::sleep(Duration::from_millis(50));
                waiter.notify();
            });
        });
    }

    #[test]
    fn pending_signal_is_consumed_by_the_next_wait() {
        let waiter = Waiter::new();
        waiter.notify();
        let start = Instant::now();
        waiter.wait(Some(Duration::from_secs(5)));
        // first wait returns immediately on the pending signal
        assert!(start.elapsed() < Duration::from_secs(1));
        waiter.wait(Some(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
