//! An in-process associative tuplespace in the Linda tradition. Concurrent
//! threads coordinate by publishing immutable tuples into a shared [`Space`]
//! and retrieving them by value-pattern matching, destructively ([`Space::take`])
//! or not ([`Space::get`]), with blocking retrieval, per-tuple TTLs and a
//! two-phase transactional overlay ([`Transaction`]).

mod common;
mod error;
mod expiry;
mod store;

pub mod concurrency;
pub mod registry;
pub mod space;
pub mod tuple;

pub use common::{ShapeHash, TemplateId, TransactionId};
pub use common::{DEFAULT_SPACE, FOREVER, NO_WAIT, WAIT_FOREVER};
pub use concurrency::Transaction;
pub use error::SpaceError;
pub use space::{Space, SpaceStats};
pub use tuple::template::{Pattern, Template};
pub use tuple::value::Value;
pub use tuple::Tuple;
