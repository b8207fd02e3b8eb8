use std::sync::Arc;

use dashmap::DashMap;
use lazy_static::lazy_static;

use crate::common::DEFAULT_SPACE;
use crate::space::Space;

lazy_static! {
    static ref SPACES: DashMap<String, Arc<Space>> = DashMap::new();
}

/// Returns the space registered under `name`, creating it atomically if it
/// does not exist yet.
pub fn space(name: &str) -> Arc<Space> {
    Arc::clone(
        &SPACES
            .entry(name.to_owned())
            .or_insert_with(|| Space::new(name)),
    )
}

/// The space registered under the default name.
pub fn default_space() -> Arc<Space> {
    space(DEFAULT_SPACE)
}

/// Closes the named space and removes it from the registry. Unknown names
/// are ignored.
pub fn close_space(name: &str) {
    if let Some((_, space)) = SPACES.remove(name) {
        space.close();
    }
}

/// Closes and removes every registered space.
pub fn close_all() {
    let names: Vec<String> = SPACES.iter().map(|entry| entry.key().clone()).collect();
    for name in names {
        close_space(&name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{close_space, space};

    #[test]
    fn same_name_returns_the_same_space() {
        let a = space("registry-same");
        let b = space("registry-same");
        assert!(Arc::ptr_eq(&a, &b));
        close_space("registry-same");
    }

    #[test]
    fn closing_removes_the_space() {
        let a = space("registry-close");
        close_space("registry-close");
        assert!(a.is_shutting_down());

        // a new lookup creates a fresh, open space
        let b = space("registry-close");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!b.is_shutting_down());
        close_space("registry-close");
    }

    #[test]
    fn closing_unknown_names_is_ignored() {
        close_space("registry-never-created");
    }
}
