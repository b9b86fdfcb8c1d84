//! Streng typisierte Bezeichner für Konsolen und Clients.
//!
//! On the wire both ids are plain `int64`; inside the crates they are wrapped
//! so a console id can never be passed where a client id is expected.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Generator für inkrementelle IDs. The first id handed out is `start`.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    counter: Arc<AtomicI64>,
}

impl IdGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            counter: Arc::new(AtomicI64::new(start)),
        }
    }

    #[inline]
    pub fn next(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            /// Ids handed out by the server are always positive.
            pub const fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(ConsoleId);
id_type!(ClientId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_starts_at_one() {
        let ids = IdGenerator::default();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[test]
    fn test_generator_clones_share_counter() {
        let ids = IdGenerator::new(10);
        let other = ids.clone();
        assert_eq!(ids.next(), 10);
        assert_eq!(other.next(), 11);
    }

    #[test]
    fn test_id_validity() {
        assert!(!ConsoleId::default().is_valid());
        assert!(!ClientId::new(-1).is_valid());
        assert!(ConsoleId::new(1).is_valid());
        assert_eq!(i64::from(ClientId::new(7)), 7);
        assert_eq!(ConsoleId::from(3).to_string(), "3");
    }
}
