//! Filter criteria shared by the list containers.

use serde::Serialize;

/// Named filter criteria of one container.
///
/// `merge` overlays only the criteria set on `other`; criteria left unset
/// keep their current value.
pub trait Filters: Clone + Default + PartialEq + Serialize + Send + Sync + 'static {
    fn merge(&mut self, other: Self);

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
