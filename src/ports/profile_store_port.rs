//! Profile store port trait.

use crate::domain::config::ProfileStore;
use crate::domain::error::TraderError;

pub trait ProfileStorePort {
    fn load(&self) -> Result<ProfileStore, TraderError>;

    /// Replace the stored profiles with `store`.
    fn save(&self, store: &ProfileStore) -> Result<(), TraderError>;
}
