//! Session store implementations

mod arango;
mod bootstrap;
mod traits;

pub use arango::ArangoStore;
pub use bootstrap::provision;
pub use traits::SessionStore;
