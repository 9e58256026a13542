//! Domain data cache.
//!
//! This module mirrors remote rows in process memory:
//! - One ordered slot per entity type, replaced wholesale by each fetch
//! - A loading flag per slot, cleared on every exit path of a fetch
//! - Writes that go to the remote service, then merge the returned row
//!   (or, in resync mode, refetch the table in the background)

mod entities;
mod layer;
mod slot;
mod traits;

pub use layer::DataStore;
pub use traits::WriteSync;
