// REST collaborator for the telecare portal.
//
// The portal server owns persistence and authorization; this crate is
// the bearer-authenticated client plus the `PortalStore` seam the
// engines are written (and tested) against.

pub mod client;
pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use client::PortalApi;
pub use error::ApiError;
pub use memory::InMemoryStore;
pub use store::PortalStore;
