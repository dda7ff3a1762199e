//! Region directory: which regions this process hosts, what it has learned
//! about remote regions, and the client side of the grid authority.
//!
//! Lookups consult the hosted set first, then the remote cache, and only
//! then ask the authority. Results fetched from the authority are cached.
//!
//! # Invariants
//! - A handle maps to at most one hosted descriptor.
//! - A region is added to the hosted set only after the authority accepted it.
//! - Deregistration always removes the hosted entry, even if the authority is unreachable.
//! - Malformed authority answers yield "not found", never a partially filled descriptor.

mod authority;
mod directory;
mod error;
mod resolver;
mod standalone;
mod wire;

pub use authority::{GridAuthority, HttpAuthority};
pub use directory::{DirectoryTimeouts, Registration, RegionDirectory};
pub use error::{AuthorityError, RegistrationError};
pub use resolver::{HostResolver, SystemResolver};
pub use standalone::StandaloneAuthority;
pub use wire::{descriptor_from_fields, map_block_from_fields, registration_fields};
