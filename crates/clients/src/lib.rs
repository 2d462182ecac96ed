//! Blocking HTTP implementations of the `aedsync-recon` collaborator traits.
//!
//! No Tokio runtime required.

pub mod error;
pub mod http;
pub mod osm;
pub mod overpass;
pub mod registry;

pub use error::ClientError;
pub use osm::{OsmApiClient, OsmConfig};
pub use overpass::{OverpassClient, OverpassConfig};
pub use registry::{RegistryClient, RegistryConfig};
