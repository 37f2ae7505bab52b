//! External lookup services.

pub mod geocode;

pub use geocode::{attach_coordinates, GeoResolver, NoopResolver, NominatimResolver};
