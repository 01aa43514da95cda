//! Deterministic client-side compositing.
//!
//! [`trim`] crops garment photos to their content, [`grid`] lays a
//! selection out on a fixed portrait canvas and encodes it as JPEG.
//! Every pixel operation goes through [`raster::RasterImage`], the only
//! module that touches the `image` crate directly.

pub mod error;
pub mod grid;
pub mod raster;
pub mod trim;

pub use error::CompositingError;
pub use grid::{grid_layout, GridComposer, GridOptions};
pub use raster::{RasterImage, Rect};
pub use trim::{content_bounds, trim, DEFAULT_TRIM_THRESHOLD};
