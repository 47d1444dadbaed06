//! Georeferencing: coordinate references, rasters and resampling.

pub mod crs;
pub mod polygon;
pub mod raster;
pub mod resample;
pub mod source;

pub use crs::{builtin_transform, CoordinateTransform, Crs, IdentityTransform, Projection, ProjectionTransform};
pub use raster::{GeoTransform, Raster};
pub use resample::{RasterResampler, ResampleMethod, SampleTarget, TargetGeometry};
pub use source::{
    load_with_timeout, parse_ascii_grid, AsciiGridSource, InMemoryRasterSource, RasterSource, RasterStore,
};
