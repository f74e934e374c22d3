//! Evolve pictures from random arithmetic expression trees.
//!
//! A `Picture` holds one expression per colour channel. Each expression is evaluated at every
//! pixel's coordinate to produce the intensity of its channel, and pictures evolve by mutating
//! a single node of a single channel at a time.

pub mod gp;
pub mod picture;
pub mod raster;

pub use crate::picture::{Channel, Picture};
pub use crate::raster::Rasterizer;
