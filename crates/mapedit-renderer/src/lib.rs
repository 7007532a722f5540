#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::manual_range_contains)]

pub mod atlas;
pub mod texture;
pub mod lightmap;
pub mod geometry;
pub mod facemath;
pub mod ent;
pub mod scene;
pub mod pick;

pub use scene::{BspRenderer, DrawBackend, RenderFlags};
