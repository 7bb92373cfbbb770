//! Offscreen caching of subtrees and the filters applied to cached surfaces.

mod filter;
pub mod filters;
mod record;
mod surface;

pub use filter::{apply_filters, filter_bounds, Filter};
pub use record::{CacheOptions, CachePlan, CacheRecord};
pub use surface::{new_surface, GpuSurface, RasterSurface, Surface, SurfaceKind, SurfaceTarget};
