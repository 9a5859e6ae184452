//! VPL Cull Engine Library
//!
//! Visibility and light culling kernels for a GPU-driven deferred renderer.
//!
//! # Modules
//!
//! - [`render`] - Culling data types, CPU kernels, WGSL dispatchers and a
//!   headless GPU runner
//!
//! # Example
//!
//! ```ignore
//! use vpl_cull_engine::{
//!     CullingConfig, GBuffer, Unshadowed, TileLightBuffer, VisibleVplList, VplLights,
//!     cull_vpls_stage1,
//! };
//! use glam::Vec3;
//!
//! let config = CullingConfig::for_viewport(320, 180);
//! let gbuffer = GBuffer::new(320, 180);
//!
//! let mut lights = VplLights::new();
//! lights.push_with_derived_radius(Vec3::new(0.0, 50.0, 0.0), Vec3::splat(2000.0));
//! let visible = VisibleVplList::all(&lights);
//!
//! let mut tiles = TileLightBuffer::new(320, 180, config.capacity());
//! let stats = cull_vpls_stage1(&config, &lights, &visible, &gbuffer, &Unshadowed, &mut tiles)?;
//! assert_eq!(tiles.count(0, 0), Some(1));
//! ```

pub mod render;

// Re-export the render module contents at crate level for convenience
pub use render::*;
