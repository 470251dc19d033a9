//! worldraster - multithreaded CPU software rasterizer for game-asset
//! world scenes.
//!
//! The crate renders terrain, placed objects, water and decals into RGBA +
//! depth buffers. Parallelism works without per-pixel locking: every render
//! object carries a 256-bit [`TileMask`](tilemask::TileMask) over a 16x16
//! screen tile grid, and the [`RenderObjectQueue`](queue::RenderObjectQueue)
//! only dispatches objects whose masks are disjoint from everything in
//! flight. Asset parsing, material databases and texture file decoding are
//! external collaborators behind the traits in [`assets`].

pub mod assets;
pub mod camera;
pub mod color;
pub mod error;
pub mod framebuffer;
pub mod perf;
pub mod queue;
pub mod raster;
pub mod renderer;
pub mod scene;
pub mod texcache;
pub mod texture;
pub mod tilemask;

pub use assets::{
    Aabb, MaterialDef, MaterialFlags, MaterialHandle, MaterialProvider, MeshPart, MeshProvider,
    MeshVertex, ModelData, TextureDecoder,
};
pub use camera::Camera;
pub use error::{AssetError, RenderError};
pub use framebuffer::Framebuffer;
pub use perf::{CounterSnapshot, FrameCounters, FRAME_COUNTERS};
pub use queue::RenderObjectQueue;
pub use raster::{LightingParams, Rasterizer, RenderQuality};
pub use renderer::{RenderProgress, Renderer, RendererConfig};
pub use scene::{ObjectCategory, RenderPass, SceneEntry, SceneShape, SceneSource};
pub use texcache::TextureCache;
pub use texture::{AddressMode, MipChain, MipLevel};
pub use tilemask::TileMask;
