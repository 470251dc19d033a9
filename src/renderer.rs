/// Per-pass render orchestration.
///
/// Each pass builds its object list from the external scene walker (screen
/// bounds, tile masks and sort keys computed in parallel), sorts it so
/// objects sharing a model batch into the rotating cache generations, then
/// drains it through the render-object queue and a fixed pool of worker
/// threads. The drain call takes an optional time budget: on expiry the
/// queue pauses (in-flight work completes, nothing new starts) and the call
/// returns a resumable progress report.
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use rayon::prelude::*;

use crate::assets::{
    LoadedModel, MaterialProvider, MeshProvider, ModelCache, ModelData, TextureDecoder, NO_MODEL,
};
use crate::camera::Camera;
use crate::count_call;
use crate::error::RenderError;
use crate::framebuffer::Framebuffer;
use crate::perf::FRAME_COUNTERS;
use crate::queue::{PushError, RenderObjectQueue, WorkItem, SLOT_NONE};
use crate::raster::{
    effects, LightingParams, RasterContext, Rasterizer, RenderQuality, ShaderInputs,
};
use crate::scene::{
    depth_sort_key, water_cell_mesh, BaseObject, BaseSource, ObjectCategory, RenderObject,
    RenderPass, SceneShape, SceneSource,
};
use crate::texcache::TextureCache;
use crate::tilemask::TileMask;

/// Worker-pool cap; more threads than this stop paying for themselves on
/// tile-granularity scheduling.
pub const MAX_RENDER_THREADS: usize = 16;

#[derive(Clone)]
pub struct RendererConfig {
    pub width: usize,
    pub height: usize,
    /// Worker threads; 0 means available parallelism, capped at
    /// [`MAX_RENDER_THREADS`].
    pub threads: usize,
    /// Rotating model-cache size; must be a power of two.
    pub model_batch: usize,
    /// Decoded-texture budget in bytes.
    pub texture_budget: usize,
    /// Render-object queue node pool size.
    pub queue_capacity: usize,
    /// Allow the scheduler to promote non-conflicting ordinary objects past
    /// blocked ones. Order-sensitive categories are unaffected.
    pub reorder: bool,
    pub quality: RenderQuality,
    pub sky_color: u32,
    /// Keep the packed-normal plane (required for decals).
    pub normal_plane: bool,
    pub lighting: LightingParams,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            threads: 0,
            model_batch: 256,
            texture_budget: 256 << 20,
            queue_capacity: crate::queue::DEFAULT_QUEUE_CAPACITY,
            reorder: true,
            quality: RenderQuality::Full,
            sky_color: crate::color::rgb(0x87, 0xCE, 0xEB),
            normal_plane: true,
            lighting: LightingParams::default(),
        }
    }
}

/// Outcome of one drain call.
#[derive(Debug, Clone, Copy)]
pub struct RenderProgress {
    /// Objects rendered in this pass so far.
    pub rendered: usize,
    /// Objects not yet rendered (waiting in the list or the queue).
    pub remaining: usize,
}

impl RenderProgress {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

enum DriveEnd {
    Finished,
    Budget,
    QueueClosed,
}

pub struct Renderer {
    config: RendererConfig,
    camera: Camera,
    buffers: Framebuffer,
    textures: TextureCache,
    models: ModelCache,
    queue: RenderObjectQueue,
    meshes: Arc<dyn MeshProvider>,
    materials: Arc<dyn MaterialProvider>,

    // State of the pass currently being drained.
    pass: Option<RenderPass>,
    bases: Vec<BaseObject>,
    objects: Vec<RenderObject>,
    model_paths: Vec<Arc<str>>,
    issued_loads: Vec<bool>,
    cursor: usize,
    rendered_total: Arc<AtomicUsize>,
}

impl Renderer {
    pub fn new(
        config: RendererConfig,
        camera: Camera,
        meshes: Arc<dyn MeshProvider>,
        materials: Arc<dyn MaterialProvider>,
        decoder: Arc<dyn TextureDecoder>,
    ) -> Self {
        assert!(config.model_batch.is_power_of_two());
        let buffers = if config.normal_plane {
            Framebuffer::with_normals(config.width, config.height)
        } else {
            Framebuffer::new(config.width, config.height)
        };
        Self {
            textures: TextureCache::new(decoder, config.texture_budget),
            models: ModelCache::new(config.model_batch),
            queue: RenderObjectQueue::new(config.queue_capacity, config.reorder),
            buffers,
            camera,
            meshes,
            materials,
            pass: None,
            bases: Vec::new(),
            objects: Vec::new(),
            model_paths: Vec::new(),
            issued_loads: Vec::new(),
            cursor: 0,
            rendered_total: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Swap the view. Any partially drained pass is discarded.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.pass = None;
    }

    pub fn color_buffer(&self) -> &[u32] {
        self.buffers.color_buffer()
    }

    pub fn depth_buffer(&self) -> &[f32] {
        self.buffers.depth_buffer()
    }

    pub fn normal_buffer(&self) -> Option<&[u32]> {
        self.buffers.normal_buffer()
    }

    /// Objects rendered so far in the current pass (live progress query;
    /// safe to call from another thread holding a clone of the counter).
    pub fn progress_counter(&self) -> Arc<AtomicUsize> {
        self.rendered_total.clone()
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    fn worker_count(&self) -> usize {
        let n = if self.config.threads > 0 {
            self.config.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        };
        n.clamp(1, MAX_RENDER_THREADS)
    }

    /// Drain one pass, optionally bounded by a time budget. Returns the
    /// pass progress; call again with the same pass to resume after a
    /// budget pause. The first worker error recorded during the drain is
    /// returned once all workers have joined.
    pub fn render(
        &mut self,
        pass: RenderPass,
        scene: &dyn SceneSource,
        budget: Option<Duration>,
    ) -> Result<RenderProgress, RenderError> {
        let deadline = budget.map(|b| Instant::now() + b);
        if self.pass != Some(pass) {
            self.build_pass(pass, scene);
        }
        self.queue.resume();
        let workers = self.worker_count();

        let queue = &self.queue;
        let objects = &self.objects[..];
        let bases = &self.bases[..];
        let model_paths = &self.model_paths[..];
        let issued_loads = &mut self.issued_loads;
        let models = &self.models;
        let meshes = &self.meshes;
        let materials = &self.materials;
        let textures = &self.textures;
        let lighting = &self.config.lighting;
        let quality = self.config.quality;
        let camera = self.camera;
        let rendered_total = &self.rendered_total;
        let frame = self.buffers.view();
        let write_normals = pass != RenderPass::WaterAndEffects;
        let mut cursor = self.cursor;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let ctx = WorkerCtx {
                    queue,
                    objects,
                    bases,
                    model_paths,
                    models,
                    meshes,
                    materials,
                    rendered_total,
                    raster: RasterContext {
                        frame,
                        camera: &camera,
                        textures,
                        lighting,
                        quality,
                        pass,
                        write_normals,
                    },
                };
                s.spawn(move || worker_loop(ctx));
            }

            let end = drive_queue(
                queue,
                objects,
                bases,
                models,
                issued_loads,
                &mut cursor,
                deadline,
            );
            if matches!(end, DriveEnd::Finished) {
                queue.wait_idle(deadline);
            }
            // Stop dispatching; workers drain their current item and exit,
            // so the scope join below doubles as the in-flight barrier.
            queue.pause();
        });

        self.cursor = cursor;
        if let Some(message) = self.queue.take_error() {
            // Force a rebuild on retry; the queue state is stale.
            self.pass = None;
            return Err(RenderError::Worker(message));
        }

        let (_, _, in_flight) = self.queue.backlog();
        debug_assert_eq!(in_flight, 0);
        Ok(RenderProgress {
            rendered: self.queue.completed_renders() as usize,
            remaining: (self.objects.len() - self.cursor) + self.queue.pending_renders(),
        })
    }

    /// Build the pass object list: walk the scene, project bounds and
    /// compute tile masks in parallel, deduplicate base objects, assign
    /// model-cache generations, and sort for draw order and batching.
    fn build_pass(&mut self, pass: RenderPass, scene: &dyn SceneSource) {
        self.queue.reset();
        self.models.clear();
        self.pass = Some(pass);
        self.cursor = 0;
        self.rendered_total.store(0, Ordering::Relaxed);
        self.bases.clear();
        self.objects.clear();
        self.model_paths.clear();
        self.issued_loads.clear();
        if pass == RenderPass::Terrain {
            self.buffers.clear(self.config.sky_color);
        }

        let entries = scene.entries();
        let mut model_index: HashMap<Arc<str>, u32> = HashMap::new();
        let mut pending: Vec<(u32, u32)> = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if !pass.accepts(entry.category) {
                continue;
            }
            let base = match &entry.shape {
                SceneShape::Model { path, bounds } => match model_index.get(path) {
                    Some(&b) => b,
                    None => {
                        let model_id = self.model_paths.len() as u32;
                        self.model_paths.push(path.clone());
                        let b = self.bases.len() as u32;
                        self.bases.push(BaseObject {
                            source: BaseSource::Model { path: path.clone() },
                            bounds: *bounds,
                            model_id,
                            generation: self.models.generation_of(model_id),
                        });
                        model_index.insert(path.clone(), b);
                        b
                    }
                },
                SceneShape::Inline { mesh } => {
                    let b = self.bases.len() as u32;
                    self.bases.push(BaseObject {
                        source: BaseSource::Inline { mesh: mesh.clone() },
                        bounds: mesh.bounds,
                        model_id: NO_MODEL,
                        generation: 0,
                    });
                    b
                }
                SceneShape::WaterCell { size, material } => {
                    let mesh = Arc::new(water_cell_mesh(*size, *material));
                    let b = self.bases.len() as u32;
                    self.bases.push(BaseObject {
                        bounds: mesh.bounds,
                        source: BaseSource::Inline { mesh },
                        model_id: NO_MODEL,
                        generation: 0,
                    });
                    b
                }
                SceneShape::Decal { material, bounds } => {
                    let b = self.bases.len() as u32;
                    self.bases.push(BaseObject {
                        source: BaseSource::Decal {
                            material: *material,
                        },
                        bounds: *bounds,
                        model_id: NO_MODEL,
                        generation: 0,
                    });
                    b
                }
            };
            pending.push((i as u32, base));
        }
        self.issued_loads = vec![false; self.model_paths.len()];

        // Project bounds and build masks in parallel; an empty mask culls
        // the object before it ever reaches the queue.
        let camera = self.camera;
        let (w, h) = (self.config.width, self.config.height);
        let bases = &self.bases;
        let projected: Vec<Option<RenderObject>> = pending
            .par_iter()
            .map(|&(i, b)| {
                let entry = &entries[i as usize];
                let base = &bases[b as usize];
                if base.bounds.is_degenerate() {
                    return None;
                }
                let rect = camera.project_aabb(&base.bounds, &entry.transform)?;
                let mask = TileMask::from_screen_bounds(rect.min, rect.max, w, h);
                if mask.is_empty() {
                    return None;
                }
                Some(RenderObject {
                    base: b,
                    transform: entry.transform,
                    category: entry.category,
                    sort_key: depth_sort_key(rect.near),
                    mask,
                    form_id: entry.form_id,
                })
            })
            .collect();
        self.objects = projected.into_iter().flatten().collect();

        // Stable sorts keep scene order among equals, which is what the
        // strict-order dispatch guarantee is defined against.
        match pass {
            RenderPass::Terrain | RenderPass::Solid => {
                let bases = &self.bases;
                self.objects.sort_by_key(|o| {
                    let b = &bases[o.base as usize];
                    let batch = if b.model_id == NO_MODEL {
                        0
                    } else {
                        b.generation + 1
                    };
                    (batch, b.model_id, o.sort_key)
                });
            }
            RenderPass::WaterAndEffects => {
                // Decals stamp the opaque frame first, water tints over
                // them, effects blend on top; blended surfaces run
                // back-to-front.
                self.objects.sort_by_key(|o| {
                    let rank = if o.category.contains(ObjectCategory::DECAL) {
                        0
                    } else if o.category.contains(ObjectCategory::WATER) {
                        1
                    } else {
                        2
                    };
                    (rank, std::cmp::Reverse(o.sort_key))
                });
            }
        }

        log::debug!(
            "pass {:?}: {} object(s), {} base(s), {} model path(s)",
            pass,
            self.objects.len(),
            self.bases.len(),
            self.model_paths.len()
        );
    }
}

/// Feed the queue from the sorted object list, honoring model-cache
/// generation boundaries and the time budget.
fn drive_queue(
    queue: &RenderObjectQueue,
    objects: &[RenderObject],
    bases: &[BaseObject],
    models: &ModelCache,
    issued_loads: &mut [bool],
    cursor: &mut usize,
    deadline: Option<Instant>,
) -> DriveEnd {
    let mut current_gen: Option<u32> = None;

    while *cursor < objects.len() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return DriveEnd::Budget;
        }

        let object = &objects[*cursor];
        let base = &bases[object.base as usize];

        if base.model_id != NO_MODEL && current_gen != Some(base.generation) {
            // Generation boundary: everything queued for the previous
            // generation must be finished or in flight before this
            // generation's loads are issued. The queue's slot rules then
            // keep each load exclusive against stragglers on its slot.
            if !queue.wait_backlog_clear(deadline) {
                return if queue.is_shut_down() {
                    DriveEnd::QueueClosed
                } else {
                    DriveEnd::Budget
                };
            }
            let generation = base.generation;
            for o in &objects[*cursor..] {
                let b = &bases[o.base as usize];
                if b.model_id == NO_MODEL {
                    continue;
                }
                if b.generation != generation {
                    break; // sorted by generation
                }
                if !issued_loads[b.model_id as usize] {
                    issued_loads[b.model_id as usize] = true;
                    let pushed = queue.push(
                        WorkItem::Load {
                            model_id: b.model_id,
                        },
                        TileMask::EMPTY,
                        models.slot_of(b.model_id),
                        false,
                    );
                    if pushed == Err(PushError::ShutDown) {
                        return DriveEnd::QueueClosed;
                    }
                }
            }
            current_gen = Some(generation);
        }

        let slot = if base.model_id == NO_MODEL {
            SLOT_NONE
        } else {
            models.slot_of(base.model_id)
        };
        match queue.push(
            WorkItem::Render {
                object: *cursor as u32,
            },
            object.mask,
            slot,
            object.category.strict_order(),
        ) {
            Ok(()) => *cursor += 1,
            Err(PushError::ShutDown) => return DriveEnd::QueueClosed,
            Err(PushError::Paused) => return DriveEnd::Budget,
        }
    }
    DriveEnd::Finished
}

struct WorkerCtx<'a> {
    queue: &'a RenderObjectQueue,
    objects: &'a [RenderObject],
    bases: &'a [BaseObject],
    model_paths: &'a [Arc<str>],
    models: &'a ModelCache,
    meshes: &'a Arc<dyn MeshProvider>,
    materials: &'a Arc<dyn MaterialProvider>,
    rendered_total: &'a AtomicUsize,
    raster: RasterContext<'a>,
}

/// Worker thread body: pull the queue, rasterize or load, and convert any
/// panic into the queue's recorded-error shutdown. Workers block on the
/// queue's condition variable between items and never poll.
fn worker_loop(ctx: WorkerCtx<'_>) {
    let mut raster = Rasterizer::new();
    while let Some(token) = ctx.queue.take_ready() {
        let item = token.item;
        let outcome = catch_unwind(AssertUnwindSafe(|| execute_item(&ctx, &mut raster, item)));
        match outcome {
            Ok(()) => {
                if matches!(item, WorkItem::Render { .. }) {
                    ctx.rendered_total.fetch_add(1, Ordering::Relaxed);
                    count_call!(FRAME_COUNTERS.objects_rendered);
                }
                ctx.queue.complete(token);
            }
            Err(payload) => {
                ctx.queue.fail(token, panic_message(&payload));
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "render worker panicked".to_string()
    }
}

fn execute_item(ctx: &WorkerCtx<'_>, raster: &mut Rasterizer, item: WorkItem) {
    match item {
        WorkItem::Load { model_id } => {
            count_call!(FRAME_COUNTERS.models_loaded);
            let path = &ctx.model_paths[model_id as usize];
            let loaded = match ctx.meshes.load_model(path) {
                Ok(data) => {
                    let materials = data
                        .parts
                        .iter()
                        .map(|p| ctx.materials.resolve(p.material))
                        .collect();
                    LoadedModel {
                        model_id,
                        data,
                        materials,
                    }
                }
                Err(err) => {
                    // Missing model degrades its objects, never the frame:
                    // an empty mesh makes their renders no-ops.
                    log::warn!("model {path} unavailable: {err}");
                    LoadedModel {
                        model_id,
                        data: Arc::new(ModelData::from_parts(Vec::new())),
                        materials: Vec::new(),
                    }
                }
            };
            // Safety: this worker owns the slot's load item; the queue
            // admits no other item touching the slot concurrently.
            unsafe { ctx.models.store(loaded) };
        }
        WorkItem::Render { object } => {
            let object = &ctx.objects[object as usize];
            let base = &ctx.bases[object.base as usize];
            match &base.source {
                BaseSource::Model { path } => {
                    // Safety: the scheduler keeps loads off this slot while
                    // the render is in flight.
                    match unsafe { ctx.models.get(base.model_id) } {
                        Some(model) => raster.draw_model(
                            &ctx.raster,
                            &object.transform,
                            &model.data.parts,
                            &model.materials,
                        ),
                        None => log::warn!("model {path} not resident; object skipped"),
                    }
                }
                BaseSource::Inline { mesh } => {
                    let materials: Vec<_> = mesh
                        .parts
                        .iter()
                        .map(|p| ctx.materials.resolve(p.material))
                        .collect();
                    raster.draw_model(&ctx.raster, &object.transform, &mesh.parts, &materials);
                }
                BaseSource::Decal { material } => {
                    let Some(material) = ctx.materials.resolve(*material) else {
                        log::warn!("decal material did not resolve; object skipped");
                        return;
                    };
                    let inputs = ShaderInputs::resolve(
                        material,
                        ctx.raster.textures,
                        ctx.raster.quality,
                        ctx.raster.lighting,
                    );
                    let Some(rect) = ctx
                        .raster
                        .camera
                        .project_aabb(&base.bounds, &object.transform)
                    else {
                        return;
                    };
                    let to_local = object.transform.inverse();
                    let dir = object
                        .transform
                        .transform_vector3(Vec3::Z)
                        .normalize_or(Vec3::Z);
                    effects::draw_decal(
                        &ctx.raster,
                        &rect,
                        &to_local,
                        base.bounds.size(),
                        base.bounds.min,
                        dir,
                        &inputs,
                        object.form_id,
                    );
                }
            }
        }
    }
}
