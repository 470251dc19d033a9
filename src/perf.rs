/// Instrumentation for the rendering hot paths.
/// Provides cheap relaxed-atomic call counting so scheduler behavior and
/// rasterizer throughput can be inspected without a profiler attached.
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters covering one or more frames.
pub struct FrameCounters {
    // Scheduler counters
    pub objects_queued: AtomicU64,
    pub objects_direct_ready: AtomicU64,
    pub objects_promoted: AtomicU64,
    pub objects_rendered: AtomicU64,
    pub models_loaded: AtomicU64,

    // Rasterization counters
    pub triangles_submitted: AtomicU64,
    pub triangles_culled: AtomicU64,
    pub triangles_as_lines: AtomicU64,
    pub pixels_tested: AtomicU64,
    pub pixels_shaded: AtomicU64,

    // Texture cache counters
    pub texcache_hits: AtomicU64,
    pub texcache_misses: AtomicU64,
    pub texcache_evictions: AtomicU64,
}

impl FrameCounters {
    pub const fn new() -> Self {
        Self {
            objects_queued: AtomicU64::new(0),
            objects_direct_ready: AtomicU64::new(0),
            objects_promoted: AtomicU64::new(0),
            objects_rendered: AtomicU64::new(0),
            models_loaded: AtomicU64::new(0),
            triangles_submitted: AtomicU64::new(0),
            triangles_culled: AtomicU64::new(0),
            triangles_as_lines: AtomicU64::new(0),
            pixels_tested: AtomicU64::new(0),
            pixels_shaded: AtomicU64::new(0),
            texcache_hits: AtomicU64::new(0),
            texcache_misses: AtomicU64::new(0),
            texcache_evictions: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.objects_queued.store(0, Ordering::Relaxed);
        self.objects_direct_ready.store(0, Ordering::Relaxed);
        self.objects_promoted.store(0, Ordering::Relaxed);
        self.objects_rendered.store(0, Ordering::Relaxed);
        self.models_loaded.store(0, Ordering::Relaxed);
        self.triangles_submitted.store(0, Ordering::Relaxed);
        self.triangles_culled.store(0, Ordering::Relaxed);
        self.triangles_as_lines.store(0, Ordering::Relaxed);
        self.pixels_tested.store(0, Ordering::Relaxed);
        self.pixels_shaded.store(0, Ordering::Relaxed);
        self.texcache_hits.store(0, Ordering::Relaxed);
        self.texcache_misses.store(0, Ordering::Relaxed);
        self.texcache_evictions.store(0, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            objects_queued: self.objects_queued.load(Ordering::Relaxed),
            objects_direct_ready: self.objects_direct_ready.load(Ordering::Relaxed),
            objects_promoted: self.objects_promoted.load(Ordering::Relaxed),
            objects_rendered: self.objects_rendered.load(Ordering::Relaxed),
            models_loaded: self.models_loaded.load(Ordering::Relaxed),
            triangles_submitted: self.triangles_submitted.load(Ordering::Relaxed),
            triangles_culled: self.triangles_culled.load(Ordering::Relaxed),
            triangles_as_lines: self.triangles_as_lines.load(Ordering::Relaxed),
            pixels_tested: self.pixels_tested.load(Ordering::Relaxed),
            pixels_shaded: self.pixels_shaded.load(Ordering::Relaxed),
            texcache_hits: self.texcache_hits.load(Ordering::Relaxed),
            texcache_misses: self.texcache_misses.load(Ordering::Relaxed),
            texcache_evictions: self.texcache_evictions.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data copy of [`FrameCounters`] taken at a point in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub objects_queued: u64,
    pub objects_direct_ready: u64,
    pub objects_promoted: u64,
    pub objects_rendered: u64,
    pub models_loaded: u64,
    pub triangles_submitted: u64,
    pub triangles_culled: u64,
    pub triangles_as_lines: u64,
    pub pixels_tested: u64,
    pub pixels_shaded: u64,
    pub texcache_hits: u64,
    pub texcache_misses: u64,
    pub texcache_evictions: u64,
}

/// Global counter instance shared by all renderer components.
pub static FRAME_COUNTERS: FrameCounters = FrameCounters::new();

/// Increment a counter in [`FRAME_COUNTERS`] with relaxed ordering.
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    };
    ($counter:expr, $n:expr) => {
        $counter.fetch_add($n as u64, std::sync::atomic::Ordering::Relaxed);
    };
}
