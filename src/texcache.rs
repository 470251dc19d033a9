/// Concurrency-safe LRU cache of decoded textures.
///
/// One mutex guards the index (hash map plus intrusive LRU links over a slab
/// of entries); a second, per-entry mutex guards each entry's decode result.
/// A lookup creates-or-touches its entry under the index lock, releases it,
/// and only then decodes under the entry lock (double-checked insertion), so
/// a slow decode of one texture never blocks lookups of others, and two
/// threads asking for the same (path, mip bias) decode exactly once.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::count_call;
use crate::error::AssetError;
use crate::perf::FRAME_COUNTERS;
use crate::texture::MipChain;
use crate::assets::TextureDecoder;

const NIL: u32 = u32::MAX;

/// Cache key: source-file identity plus the mip bias it was decoded with.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub path: Arc<str>,
    pub mip_bias: u32,
}

/// Decode result cell shared between the index and waiting callers.
#[derive(Default)]
struct EntryState {
    chain: Mutex<Option<Arc<MipChain>>>,
}

/// One cached texture: LRU links, byte accounting and the per-entry lock.
struct CachedTexture {
    key: TextureKey,
    prev: u32,
    next: u32,
    /// Decoded payload size; 0 while the decode is still in flight.
    bytes: usize,
    state: Arc<EntryState>,
}

struct CacheIndex {
    map: HashMap<TextureKey, u32>,
    slab: Vec<Option<CachedTexture>>,
    free: Vec<u32>,
    /// LRU list head (most recently used) and tail.
    head: u32,
    tail: u32,
    bytes: usize,
}

impl CacheIndex {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            slab: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            bytes: 0,
        }
    }

    fn entry(&self, i: u32) -> &CachedTexture {
        self.slab[i as usize].as_ref().expect("live cache entry")
    }

    fn entry_mut(&mut self, i: u32) -> &mut CachedTexture {
        self.slab[i as usize].as_mut().expect("live cache entry")
    }

    fn unlink(&mut self, i: u32) {
        let (prev, next) = {
            let e = self.entry(i);
            (e.prev, e.next)
        };
        if prev != NIL {
            self.entry_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.entry_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_front(&mut self, i: u32) {
        let old_head = self.head;
        {
            let e = self.entry_mut(i);
            e.prev = NIL;
            e.next = old_head;
        }
        if old_head != NIL {
            self.entry_mut(old_head).prev = i;
        } else {
            self.tail = i;
        }
        self.head = i;
    }

    fn touch(&mut self, i: u32) {
        self.unlink(i);
        self.push_front(i);
    }

    fn insert(&mut self, key: TextureKey) -> u32 {
        let entry = CachedTexture {
            key: key.clone(),
            prev: NIL,
            next: NIL,
            bytes: 0,
            state: Arc::new(EntryState::default()),
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slab[i as usize] = Some(entry);
                i
            }
            None => {
                self.slab.push(Some(entry));
                (self.slab.len() - 1) as u32
            }
        };
        self.map.insert(key, i);
        self.push_front(i);
        i
    }

    fn remove(&mut self, i: u32) {
        self.unlink(i);
        let entry = self.slab[i as usize].take().expect("live cache entry");
        self.map.remove(&entry.key);
        self.bytes -= entry.bytes;
        self.free.push(i);
    }

    /// Evict least-recently-used decoded entries until under budget.
    /// In-flight entries (no bytes accounted yet) are skipped.
    fn evict_over(&mut self, budget: usize) {
        let mut cursor = self.tail;
        while self.bytes > budget && cursor != NIL {
            let (prev, bytes) = {
                let e = self.entry(cursor);
                (e.prev, e.bytes)
            };
            if bytes > 0 {
                self.remove(cursor);
                count_call!(FRAME_COUNTERS.texcache_evictions);
            }
            cursor = prev;
        }
    }
}

pub struct TextureCache {
    index: Mutex<CacheIndex>,
    budget: usize,
    decoder: Arc<dyn TextureDecoder>,
}

impl TextureCache {
    /// `budget` caps resident decoded bytes; the cache evicts from the LRU
    /// tail past it. Entries still referenced by in-flight objects stay
    /// alive through their `Arc`s; the cache merely forgets them.
    pub fn new(decoder: Arc<dyn TextureDecoder>, budget: usize) -> Self {
        Self {
            index: Mutex::new(CacheIndex::new()),
            budget,
            decoder,
        }
    }

    /// Look up or decode the texture for (path, mip bias).
    pub fn get(&self, path: &Arc<str>, mip_bias: u32) -> Result<Arc<MipChain>, AssetError> {
        let key = TextureKey {
            path: path.clone(),
            mip_bias,
        };

        // Phase 1: find or create the entry under the index lock only.
        let state = {
            let mut ix = self.index.lock();
            match ix.map.get(&key).copied() {
                Some(i) => {
                    count_call!(FRAME_COUNTERS.texcache_hits);
                    ix.touch(i);
                    ix.entry(i).state.clone()
                }
                None => {
                    count_call!(FRAME_COUNTERS.texcache_misses);
                    let i = ix.insert(key.clone());
                    ix.entry(i).state.clone()
                }
            }
        };

        // Phase 2: decode (or wait for the thread already decoding) under
        // the per-entry lock.
        let mut cell = state.chain.lock();
        if let Some(chain) = &*cell {
            return Ok(chain.clone());
        }

        match self.decoder.decode(&key.path, key.mip_bias) {
            Ok(chain) => {
                let chain = Arc::new(chain);
                *cell = Some(chain.clone());
                drop(cell);

                let mut ix = self.index.lock();
                if let Some(&i) = ix.map.get(&key) {
                    if Arc::ptr_eq(&ix.entry(i).state, &state) {
                        let bytes = chain.bytes();
                        ix.entry_mut(i).bytes = bytes;
                        ix.bytes += bytes;
                    }
                }
                ix.evict_over(self.budget);
                Ok(chain)
            }
            Err(err) => {
                drop(cell);
                // Forget the placeholder so a later request can retry.
                let mut ix = self.index.lock();
                if let Some(&i) = ix.map.get(&key) {
                    if Arc::ptr_eq(&ix.entry(i).state, &state) {
                        ix.remove(i);
                    }
                }
                Err(err)
            }
        }
    }

    /// Resident decoded bytes.
    pub fn resident_bytes(&self) -> usize {
        self.index.lock().bytes
    }

    pub fn len(&self) -> usize {
        self.index.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut ix = self.index.lock();
        *ix = CacheIndex::new();
    }
}
