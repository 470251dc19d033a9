/// Dependency-aware render work dispatcher.
///
/// A manual scheduler over a fixed pool of node slots: nodes live on one of
/// four intrusive doubly-linked lists (`queued`, `ready`, `rendered`, `free`)
/// threaded through parallel prev/next indices in a pre-reserved arena, so
/// steady-state operation allocates nothing.
///
/// Dispatch rule: an item may start only when its tile mask is disjoint from
/// every in-flight item's mask. That advisory whole-tile claim is what lets
/// workers write the shared framebuffer with no per-pixel locks; pixel-level
/// synchronization at rasterization rates would dominate the frame, while
/// objects that might actually overlap serialize at tile granularity, the
/// coarsest partition that is still sound. Draw-order-sensitive categories
/// (water, effects, decals) additionally keep their submission order.
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::count_call;
use crate::perf::FRAME_COUNTERS;
use crate::tilemask::TileMask;

/// Slot value for items that touch no model-cache slot.
pub const SLOT_NONE: u16 = u16::MAX;

/// How far into the blocked queue the direct-dispatch path scans for
/// model-cache slot conflicts when admitting a load. Mask conflicts are
/// always checked against the whole queue; the bounded window only limits
/// how eagerly loads may jump ahead.
pub const NEAR_HEAD_WINDOW: usize = 16;

/// Default node-pool capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How long teardown keeps polling for in-flight work to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const NIL: u32 = u32::MAX;

/// One schedulable unit: render an object, or load a model into its
/// rotating-cache slot ahead of the objects that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    Render { object: u32 },
    Load { model_id: u32 },
}

impl WorkItem {
    #[inline]
    fn is_load(self) -> bool {
        matches!(self, WorkItem::Load { .. })
    }
}

/// Receipt for a dispatched item. Must be returned through
/// [`RenderObjectQueue::complete`] or [`RenderObjectQueue::fail`]; the node
/// stays on the `rendered` list (and its tiles stay claimed) until then.
#[must_use]
pub struct WorkToken {
    node: u32,
    pub item: WorkItem,
    mask: TileMask,
}

impl WorkToken {
    pub fn mask(&self) -> &TileMask {
        &self.mask
    }
}

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue is paused (time budget expired); retry after resume.
    Paused,
    /// The queue was shut down by a worker failure.
    ShutDown,
}

struct Node {
    item: WorkItem,
    mask: TileMask,
    slot: u16,
    strict: bool,
    prev: u32,
    next: u32,
}

#[derive(Clone, Copy)]
struct ListHeads {
    head: u32,
    tail: u32,
    len: usize,
}

impl ListHeads {
    const EMPTY: ListHeads = ListHeads {
        head: NIL,
        tail: NIL,
        len: 0,
    };
}

struct QueueState {
    nodes: Vec<Node>,
    free: ListHeads,
    queued: ListHeads,
    ready: ListHeads,
    rendered: ListHeads,
    paused: bool,
    done: bool,
    reorder: bool,
    error: Option<String>,
    completed_renders: u64,
    /// Scratch for the promotion walk's slot claims; reused across calls.
    claimed_slots: Vec<(u16, bool)>,
}

fn list_push_back(nodes: &mut [Node], list: &mut ListHeads, i: u32) {
    let tail = list.tail;
    nodes[i as usize].prev = tail;
    nodes[i as usize].next = NIL;
    if tail != NIL {
        nodes[tail as usize].next = i;
    } else {
        list.head = i;
    }
    list.tail = i;
    list.len += 1;
}

fn list_remove(nodes: &mut [Node], list: &mut ListHeads, i: u32) {
    let (prev, next) = {
        let n = &nodes[i as usize];
        (n.prev, n.next)
    };
    if prev != NIL {
        nodes[prev as usize].next = next;
    } else {
        list.head = next;
    }
    if next != NIL {
        nodes[next as usize].prev = prev;
    } else {
        list.tail = prev;
    }
    list.len -= 1;
}

impl QueueState {
    /// Slot-exclusivity rule: a load conflicts with anything touching its
    /// slot; a render only conflicts with loads (concurrent renders may
    /// share a slot read-only).
    #[inline]
    fn slot_pair_conflict(slot: u16, is_load: bool, other_slot: u16, other_is_load: bool) -> bool {
        slot != SLOT_NONE && slot == other_slot && (is_load || other_is_load)
    }

    /// Mask/slot conflict against every node of one list.
    fn conflicts_with_list(&self, list: &ListHeads, mask: &TileMask, slot: u16, is_load: bool) -> bool {
        let mut i = list.head;
        while i != NIL {
            let n = &self.nodes[i as usize];
            if n.mask.overlaps(mask)
                || Self::slot_pair_conflict(slot, is_load, n.slot, n.item.is_load())
            {
                return true;
            }
            i = n.next;
        }
        false
    }

    fn in_flight_conflict(&self, mask: &TileMask, slot: u16, is_load: bool) -> bool {
        self.conflicts_with_list(&self.ready, mask, slot, is_load)
            || self.conflicts_with_list(&self.rendered, mask, slot, is_load)
    }

    /// Can a freshly pushed item skip the blocked queue entirely?
    fn clear_of_queued(&self, mask: &TileMask, slot: u16, is_load: bool, strict: bool) -> bool {
        if self.queued.len == 0 {
            return true;
        }
        // Order-sensitive items never jump ahead of queued work, and with
        // general reordering off nothing does.
        if strict || !self.reorder {
            return false;
        }
        let mut i = self.queued.head;
        let mut pos = 0usize;
        while i != NIL {
            let n = &self.nodes[i as usize];
            if n.mask.overlaps(mask) {
                return false;
            }
            if Self::slot_pair_conflict(slot, is_load, n.slot, n.item.is_load()) {
                // Loads only look through the bounded near-head window;
                // renders must never pass the load that fills their slot.
                if !is_load || pos < NEAR_HEAD_WINDOW {
                    return false;
                }
            }
            pos += 1;
            i = n.next;
        }
        true
    }

    /// Incrementally promote blocked nodes as the union of in-flight masks
    /// allows. Returns the number of nodes moved to `ready`.
    fn promote(&mut self) -> usize {
        if self.paused || self.done {
            return 0;
        }

        // Running union of claims: everything in flight, plus the claims of
        // skipped nodes that must keep blocking later work.
        let mut busy = TileMask::EMPTY;
        self.claimed_slots.clear();
        let mut claimed_slots = std::mem::take(&mut self.claimed_slots);
        for list in [&self.ready, &self.rendered] {
            let mut i = list.head;
            while i != NIL {
                let n = &self.nodes[i as usize];
                busy.union_with(&n.mask);
                if n.slot != SLOT_NONE {
                    claimed_slots.push((n.slot, n.item.is_load()));
                }
                i = n.next;
            }
        }

        let mut promoted = 0usize;
        let mut any_skipped = false;
        let mut i = self.queued.head;
        while i != NIL {
            let next = self.nodes[i as usize].next;
            let (mask, slot, strict, is_load) = {
                let n = &self.nodes[i as usize];
                (n.mask, n.slot, n.strict, n.item.is_load())
            };

            let mask_conflict = mask.overlaps(&busy);
            let slot_conflict = slot != SLOT_NONE
                && claimed_slots
                    .iter()
                    .any(|&(s, load)| Self::slot_pair_conflict(slot, is_load, s, load));
            // Strict-order items are only ever promoted from the effective
            // queue head.
            let order_block = strict && any_skipped;

            if !mask_conflict && !slot_conflict && !order_block {
                list_remove(&mut self.nodes, &mut self.queued, i);
                list_push_back(&mut self.nodes, &mut self.ready, i);
                promoted += 1;
                count_call!(FRAME_COUNTERS.objects_promoted);
                busy.union_with(&mask);
                if slot != SLOT_NONE {
                    claimed_slots.push((slot, is_load));
                }
            } else {
                any_skipped = true;
                if strict {
                    // A blocked order-sensitive item keeps its tile claim so
                    // nothing overlapping it can pass.
                    busy.union_with(&mask);
                }
                if slot != SLOT_NONE {
                    claimed_slots.push((slot, is_load));
                }
                if !self.reorder {
                    break;
                }
            }
            i = next;
        }

        self.claimed_slots = claimed_slots;
        promoted
    }

    fn outstanding(&self) -> usize {
        self.queued.len + self.ready.len + self.rendered.len
    }
}

pub struct RenderObjectQueue {
    state: Mutex<QueueState>,
    /// Wakes workers when new ready work appears.
    workers: Condvar,
    /// Wakes the orchestrator on any state change.
    host: Condvar,
}

impl RenderObjectQueue {
    pub fn new(capacity: usize, reorder: bool) -> Self {
        let capacity = capacity.max(1);
        let mut nodes = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            nodes.push(Node {
                item: WorkItem::Render { object: 0 },
                mask: TileMask::EMPTY,
                slot: SLOT_NONE,
                strict: false,
                prev: NIL,
                next: NIL,
            });
        }
        let mut state = QueueState {
            nodes,
            free: ListHeads::EMPTY,
            queued: ListHeads::EMPTY,
            ready: ListHeads::EMPTY,
            rendered: ListHeads::EMPTY,
            paused: false,
            done: false,
            reorder,
            error: None,
            completed_renders: 0,
            claimed_slots: Vec::with_capacity(capacity),
        };
        for i in 0..capacity as u32 {
            list_push_back(&mut state.nodes, &mut state.free, i);
        }
        Self {
            state: Mutex::new(state),
            workers: Condvar::new(),
            host: Condvar::new(),
        }
    }

    /// Submit an item. Blocks while the node pool is exhausted. The item
    /// goes straight to `ready` when nothing in flight or queued conflicts
    /// with it (subject to the reorder policy); otherwise it queues blocked.
    pub fn push(
        &self,
        item: WorkItem,
        mask: TileMask,
        slot: u16,
        strict: bool,
    ) -> Result<(), PushError> {
        let mut st = self.state.lock();
        loop {
            if st.done {
                return Err(PushError::ShutDown);
            }
            if st.paused {
                return Err(PushError::Paused);
            }
            if st.free.head != NIL {
                break;
            }
            self.host.wait(&mut st);
        }

        let i = st.free.head;
        {
            let st = &mut *st;
            list_remove(&mut st.nodes, &mut st.free, i);
        }
        {
            let n = &mut st.nodes[i as usize];
            n.item = item;
            n.mask = mask;
            n.slot = slot;
            n.strict = strict;
        }

        let direct = !st.in_flight_conflict(&mask, slot, item.is_load())
            && st.clear_of_queued(&mask, slot, item.is_load(), strict);
        if direct {
            {
                let st = &mut *st;
                list_push_back(&mut st.nodes, &mut st.ready, i);
            }
            count_call!(FRAME_COUNTERS.objects_direct_ready);
            self.workers.notify_one();
        } else {
            {
                let st = &mut *st;
                list_push_back(&mut st.nodes, &mut st.queued, i);
            }
            count_call!(FRAME_COUNTERS.objects_queued);
        }
        Ok(())
    }

    /// Worker entry: block until ready work exists and claim it. Returns
    /// `None` once the queue is paused or shut down; workers never busy-wait.
    pub fn take_ready(&self) -> Option<WorkToken> {
        let mut st = self.state.lock();
        loop {
            if st.done {
                return None;
            }
            if st.paused {
                return None;
            }
            if st.ready.head != NIL {
                let i = st.ready.head;
                {
                    let st = &mut *st;
                    list_remove(&mut st.nodes, &mut st.ready, i);
                    list_push_back(&mut st.nodes, &mut st.rendered, i);
                }
                let n = &st.nodes[i as usize];
                return Some(WorkToken {
                    node: i,
                    item: n.item,
                    mask: n.mask,
                });
            }
            self.workers.wait(&mut st);
        }
    }

    /// Release a finished item, re-promote, and wake whoever can use the
    /// freed tiles or node.
    pub fn complete(&self, token: WorkToken) {
        let mut st = self.state.lock();
        {
            let st = &mut *st;
            list_remove(&mut st.nodes, &mut st.rendered, token.node);
            list_push_back(&mut st.nodes, &mut st.free, token.node);
        }
        if matches!(token.item, WorkItem::Render { .. }) {
            st.completed_renders += 1;
        }
        let promoted = st.promote();
        drop(st);
        match promoted {
            0 => {}
            1 => {
                self.workers.notify_one();
            }
            _ => {
                self.workers.notify_all();
            }
        }
        self.host.notify_all();
    }

    /// Record a worker failure and shut the queue down so no further work is
    /// scheduled. Only the first message is kept.
    pub fn fail(&self, token: WorkToken, message: String) {
        let mut st = self.state.lock();
        {
            let st = &mut *st;
            list_remove(&mut st.nodes, &mut st.rendered, token.node);
            list_push_back(&mut st.nodes, &mut st.free, token.node);
        }
        if st.error.is_none() {
            st.error = Some(message);
        }
        st.done = true;
        drop(st);
        self.workers.notify_all();
        self.host.notify_all();
    }

    /// Stop dispatching. In-flight work completes; queued and ready items
    /// stay put for a later [`Self::resume`].
    pub fn pause(&self) {
        let mut st = self.state.lock();
        st.paused = true;
        drop(st);
        self.workers.notify_all();
        self.host.notify_all();
    }

    /// Reopen a paused queue and re-promote.
    pub fn resume(&self) {
        let mut st = self.state.lock();
        st.paused = false;
        let promoted = st.promote();
        drop(st);
        if promoted > 0 {
            self.workers.notify_all();
        }
    }

    /// Wait until nothing is queued, ready or in flight. Returns `false`
    /// when the deadline passes or the queue is shut down first.
    pub fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut st = self.state.lock();
        loop {
            if st.outstanding() == 0 {
                return true;
            }
            if st.done {
                return false;
            }
            match deadline {
                Some(d) => {
                    if self.host.wait_until(&mut st, d).timed_out() {
                        return st.outstanding() == 0;
                    }
                }
                None => self.host.wait(&mut st),
            }
        }
    }

    /// Wait until the backlog (queued + ready) has drained; in-flight work
    /// may still be running. This is the model-generation boundary: every
    /// object of the old generation is then finished or in flight.
    pub fn wait_backlog_clear(&self, deadline: Option<Instant>) -> bool {
        let mut st = self.state.lock();
        loop {
            if st.queued.len == 0 && st.ready.len == 0 {
                return true;
            }
            if st.done {
                return false;
            }
            match deadline {
                Some(d) => {
                    if self.host.wait_until(&mut st, d).timed_out() {
                        return st.queued.len == 0 && st.ready.len == 0;
                    }
                }
                None => self.host.wait(&mut st),
            }
        }
    }

    /// Set the done flag and poll (bounded waits) until no worker is
    /// mid-render, so callers may release shared buffers afterwards.
    pub fn shutdown(&self) {
        let mut st = self.state.lock();
        st.done = true;
        self.workers.notify_all();
        self.host.notify_all();
        let give_up = Instant::now() + SHUTDOWN_GRACE;
        while st.rendered.len > 0 {
            if self
                .host
                .wait_for(&mut st, Duration::from_millis(20))
                .timed_out()
                && Instant::now() >= give_up
            {
                log::warn!(
                    "queue shutdown timed out with {} item(s) still in flight",
                    st.rendered.len
                );
                break;
            }
        }
    }

    /// Reinitialize for a new pass. Abandoned backlog items (a pass torn
    /// down while paused) return to the free list; nothing may be in
    /// flight.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        debug_assert_eq!(st.rendered.len, 0, "reset with work in flight");
        while st.queued.head != NIL {
            let i = st.queued.head;
            {
                let st = &mut *st;
                list_remove(&mut st.nodes, &mut st.queued, i);
                list_push_back(&mut st.nodes, &mut st.free, i);
            }
        }
        while st.ready.head != NIL {
            let i = st.ready.head;
            {
                let st = &mut *st;
                list_remove(&mut st.nodes, &mut st.ready, i);
                list_push_back(&mut st.nodes, &mut st.free, i);
            }
        }
        st.paused = false;
        st.done = false;
        st.error = None;
        st.completed_renders = 0;
    }

    /// Renders completed since the last reset.
    pub fn completed_renders(&self) -> u64 {
        self.state.lock().completed_renders
    }

    /// (queued, ready, in-flight) lengths.
    pub fn backlog(&self) -> (usize, usize, usize) {
        let st = self.state.lock();
        (st.queued.len, st.ready.len, st.rendered.len)
    }

    /// Render items (loads excluded) waiting in `queued` or `ready`.
    pub fn pending_renders(&self) -> usize {
        let st = self.state.lock();
        let mut count = 0usize;
        for list in [&st.queued, &st.ready] {
            let mut i = list.head;
            while i != NIL {
                let n = &st.nodes[i as usize];
                if !n.item.is_load() {
                    count += 1;
                }
                i = n.next;
            }
        }
        count
    }

    /// First recorded worker error, if any.
    pub fn take_error(&self) -> Option<String> {
        self.state.lock().error.take()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(x0: i32, x1: i32, y0: i32, y1: i32) -> TileMask {
        TileMask::from_tile_rect(x0, x1, y0, y1)
    }

    fn render(i: u32) -> WorkItem {
        WorkItem::Render { object: i }
    }

    #[test]
    fn disjoint_items_dispatch_together() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 3, 0, 3), SLOT_NONE, false).unwrap();
        q.push(render(1), mask(8, 11, 8, 11), SLOT_NONE, false).unwrap();

        let a = q.take_ready().expect("first item ready");
        let b = q.take_ready().expect("disjoint second item ready");
        assert_eq!(q.backlog(), (0, 0, 2));
        q.complete(a);
        q.complete(b);
        assert_eq!(q.completed_renders(), 2);
    }

    #[test]
    fn overlapping_items_serialize_in_order() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        q.push(render(1), mask(4, 11, 4, 11), SLOT_NONE, false).unwrap();

        let a = q.take_ready().unwrap();
        assert_eq!(a.item, render(0));
        // Second item conflicts while the first is in flight.
        assert_eq!(q.backlog(), (1, 0, 1));
        q.complete(a);
        let b = q.take_ready().unwrap();
        assert_eq!(b.item, render(1));
        q.complete(b);
    }

    #[test]
    fn reorder_promotes_clear_items_past_blocked_ones() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        let a = q.take_ready().unwrap();
        // Blocked behind item 0, then an unrelated item.
        q.push(render(1), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        q.push(render(2), mask(12, 15, 12, 15), SLOT_NONE, false).unwrap();

        let c = q.take_ready().unwrap();
        assert_eq!(c.item, render(2), "clear item jumps the blocked one");
        q.complete(a);
        q.complete(c);
        let b = q.take_ready().unwrap();
        assert_eq!(b.item, render(1));
        q.complete(b);
    }

    #[test]
    fn fifo_mode_never_reorders() {
        let q = RenderObjectQueue::new(8, false);
        q.push(render(0), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        let a = q.take_ready().unwrap();
        q.push(render(1), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        q.push(render(2), mask(12, 15, 12, 15), SLOT_NONE, false).unwrap();

        // Nothing may pass the blocked head.
        assert_eq!(q.backlog(), (2, 0, 1));
        q.complete(a);
        assert_eq!(q.take_ready().unwrap().item, render(1));
    }

    #[test]
    fn strict_items_keep_submission_order() {
        let q = RenderObjectQueue::new(8, true);
        // Opaque blocker in flight.
        q.push(render(0), mask(0, 7, 0, 15), SLOT_NONE, false).unwrap();
        let a = q.take_ready().unwrap();

        // Two overlapping strict items; the first is blocked by the opaque
        // one, the second overlaps the first.
        q.push(render(1), mask(4, 9, 0, 15), SLOT_NONE, true).unwrap();
        q.push(render(2), mask(8, 13, 0, 15), SLOT_NONE, true).unwrap();
        // An ordinary clear item may still pass both.
        q.push(render(3), mask(14, 15, 0, 3), SLOT_NONE, false).unwrap();

        let d = q.take_ready().unwrap();
        assert_eq!(d.item, render(3));
        assert!(q.take_ready_would_block());

        q.complete(a);
        let b = q.take_ready().unwrap();
        assert_eq!(b.item, render(1), "strict items dispatch in order");
        // Item 2 overlaps item 1's claim.
        assert!(q.take_ready_would_block());
        q.complete(b);
        let c = q.take_ready().unwrap();
        assert_eq!(c.item, render(2));
        q.complete(c);
        q.complete(d);
    }

    #[test]
    fn strict_item_never_jumps_a_nonoverlapping_queued_item() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        let a = q.take_ready().unwrap();
        // Ordinary item blocked by the in-flight one.
        q.push(render(1), mask(0, 7, 0, 7), SLOT_NONE, false).unwrap();
        // Strict item with a completely disjoint mask must still wait.
        q.push(render(2), mask(12, 15, 12, 15), SLOT_NONE, true).unwrap();

        assert!(q.take_ready_would_block());
        q.complete(a);
        let b = q.take_ready().unwrap();
        assert_eq!(b.item, render(1));
        let c = q.take_ready().unwrap();
        assert_eq!(c.item, render(2));
        q.complete(b);
        q.complete(c);
    }

    #[test]
    fn load_and_render_never_share_a_slot() {
        let q = RenderObjectQueue::new(8, true);
        q.push(WorkItem::Load { model_id: 5 }, TileMask::EMPTY, 5, false)
            .unwrap();
        let load = q.take_ready().unwrap();
        // Render of the model the load is filling: must wait.
        q.push(render(0), mask(0, 3, 0, 3), 5, false).unwrap();
        // Render on another slot is unaffected.
        q.push(render(1), mask(8, 11, 8, 11), 9, false).unwrap();

        let other = q.take_ready().unwrap();
        assert_eq!(other.item, render(1));
        assert!(q.take_ready_would_block());

        q.complete(load);
        let r = q.take_ready().unwrap();
        assert_eq!(r.item, render(0));
        q.complete(r);
        q.complete(other);
    }

    #[test]
    fn next_generation_load_waits_for_in_flight_render_on_slot() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 3, 0, 3), 2, false).unwrap();
        let r = q.take_ready().unwrap();
        // Load rotating a new model into the same slot.
        q.push(WorkItem::Load { model_id: 258 }, TileMask::EMPTY, 2, false)
            .unwrap();
        assert!(q.take_ready_would_block());
        q.complete(r);
        let l = q.take_ready().unwrap();
        assert!(l.item.is_load());
        q.complete(l);
    }

    #[test]
    fn pause_withholds_ready_work_and_resume_reissues() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 3, 0, 3), SLOT_NONE, false).unwrap();
        q.pause();
        assert!(q.take_ready().is_none(), "paused queue hands out nothing");
        assert_eq!(q.push(render(1), mask(8, 9, 8, 9), SLOT_NONE, false), Err(PushError::Paused));

        q.resume();
        let a = q.take_ready().unwrap();
        assert_eq!(a.item, render(0));
        q.complete(a);
    }

    #[test]
    fn fail_records_first_error_and_shuts_down() {
        let q = RenderObjectQueue::new(8, true);
        q.push(render(0), mask(0, 3, 0, 3), SLOT_NONE, false).unwrap();
        let a = q.take_ready().unwrap();
        q.fail(a, "texture index out of range".into());

        assert!(q.is_shut_down());
        assert!(q.take_ready().is_none());
        assert_eq!(q.push(render(1), mask(0, 1, 0, 1), SLOT_NONE, false), Err(PushError::ShutDown));
        assert_eq!(q.take_error().as_deref(), Some("texture index out of range"));
    }

    #[test]
    fn wait_idle_on_empty_queue_returns_immediately() {
        let q = RenderObjectQueue::new(8, true);
        assert!(q.wait_idle(Some(Instant::now() + Duration::from_millis(1))));
        assert_eq!(q.completed_renders(), 0);
    }

    impl RenderObjectQueue {
        /// Test helper: true when no ready work can be claimed right now.
        fn take_ready_would_block(&self) -> bool {
            self.state.lock().ready.len == 0
        }
    }
}
