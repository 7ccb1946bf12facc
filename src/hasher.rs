//! Dirty-region detector: incremental rolling row/column sum hashing.
//!
//! Grounded on `original_source/VNCScreenHash.cpp`'s C reference
//! `computeHashes` (the 68K-assembly `computeHashesFast`/`computeHashesFastest`
//! variants in that file are accelerants, not the algorithm this module
//! follows). A full framebuffer pass is split across roughly sixteen ticks —
//! `rows_per_tick = max(1, height / 16)` — each tick accumulating an additive
//! sum per row and, simultaneously, a running additive sum per column across
//! every row processed so far. Comparing the finished pass's row/column sums
//! against the previous pass's localizes the changed region without ever
//! diffing individual pixels.

use crate::framebuffer::FrameBuffer;
use crate::protocol::Rect;

const SCAN_TICKS: u32 = 16;

#[derive(Debug, Clone)]
struct HashState {
    row_hash: Vec<u32>,
    col_hash: Vec<u32>,
}

impl HashState {
    fn new(width: usize, height: usize) -> Self {
        Self { row_hash: vec![0; height], col_hash: vec![0; width] }
    }
}

/// Outcome of a single [`DirtyHasher::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasherOutcome {
    /// A scan is already in progress for an already-pending request.
    Busy,
    /// The scan is still in progress; no verdict yet.
    Pending,
    /// A scan completed and found this region changed (possibly empty, see
    /// [`Rect::is_empty`] — an empty rect after 16 ticks of no new damage
    /// means "report no changes").
    Dirty(Rect),
}

/// Incremental dirty-region tracker for one framebuffer.
pub struct DirtyHasher {
    width: usize,
    height: usize,
    prev: HashState,
    next: HashState,
    scan_row: usize,
    request_pending: bool,
    scan_in_flight: bool,
    idle_ticks: u32,
    accumulated: Rect,
}

impl DirtyHasher {
    /// Creates a hasher for a framebuffer of the given dimensions.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self {
            width: w,
            height: h,
            prev: HashState::new(w, h),
            next: HashState::new(w, h),
            scan_row: 0,
            request_pending: false,
            scan_in_flight: false,
            idle_ticks: 0,
            accumulated: Rect { x: 0, y: 0, w: 0, h: 0 },
        }
    }

    /// Requests a dirty-region scan. Returns `Err(())` (BUSY) if a scan is
    /// already in flight, mirroring `VNCScreenHash::requestDirtyRect`'s
    /// already-has-a-callback gate.
    pub fn request_scan(&mut self) -> Result<(), ()> {
        if self.scan_in_flight {
            return Err(());
        }
        self.request_pending = true;
        self.scan_in_flight = true;
        Ok(())
    }

    /// Advances the scan by one tick's worth of rows, reading pixels from
    /// `fb` through the FB Adapter boundary. Call this once per Scheduler
    /// tick regardless of whether a scan was requested; the hasher tracks
    /// its own progress.
    pub fn tick(&mut self, fb: &dyn FrameBuffer) -> HasherOutcome {
        if !self.scan_in_flight {
            return HasherOutcome::Pending;
        }

        let rows_per_tick = (self.height / SCAN_TICKS as usize).max(1);
        let rows_this_tick = rows_per_tick.min(self.height - self.scan_row);
        self.compute_rows(fb, self.scan_row, rows_this_tick);
        self.scan_row += rows_this_tick;

        if self.scan_row < self.height {
            return HasherOutcome::Pending;
        }

        // Full pass complete.
        self.scan_row = 0;
        std::mem::swap(&mut self.prev, &mut self.next);
        for v in &mut self.next.row_hash {
            *v = 0;
        }
        for v in &mut self.next.col_hash {
            *v = 0;
        }
        let dirty = self.compute_dirty();
        self.accumulated = self.accumulated.union(&dirty);

        if self.request_pending {
            self.request_pending = false;
            self.scan_in_flight = false;
            let result = self.accumulated;
            self.accumulated = Rect { x: 0, y: 0, w: 0, h: 0 };
            HasherOutcome::Dirty(result)
        } else if dirty.is_empty() {
            self.idle_ticks += 1;
            if self.idle_ticks >= SCAN_TICKS {
                self.idle_ticks = 0;
                self.scan_in_flight = false;
                let result = self.accumulated;
                self.accumulated = Rect { x: 0, y: 0, w: 0, h: 0 };
                HasherOutcome::Dirty(result)
            } else {
                // Keep accumulating: restart the pass without clearing
                // `accumulated` so newly-dirtied rows during the quiet
                // period still get reported once idle_ticks expires.
                HasherOutcome::Pending
            }
        } else {
            self.idle_ticks = 0;
            HasherOutcome::Pending
        }
    }

    fn compute_rows(&mut self, fb: &dyn FrameBuffer, start_row: usize, count: usize) {
        let bpp = fb.pixel_format().bytes_per_pixel().max(1);
        let mut row_buf = vec![0u8; self.width * bpp];
        for row in start_row..start_row + count {
            fb.read_rect(
                Rect { x: 0, y: row as u16, w: self.width as u16, h: 1 },
                &mut row_buf,
            );
            let mut row_sum: u32 = 0;
            for (col, chunk) in row_buf.chunks_exact(bpp).enumerate() {
                let word = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                row_sum = row_sum.wrapping_add(word);
                self.next.col_hash[col] = self.next.col_hash[col].wrapping_add(word);
            }
            self.next.row_hash[row] = row_sum;
        }
    }

    /// Finds the first/last differing row and column between `prev` and
    /// `next`, forward and backward, matching `computeDirty`'s scan pattern.
    fn compute_dirty(&self) -> Rect {
        let first_row = (0..self.height).find(|&r| self.prev.row_hash[r] != self.next.row_hash[r]);
        let Some(first_row) = first_row else {
            return Rect { x: 0, y: 0, w: 0, h: 0 };
        };
        let last_row = (0..self.height).rev().find(|&r| self.prev.row_hash[r] != self.next.row_hash[r]).unwrap_or(first_row);

        let first_col = (0..self.width).find(|&c| self.prev.col_hash[c] != self.next.col_hash[c]).unwrap_or(0);
        let last_col = (0..self.width).rev().find(|&c| self.prev.col_hash[c] != self.next.col_hash[c]).unwrap_or(self.width - 1);

        Rect {
            x: first_col as u16,
            y: first_row as u16,
            w: (last_col - first_col + 1) as u16,
            h: (last_row - first_row + 1) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::TestFrameBuffer;
    use crate::protocol::PixelFormat;

    fn run_full_pass(hasher: &mut DirtyHasher, fb: &dyn FrameBuffer) -> HasherOutcome {
        let mut outcome = HasherOutcome::Pending;
        for _ in 0..SCAN_TICKS + 1 {
            outcome = hasher.tick(fb);
            if !matches!(outcome, HasherOutcome::Pending) {
                break;
            }
        }
        outcome
    }

    #[test]
    fn busy_when_scan_already_requested() {
        let mut hasher = DirtyHasher::new(16, 16);
        assert!(hasher.request_scan().is_ok());
        assert!(hasher.request_scan().is_err());
    }

    #[test]
    fn first_pass_over_blank_buffer_reports_no_change() {
        let fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        let mut hasher = DirtyHasher::new(32, 32);
        hasher.request_scan().unwrap();
        let outcome = run_full_pass(&mut hasher, &fb);
        match outcome {
            HasherOutcome::Dirty(r) => assert!(r.is_empty()),
            other => panic!("expected Dirty(empty), got {other:?}"),
        }
    }

    #[test]
    fn changed_region_is_localized() {
        let mut fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        let mut hasher = DirtyHasher::new(32, 32);

        // Prime prev state with an initial scan over the blank buffer.
        hasher.request_scan().unwrap();
        run_full_pass(&mut hasher, &fb);

        // Paint a small square and rescan.
        {
            let pixels = fb.pixels_mut();
            let stride = 32 * 4;
            for y in 8..12 {
                for x in 8..12 {
                    let off = y * stride + x * 4;
                    pixels[off] = 0xFF;
                }
            }
        }
        hasher.request_scan().unwrap();
        let outcome = run_full_pass(&mut hasher, &fb);
        match outcome {
            HasherOutcome::Dirty(r) => {
                assert!(!r.is_empty());
                assert!(r.x <= 8 && r.y <= 8);
                assert!(r.x + r.w >= 12 && r.y + r.h >= 12);
            }
            other => panic!("expected Dirty, got {other:?}"),
        }
    }
}
