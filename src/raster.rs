//! Rasterize pictures across a pool of threads.

use crate::picture::{self, Picture, BYTES_PER_PIXEL};
use log::debug;
use scoped_threadpool::Pool as ThreadPool;

/// Rasterizes pictures by shading bands of rows in parallel.
///
/// The resulting buffer is identical to that produced by `Picture::rasterize`.
pub struct Rasterizer {
    thread_pool: ThreadPool,
}

impl Rasterizer {
    /// Create a rasterizer with a thread for each logical CPU.
    pub fn new() -> Self {
        Self::with_num_threads(num_cpus::get() as _)
    }

    /// Create a rasterizer with the given number of threads.
    ///
    /// At least one thread is always used.
    pub fn with_num_threads(num_threads: u32) -> Self {
        let num_threads = num_threads.max(1);
        debug!("rasterizer using {} threads", num_threads);
        let thread_pool = ThreadPool::new(num_threads);
        Rasterizer { thread_pool }
    }

    /// The number of threads used to rasterize.
    pub fn num_threads(&self) -> u32 {
        self.thread_pool.thread_count()
    }

    /// Evaluate the picture over a `width` x `height` grid of pixels.
    ///
    /// See `Picture::rasterize` for the layout of the returned buffer.
    ///
    /// **Panics** if the buffer length overflows `usize`.
    pub fn rasterize(&mut self, picture: &Picture, width: usize, height: usize) -> Vec<u8> {
        let mut pixels = vec![0; picture::buffer_len(width, height)];
        if pixels.is_empty() {
            return pixels;
        }

        // Each thread shades one band of consecutive rows.
        let programs = picture.compile();
        let num_threads = self.thread_pool.thread_count() as usize;
        let rows_per_band = (height + num_threads - 1) / num_threads;
        let band_len = rows_per_band * width * BYTES_PER_PIXEL;
        self.thread_pool.scoped(|scoped| {
            let programs = &programs;
            for (band, pixels) in pixels.chunks_mut(band_len).enumerate() {
                scoped.execute(move || {
                    let first_row = band * rows_per_band;
                    picture::shade_rows(programs, width, height, first_row, pixels);
                });
            }
        });

        pixels
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Rasterizer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    #[test]
    fn matches_sequential() {
        let mut rng = XorShiftRng::seed_from_u64(21);
        let mut rasterizer = Rasterizer::with_num_threads(3);
        for _ in 0..5 {
            let mut picture = Picture::generate(&mut rng);
            for _ in 0..3 {
                picture.mutate(&mut rng);
            }
            for &(w, h) in &[(16, 9), (1, 7), (7, 1), (5, 2)] {
                assert_eq!(rasterizer.rasterize(&picture, w, h), picture.rasterize(w, h));
            }
        }
    }

    #[test]
    fn empty() {
        let mut rng = XorShiftRng::seed_from_u64(22);
        let picture = Picture::generate(&mut rng);
        let mut rasterizer = Rasterizer::default();
        assert!(rasterizer.rasterize(&picture, 0, 10).is_empty());
        assert!(rasterizer.rasterize(&picture, 10, 0).is_empty());
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn overflowing_size() {
        let mut rng = XorShiftRng::seed_from_u64(23);
        let picture = Picture::generate(&mut rng);
        Rasterizer::with_num_threads(2).rasterize(&picture, 4, std::usize::MAX / 2);
    }

    #[test]
    fn at_least_one_thread() {
        assert_eq!(Rasterizer::with_num_threads(0).num_threads(), 1);
    }
}
