use std::collections::HashMap;

/// Default number of idle textures kept per size before extras are dropped.
const DEFAULT_MAX_FREE_PER_SIZE: usize = 16;

/// Temporary-texture pool keyed by pixel size.
///
/// Depth textures live for a single camera render; the pool keeps released
/// ones around so the next frame at the same resolution allocates nothing.
pub struct TexturePool<T> {
    free: HashMap<(u32, u32), Vec<T>>,
    outstanding: usize,
    created: usize,
    max_free_per_size: usize,
}

impl<T> Default for TexturePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TexturePool<T> {
    pub fn new() -> Self {
        Self::with_max_free(DEFAULT_MAX_FREE_PER_SIZE)
    }

    pub fn with_max_free(max_free_per_size: usize) -> Self {
        Self {
            free: HashMap::new(),
            outstanding: 0,
            created: 0,
            max_free_per_size,
        }
    }

    /// Reuse an idle texture of this size, or build one with `create`.
    pub fn acquire(&mut self, width: u32, height: u32, create: impl FnOnce(u32, u32) -> T) -> T {
        self.outstanding += 1;
        if let Some(texture) = self.free.get_mut(&(width, height)).and_then(Vec::pop) {
            return texture;
        }
        self.created += 1;
        log::debug!("TexturePool: allocating {}x{} (total created {})", width, height, self.created);
        create(width, height)
    }

    pub fn release(&mut self, width: u32, height: u32, texture: T) {
        if self.outstanding == 0 {
            log::warn!("TexturePool: release without a matching acquire");
        } else {
            self.outstanding -= 1;
        }
        let list = self.free.entry((width, height)).or_default();
        if list.len() < self.max_free_per_size {
            list.push(texture);
        }
    }

    /// Drop idle textures whose size differs from the current one (after a resize).
    pub fn retain_size(&mut self, width: u32, height: u32) {
        self.free.retain(|&size, _| size == (width, height));
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }

    /// Textures acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Textures built over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_same_size() {
        let mut pool: TexturePool<u32> = TexturePool::new();
        let mut next = 0;
        let mut make = |_, _| {
            next += 1;
            next
        };
        let a = pool.acquire(64, 32, &mut make);
        assert_eq!(pool.outstanding(), 1);
        pool.release(64, 32, a);
        assert_eq!(pool.outstanding(), 0);

        let b = pool.acquire(64, 32, &mut make);
        assert_eq!(a, b);
        assert_eq!(pool.created(), 1);

        let c = pool.acquire(128, 32, &mut make);
        assert_ne!(b, c);
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.outstanding(), 2);
    }

    #[test]
    fn test_free_list_is_bounded() {
        let mut pool: TexturePool<u32> = TexturePool::with_max_free(1);
        let a = pool.acquire(8, 8, |_, _| 1);
        let b = pool.acquire(8, 8, |_, _| 2);
        pool.release(8, 8, a);
        pool.release(8, 8, b);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_retain_size_drops_stale() {
        let mut pool: TexturePool<u32> = TexturePool::new();
        let a = pool.acquire(8, 8, |_, _| 1);
        let b = pool.acquire(16, 16, |_, _| 2);
        pool.release(8, 8, a);
        pool.release(16, 16, b);
        pool.retain_size(16, 16);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.acquire(16, 16, |_, _| 3), 2);
    }
}
