//! Address-ordered block list with best-fit placement

use tracing::debug;

use super::{AllocatorError, ArenaStats};
use crate::recorder::MemoryEvent;

/// One header-prefixed region of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the block header
    pub offset: u64,
    /// Payload size (header excluded)
    pub size: u64,
    /// Whether the block can be handed out
    pub is_free: bool,
}

impl Block {
    /// Snapshot row for this block.
    pub fn to_event(&self) -> MemoryEvent {
        MemoryEvent::new(self.offset, self.size, self.is_free)
    }
}

/// Handle to a live allocation.
///
/// Not `Clone`: freeing consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    offset: u64,
    payload: u64,
    size: u64,
}

impl Allocation {
    /// Offset of the block header.
    pub fn block_offset(&self) -> u64 {
        self.offset
    }

    /// Offset of the first payload byte (what `malloc` would return).
    pub fn payload_offset(&self) -> u64 {
        self.payload
    }

    /// Payload bytes granted, which may exceed the request.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Best-fit free-list allocator over a simulated arena
#[derive(Debug)]
pub struct BestFitAllocator {
    arena_size: u64,
    header_size: u64,
    /// Address-ordered; adjacent entries are physical neighbours
    blocks: Vec<Block>,
}

impl BestFitAllocator {
    /// Create an arena holding a single free block.
    pub fn new(arena_size: u64, header_size: u64) -> Result<Self, AllocatorError> {
        Self::check_geometry(arena_size, header_size)?;
        Ok(Self {
            arena_size,
            header_size,
            blocks: vec![Block {
                offset: 0,
                size: arena_size - header_size,
                is_free: true,
            }],
        })
    }

    /// The arena must leave room for at least one payload byte.
    pub fn check_geometry(arena_size: u64, header_size: u64) -> Result<(), AllocatorError> {
        if arena_size <= header_size {
            return Err(AllocatorError::InvalidArena {
                arena_size,
                header_size,
            });
        }
        Ok(())
    }

    /// Total arena size in bytes.
    pub fn arena_size(&self) -> u64 {
        self.arena_size
    }

    /// Per-block header overhead in bytes.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Current blocks in address order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Snapshot rows for the current state.
    pub fn snapshot(&self) -> Vec<MemoryEvent> {
        self.blocks.iter().map(Block::to_event).collect()
    }

    /// Usage summary.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats::from_blocks(self.blocks.iter().map(|b| (b.size, b.is_free)))
    }

    /// Allocate `size` payload bytes from the smallest free block that fits.
    pub fn allocate(&mut self, size: u64) -> Result<Allocation, AllocatorError> {
        if size == 0 {
            return Err(AllocatorError::ZeroSize);
        }

        let index = self.find_best_fit(size).ok_or_else(|| AllocatorError::OutOfMemory {
            requested: size,
            largest_free: self.stats().largest_free,
        })?;

        if self.blocks[index].size > size + self.header_size {
            self.split(index, size);
        } else {
            self.blocks[index].is_free = false;
        }

        let block = self.blocks[index];
        debug!(offset = block.offset, requested = size, granted = block.size, "allocated block");
        Ok(Allocation {
            offset: block.offset,
            payload: block.offset + self.header_size,
            size: block.size,
        })
    }

    /// Release an allocation and merge it with free neighbours.
    ///
    /// Returns the offset of the block that now covers the released region.
    pub fn free(&mut self, allocation: Allocation) -> Result<u64, AllocatorError> {
        let offset = self.release(allocation)?;
        Ok(self.coalesce(offset))
    }

    /// Mark an allocation free without touching its neighbours.
    ///
    /// Until [`coalesce`](Self::coalesce) runs, the released block may sit
    /// next to other free blocks.
    pub fn release(&mut self, allocation: Allocation) -> Result<u64, AllocatorError> {
        let offset = allocation.offset;
        let index = self
            .index_of(offset)
            .ok_or(AllocatorError::UnknownBlock { offset })?;

        if self.blocks[index].is_free {
            return Err(AllocatorError::DoubleFree { offset });
        }
        self.blocks[index].is_free = true;
        debug!(offset, "released block");
        Ok(offset)
    }

    /// Merge the free block at `offset` with free neighbours, right first.
    ///
    /// Returns the offset of the surviving block. Offsets that do not name
    /// a free block are returned unchanged.
    pub fn coalesce(&mut self, offset: u64) -> u64 {
        let Some(mut index) = self.index_of(offset) else {
            return offset;
        };
        if !self.blocks[index].is_free {
            return offset;
        }

        if index + 1 < self.blocks.len() && self.blocks[index + 1].is_free {
            let next = self.blocks.remove(index + 1);
            self.blocks[index].size += self.header_size + next.size;
        }

        if index > 0 && self.blocks[index - 1].is_free {
            let current = self.blocks.remove(index);
            index -= 1;
            self.blocks[index].size += self.header_size + current.size;
        }

        let merged = self.blocks[index].offset;
        debug!(offset, merged_into = merged, size = self.blocks[index].size, "coalesced block");
        merged
    }

    fn index_of(&self, offset: u64) -> Option<usize> {
        self.blocks.binary_search_by_key(&offset, |b| b.offset).ok()
    }

    fn find_best_fit(&self, size: u64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, block) in self.blocks.iter().enumerate() {
            if !block.is_free || block.size < size {
                continue;
            }
            match best {
                Some(current) if self.blocks[current].size <= block.size => {}
                _ => best = Some(idx),
            }
        }
        best
    }

    /// Carve `size` bytes off the front of a free block; the tail stays free.
    fn split(&mut self, index: usize, size: u64) {
        let block = &mut self.blocks[index];
        let remainder = Block {
            offset: block.offset + self.header_size + size,
            size: block.size - size - self.header_size,
            is_free: true,
        };
        block.size = size;
        block.is_free = false;
        self.blocks.insert(index + 1, remainder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA: u64 = 1024 * 1024;
    const HEADER: u64 = 32;

    fn allocator() -> BestFitAllocator {
        BestFitAllocator::new(ARENA, HEADER).unwrap()
    }

    fn tiled_bytes(alloc: &BestFitAllocator) -> u64 {
        alloc.blocks().iter().map(|b| b.size + HEADER).sum()
    }

    #[test]
    fn first_allocation_splits_the_arena() {
        let mut alloc = allocator();
        let a = alloc.allocate(256).unwrap();
        assert_eq!(a.block_offset(), 0);
        assert_eq!(a.payload_offset(), HEADER);
        assert_eq!(
            alloc.blocks(),
            &[
                Block { offset: 0, size: 256, is_free: false },
                Block { offset: 288, size: ARENA - 256 - 2 * HEADER, is_free: true },
            ]
        );
        assert_eq!(tiled_bytes(&alloc), ARENA);
    }

    #[test]
    fn best_fit_prefers_smallest_hole() {
        let mut alloc = allocator();
        let a = alloc.allocate(512).unwrap();
        let _b = alloc.allocate(64).unwrap();
        let c = alloc.allocate(128).unwrap();
        let _d = alloc.allocate(64).unwrap();
        alloc.free(a).unwrap();
        alloc.free(c).unwrap();

        // Holes of 512 and 128 bytes plus the tail; 100 fits best in the 128 hole.
        let e = alloc.allocate(100).unwrap();
        assert_eq!(e.block_offset(), 512 + HEADER + 64 + HEADER);
        assert_eq!(e.size(), 128, "remainder too small to split");
    }

    #[test]
    fn ties_go_to_the_lowest_address() {
        let mut alloc = allocator();
        let a = alloc.allocate(64).unwrap();
        let _b = alloc.allocate(64).unwrap();
        let c = alloc.allocate(64).unwrap();
        let _d = alloc.allocate(64).unwrap();
        let a_offset = a.block_offset();
        alloc.free(c).unwrap();
        alloc.free(a).unwrap();
        assert_eq!(alloc.allocate(64).unwrap().block_offset(), a_offset);
    }

    #[test]
    fn free_coalesces_both_neighbours() {
        let mut alloc = allocator();
        let a = alloc.allocate(100).unwrap();
        let b = alloc.allocate(200).unwrap();
        let c = alloc.allocate(300).unwrap();
        alloc.free(a).unwrap();
        alloc.free(c).unwrap();
        assert_eq!(alloc.blocks().len(), 3);

        let merged = alloc.free(b).unwrap();
        assert_eq!(merged, 0);
        assert_eq!(
            alloc.blocks(),
            &[Block { offset: 0, size: ARENA - HEADER, is_free: true }]
        );
    }

    #[test]
    fn release_leaves_neighbours_until_coalesce() {
        let mut alloc = allocator();
        let _a = alloc.allocate(64).unwrap();
        let b = alloc.allocate(64).unwrap();

        assert_eq!(alloc.release(b).unwrap(), 96);
        assert_eq!(
            alloc.blocks(),
            &[
                Block { offset: 0, size: 64, is_free: false },
                Block { offset: 96, size: 64, is_free: true },
                Block { offset: 192, size: ARENA - 192 - HEADER, is_free: true },
            ]
        );

        assert_eq!(alloc.coalesce(96), 96);
        assert_eq!(
            alloc.blocks(),
            &[
                Block { offset: 0, size: 64, is_free: false },
                Block { offset: 96, size: ARENA - 96 - HEADER, is_free: true },
            ]
        );
        assert_eq!(tiled_bytes(&alloc), ARENA);
    }

    #[test]
    fn coalesce_ignores_used_or_unknown_offsets() {
        let mut alloc = allocator();
        let a = alloc.allocate(64).unwrap();
        assert_eq!(alloc.coalesce(a.block_offset()), 0);
        assert_eq!(alloc.coalesce(12), 12);
        assert_eq!(alloc.blocks().len(), 2);
    }

    #[test]
    fn degenerate_arena_is_rejected() {
        for (arena_size, header_size) in [(32, 32), (16, 32), (0, 0)] {
            assert_eq!(
                BestFitAllocator::new(arena_size, header_size).unwrap_err(),
                AllocatorError::InvalidArena { arena_size, header_size }
            );
        }
        assert!(BestFitAllocator::new(33, 32).is_ok());
    }

    #[test]
    fn exact_fit_is_not_split() {
        let mut alloc = BestFitAllocator::new(HEADER + 100, HEADER).unwrap();
        let a = alloc.allocate(90).unwrap();
        assert_eq!(a.size(), 100);
        assert_eq!(alloc.blocks().len(), 1);
    }

    #[test]
    fn errors_are_reported() {
        let mut alloc = BestFitAllocator::new(HEADER + 100, HEADER).unwrap();
        assert_eq!(alloc.allocate(0), Err(AllocatorError::ZeroSize));
        assert_eq!(
            alloc.allocate(101),
            Err(AllocatorError::OutOfMemory { requested: 101, largest_free: 100 })
        );

        let bogus = Allocation { offset: 8, payload: 8 + HEADER, size: 1 };
        assert_eq!(alloc.free(bogus), Err(AllocatorError::UnknownBlock { offset: 8 }));

        let stale = Allocation { offset: 0, payload: HEADER, size: 100 };
        assert_eq!(alloc.free(stale), Err(AllocatorError::DoubleFree { offset: 0 }));
    }

    #[test]
    fn stats_track_usage() {
        let mut alloc = allocator();
        let _a = alloc.allocate(256).unwrap();
        let stats = alloc.stats();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.used_bytes, 256);
        assert_eq!(stats.free_bytes, ARENA - 256 - 2 * HEADER);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.fragmentation(), 0.0);
    }
}
