//! Node Object Pool
//!
//! A named arena of fixed-shape objects. Each memory block is built once by
//! [`PoolObject::init_once`] on its first allocation and then recycled: a
//! released block goes back on the free list with its embedded state intact
//! and is handed out again by a later [`ObjectPool::acquire`].
//!
//! Slot handles carry a generation so a handle kept past its release is
//! recognised and refused.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

/// Object that can live in an [`ObjectPool`]
pub trait PoolObject: Send + Sync + 'static {
    /// One-time construction of the block at `index`
    fn init_once(index: usize) -> Self;
}

/// Handle to one acquired block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    pub(super) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(&self) -> u32 {
        self.index
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Pool errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Name already taken or no memory for the slot table
    InitError,
    /// Block limit reached
    Exhausted,
    /// Handle refers to a free block or to an earlier lifetime of it
    BadSlot,
    /// Blocks still outstanding
    Busy,
    /// Pool was destroyed
    Destroyed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitError => write!(f, "Pool initialisation failed"),
            Self::Exhausted => write!(f, "Pool exhausted"),
            Self::BadSlot => write!(f, "Stale or free pool slot"),
            Self::Busy => write!(f, "Pool has outstanding objects"),
            Self::Destroyed => write!(f, "Pool destroyed"),
        }
    }
}

struct Slot<T> {
    obj: Arc<T>,
    generation: u32,
    in_use: bool,
}

struct PoolInner<T> {
    slots: Vec<Slot<T>>,
    /// Indices of released blocks, most recent last
    free: Vec<usize>,
    outstanding: usize,
    limit: usize,
    destroyed: bool,
}

/// Names of live pools
static POOL_NAMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Named arena of `T` blocks
pub struct ObjectPool<T: PoolObject> {
    name: &'static str,
    inner: Mutex<PoolInner<T>>,
}

impl<T: PoolObject> ObjectPool<T> {
    /// Create a pool that hands out at most `limit` blocks
    pub fn create(name: &'static str, limit: usize) -> Result<Arc<Self>, PoolError> {
        if limit == 0 {
            return Err(PoolError::InitError);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve(limit.min(64))
            .map_err(|_| PoolError::InitError)?;

        let mut names = POOL_NAMES.lock();
        if names.contains(&name) {
            log::warn!("[POOL] Pool '{}' already exists", name);
            return Err(PoolError::InitError);
        }
        names.push(name);
        drop(names);

        log::info!("[POOL] Created pool '{}' (limit {})", name, limit);
        Ok(Arc::new(Self {
            name,
            inner: Mutex::new(PoolInner {
                slots,
                free: Vec::new(),
                outstanding: 0,
                limit,
                destroyed: false,
            }),
        }))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hand out a block, constructing it on first use
    pub fn acquire(&self) -> Result<(SlotId, Arc<T>), PoolError> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(PoolError::Destroyed);
        }

        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                if inner.slots.len() >= inner.limit {
                    log::debug!("[POOL] '{}' exhausted at {} blocks", self.name, inner.limit);
                    return Err(PoolError::Exhausted);
                }
                let index = inner.slots.len();
                inner
                    .slots
                    .try_reserve(1)
                    .map_err(|_| PoolError::Exhausted)?;
                inner.slots.push(Slot {
                    obj: Arc::new(T::init_once(index)),
                    generation: 0,
                    in_use: false,
                });
                index
            }
        };

        inner.outstanding += 1;
        let slot = &mut inner.slots[index];
        slot.in_use = true;
        Ok((SlotId::new(index as u32, slot.generation), slot.obj.clone()))
    }

    /// Return a block to the pool
    ///
    /// The handle and every copy of it become stale.
    pub fn release(&self, id: SlotId) -> Result<(), PoolError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let slot = inner
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.in_use && slot.generation == id.generation)
            .ok_or(PoolError::BadSlot)?;

        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(id.index as usize);
        inner.outstanding -= 1;
        Ok(())
    }

    /// Blocks currently handed out
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Blocks ever constructed
    pub fn constructed(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn limit(&self) -> usize {
        self.inner.lock().limit
    }

    /// Change the block limit; blocks already constructed are kept
    pub fn set_limit(&self, limit: usize) {
        self.inner.lock().limit = limit;
    }

    /// Destroy a pool
    ///
    /// `None` is accepted so a failed creation can be cleaned up
    /// unconditionally. Destroying twice is harmless. A pool with blocks
    /// still outstanding is left alone.
    pub fn destroy(pool: Option<Arc<Self>>) -> Result<(), PoolError> {
        let Some(pool) = pool else {
            return Ok(());
        };

        let mut inner = pool.inner.lock();
        if inner.destroyed {
            return Ok(());
        }
        if inner.outstanding > 0 {
            log::error!(
                "[POOL] Refusing to destroy '{}': {} objects outstanding",
                pool.name,
                inner.outstanding
            );
            return Err(PoolError::Busy);
        }

        inner.destroyed = true;
        inner.slots.clear();
        inner.free.clear();
        drop(inner);

        unregister_name(pool.name);
        log::info!("[POOL] Destroyed pool '{}'", pool.name);
        Ok(())
    }
}

impl<T: PoolObject> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        if !self.inner.get_mut().destroyed {
            unregister_name(self.name);
        }
    }
}

fn unregister_name(name: &'static str) {
    POOL_NAMES.lock().retain(|n| *n != name);
}
