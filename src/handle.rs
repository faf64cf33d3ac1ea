//! Reference-counted ownership of native objects.
//!
//! A [`Handle`] owns exactly one native reference. Cloning retains, dropping
//! releases, and [`Handle::release`] releases eagerly while reporting the
//! driver's status. Once released a handle cannot be reached again: release
//! consumes it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::driver::{Driver, RawContext, RawKernel, RawMem, RawProgram, RawSampler};
use crate::error::Result;

/// A reference-counted native object kind.
pub trait HandleKind {
    type Raw: Copy + Eq + Hash + fmt::Debug;

    /// Kind name used in logs.
    const NAME: &'static str;

    fn retain(driver: &dyn Driver, raw: Self::Raw) -> Result<()>;
    fn release(driver: &dyn Driver, raw: Self::Raw) -> Result<()>;
}

macro_rules! handle_kind {
    ($kind:ident, $raw:ty, $name:literal, $retain:ident, $release:ident) => {
        #[derive(Debug)]
        pub enum $kind {}

        impl HandleKind for $kind {
            type Raw = $raw;

            const NAME: &'static str = $name;

            fn retain(driver: &dyn Driver, raw: $raw) -> Result<()> {
                driver.$retain(raw)
            }

            fn release(driver: &dyn Driver, raw: $raw) -> Result<()> {
                driver.$release(raw)
            }
        }
    };
}

handle_kind!(ContextKind, RawContext, "context", retain_context, release_context);
handle_kind!(ProgramKind, RawProgram, "program", retain_program, release_program);
handle_kind!(KernelKind, RawKernel, "kernel", retain_kernel, release_kernel);
handle_kind!(MemKind, RawMem, "mem", retain_mem, release_mem);
handle_kind!(SamplerKind, RawSampler, "sampler", retain_sampler, release_sampler);

/// Owned native reference to an object of kind `K`.
pub struct Handle<K: HandleKind> {
    driver: Arc<dyn Driver>,
    raw: K::Raw,
    /// Set by `release`; the destructor then has nothing left to give back.
    released: bool,
}

impl<K: HandleKind> Handle<K> {
    /// Takes ownership of a reference the caller already holds (e.g. the one
    /// returned by a `clCreate*` call).
    pub fn from_owned(driver: Arc<dyn Driver>, raw: K::Raw) -> Self {
        log::trace!("Acquired {} {:?} ({})", K::NAME, raw, driver.name());
        Self {
            driver,
            raw,
            released: false,
        }
    }

    /// Retains `raw` and wraps the new reference. Used for handles a query
    /// returned without transferring ownership.
    pub fn retained(driver: Arc<dyn Driver>, raw: K::Raw) -> Result<Self> {
        K::retain(driver.as_ref(), raw)?;
        log::trace!("Retained {} {:?}", K::NAME, raw);
        Ok(Self {
            driver,
            raw,
            released: false,
        })
    }

    pub fn raw(&self) -> K::Raw {
        self.raw
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Retains a second reference. Unlike `Clone`, a failed retain is reported.
    pub fn try_clone(&self) -> Result<Self> {
        Self::retained(Arc::clone(&self.driver), self.raw)
    }

    /// Releases the reference now and reports the native status.
    pub fn release(mut self) -> Result<()> {
        log::trace!("Releasing {} {:?}", K::NAME, self.raw);
        self.released = true;
        K::release(self.driver.as_ref(), self.raw)
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    /// Panics if the driver refuses to retain a live handle, which only
    /// happens if the native object was released behind this handle's back.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(handle) => handle,
            Err(e) => panic!("failed to retain {} {:?}: {}", K::NAME, self.raw, e),
        }
    }
}

impl<K: HandleKind> Drop for Handle<K> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::trace!("Dropping {} {:?}", K::NAME, self.raw);
        if let Err(e) = K::release(self.driver.as_ref(), self.raw) {
            log::warn!("Failed to release {} {:?}: {}", K::NAME, self.raw, e);
        }
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .field("driver", &self.driver.name())
            .finish()
    }
}

/// Two handles are equal when they refer to the same native object.
impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ContextInfo, SimDriver};
    use crate::error::{ClError, Status};

    fn sim() -> (Arc<SimDriver>, Arc<dyn Driver>) {
        let sim = Arc::new(SimDriver::new());
        let driver: Arc<dyn Driver> = sim.clone();
        (sim, driver)
    }

    fn context_refcount(driver: &dyn Driver, raw: RawContext) -> u32 {
        driver
            .context_info(raw, ContextInfo::ReferenceCount)
            .unwrap()
            .into_uint("count")
            .unwrap()
    }

    fn new_context(driver: &Arc<dyn Driver>) -> Handle<ContextKind> {
        let platform = driver.platform_ids().unwrap()[0];
        let devices = driver
            .device_ids(platform, crate::types::DeviceType::ALL)
            .unwrap();
        let raw = driver.create_context(&devices[..1]).unwrap();
        Handle::from_owned(Arc::clone(driver), raw)
    }

    #[test]
    fn test_clone_retains_and_drop_releases() {
        let (sim, driver) = sim();
        let handle = new_context(&driver);
        let raw = handle.raw();
        assert_eq!(context_refcount(driver.as_ref(), raw), 1);

        let second = handle.clone();
        assert_eq!(second, handle);
        assert_eq!(context_refcount(driver.as_ref(), raw), 2);

        drop(second);
        assert_eq!(context_refcount(driver.as_ref(), raw), 1);

        drop(handle);
        assert_eq!(sim.live_objects(), 0);
    }

    #[test]
    fn test_release_is_deterministic() {
        let (sim, driver) = sim();
        let handle = new_context(&driver);
        let raw = handle.raw();

        handle.release().unwrap();
        assert_eq!(sim.live_objects(), 0);

        // The object is gone; the raw value is now invalid.
        let err = driver.context_info(raw, ContextInfo::ReferenceCount).unwrap_err();
        assert_eq!(err.status(), Some(Status::InvalidContext));
    }

    #[test]
    fn test_failed_release_is_not_repeated_on_drop() {
        let (sim, driver) = sim();
        let handle = new_context(&driver);
        let raw = handle.raw();

        sim.fail_next("clReleaseContext", Status::OutOfHostMemory);
        let err = handle.release().unwrap_err();
        assert_eq!(err.status(), Some(Status::OutOfHostMemory));

        // The handle was consumed without a second release, so the reference
        // it held is still counted.
        assert_eq!(context_refcount(driver.as_ref(), raw), 1);
        driver.release_context(raw).unwrap();
        assert_eq!(sim.live_objects(), 0);
    }

    #[test]
    fn test_retained_wraps_borrowed_reference() {
        let (_sim, driver) = sim();
        let owner = new_context(&driver);
        let borrowed = Handle::<ContextKind>::retained(Arc::clone(&driver), owner.raw()).unwrap();
        assert_eq!(context_refcount(driver.as_ref(), owner.raw()), 2);
        borrowed.release().unwrap();
        assert_eq!(context_refcount(driver.as_ref(), owner.raw()), 1);
    }

    #[test]
    fn test_retain_of_dead_object_fails() {
        let (_sim, driver) = sim();
        let handle = new_context(&driver);
        let raw = handle.raw();
        handle.release().unwrap();

        let err = Handle::<ContextKind>::retained(Arc::clone(&driver), raw).unwrap_err();
        assert!(matches!(
            err,
            ClError::Native {
                operation: "clRetainContext",
                status: Status::InvalidContext
            }
        ));
    }
}
