//! Timing macros and scope guards.

use std::sync::atomic::{AtomicU64, Ordering};

use hotframe_core::Clock;

use crate::error::Result;
use crate::events::{CallSite, CallSiteId};
use crate::table::InstrumentationTable;

/// Id of one call site in the table that last used it.
///
/// The timing macros keep one of these in a `static` per call site, so only
/// the first activation against a table registers the site. Packs the
/// table token in the high half and the id in the low bits; 0 is empty.
#[derive(Debug, Default)]
pub struct SiteCache(AtomicU64);

impl SiteCache {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Cached id for `table`, registering `site()` on a miss.
    #[inline]
    pub fn get_or_register<C: Clock>(
        &self,
        table: &InstrumentationTable<C>,
        site: impl FnOnce() -> CallSite,
    ) -> Result<CallSiteId> {
        let token = u64::from(table.token()) << 32;
        let cached = self.0.load(Ordering::Relaxed);
        if cached & !0xffff_ffff == token {
            return Ok(CallSiteId((cached & 0xffff) as u16));
        }

        let id = table.register(site())?;
        self.0.store(token | u64::from(id.0), Ordering::Relaxed);
        Ok(id)
    }
}

/// RAII guard that closes a timed block on drop.
///
/// Dropping on any exit path (normal return, `?`, unwinding) adds the
/// elapsed time and the hit count to the call site exactly once.
#[must_use = "the block closes as soon as the guard is dropped"]
pub struct TimedBlock<'a, C: Clock> {
    table: &'a InstrumentationTable<C>,
    site: CallSiteId,
    start: u64,
    hits: u32,
}

impl<'a, C: Clock> TimedBlock<'a, C> {
    pub(crate) const fn from_parts(
        table: &'a InstrumentationTable<C>,
        site: CallSiteId,
        start: u64,
    ) -> Self {
        Self {
            table,
            site,
            start,
            hits: 1,
        }
    }

    /// Register `site` (if needed) and open a block on it.
    ///
    /// # Panics
    /// If the table is full. Running out of call-site slots means the table
    /// was sized too small for the program.
    #[inline]
    pub fn open(table: &'a InstrumentationTable<C>, site: CallSite) -> Self {
        match table.register(site) {
            Ok(id) => table.begin_timed_block(id),
            Err(e) => panic!("{}({}): {e}", site.function, site.line),
        }
    }

    /// Count this activation as `hits` hits.
    #[inline]
    pub const fn with_hits(mut self, hits: u32) -> Self {
        self.hits = hits;
        self
    }

    /// Change the hit count before the block closes.
    #[inline]
    pub fn set_hits(&mut self, hits: u32) {
        self.hits = hits;
    }

    /// Call site this block times.
    #[must_use]
    pub const fn site(&self) -> CallSiteId {
        self.site
    }

    /// Open a block on the site cached in `cache`, registering it with
    /// `table` the first time.
    ///
    /// # Panics
    /// If the table is full.
    #[inline]
    pub fn open_cached(
        table: &'a InstrumentationTable<C>,
        cache: &SiteCache,
        site: impl FnOnce() -> CallSite,
    ) -> Self {
        let mut requested = None;
        let id = cache.get_or_register(table, || *requested.insert(site()));
        match (id, requested) {
            (Ok(id), _) => table.begin_timed_block(id),
            (Err(e), Some(site)) => panic!("{}({}): {e}", site.function, site.line),
            (Err(e), None) => panic!("{e}"),
        }
    }

    /// Close the block now.
    #[inline]
    pub fn end(self) {}
}

impl<C: Clock> Drop for TimedBlock<'_, C> {
    #[inline]
    fn drop(&mut self) {
        self.table.end_raw(self.site, self.start, self.hits);
    }
}

/// Name of the enclosing function, without its module path.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        name.rsplit("::")
            .find(|segment| !segment.starts_with("{{"))
            .unwrap_or(name)
    }};
}

/// A [`CallSite`] for the current source location.
#[macro_export]
macro_rules! call_site {
    ($name:expr) => {
        $crate::CallSite::new(file!(), $name, line!())
    };
}

/// Time the rest of the enclosing scope under `name`.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```ignore
/// use hotframe_debug::timed_block;
///
/// fn simulate(table: &InstrumentationTable) {
///     timed_block!(table, "simulate");
///     // ... work
/// } // timing recorded here
/// ```
///
/// With a hit count (e.g. per processed item):
/// ```ignore
/// timed_block!(table, "draw_glyphs", glyphs.len() as u32);
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! timed_block {
    ($table:expr, $name:expr) => {
        let _timed_block = {
            static SITE: $crate::SiteCache = $crate::SiteCache::new();
            $crate::TimedBlock::open_cached(&$table, &SITE, || $crate::call_site!($name))
        };
    };
    ($table:expr, $name:expr, $hits:expr) => {
        let _timed_block = {
            static SITE: $crate::SiteCache = $crate::SiteCache::new();
            $crate::TimedBlock::open_cached(&$table, &SITE, || $crate::call_site!($name))
                .with_hits($hits)
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! timed_block {
    ($table:expr, $name:expr) => {};
    ($table:expr, $name:expr, $hits:expr) => {};
}

/// Time the rest of the enclosing function under its own name.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! timed_function {
    ($table:expr) => {
        let _timed_block = {
            static SITE: $crate::SiteCache = $crate::SiteCache::new();
            $crate::TimedBlock::open_cached(&$table, &SITE, || {
                $crate::call_site!($crate::function_name!())
            })
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! timed_function {
    ($table:expr) => {};
}

/// Record a frame boundary.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! frame_marker {
    ($table:expr) => {
        $table.frame_marker();
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! frame_marker {
    ($table:expr) => {};
}
