//! Scoped suppression of live-bridge handlers around engine writes.
//!
//! When the engine writes to a registry, the handler that would mirror that
//! write back to the other side must not fire. The guard takes the handler
//! out of the written side's hub for the duration of one closure; the
//! [`Suppression`](grouplink_core::Suppression) it holds puts it back on drop,
//! so an early return or a panic cannot leave the handler unregistered.

use grouplink_core::{CrmEvent, EventHub, HandlerId, PlatformEvent, Side};

#[derive(Clone, Copy)]
pub struct MutationGuard<'a> {
    crm: &'a EventHub<CrmEvent>,
    platform: &'a EventHub<PlatformEvent>,
}

impl<'a> MutationGuard<'a> {
    pub fn new(crm: &'a EventHub<CrmEvent>, platform: &'a EventHub<PlatformEvent>) -> Self {
        Self { crm, platform }
    }

    /// Run `f` with `handler` removed from `side`'s hub.
    ///
    /// A handler that is not registered is left alone.
    pub fn with_suppressed<R>(&self, side: Side, handler: HandlerId, f: impl FnOnce() -> R) -> R {
        match side {
            Side::Crm => {
                let _quiet = self.crm.suppress(handler);
                f()
            }
            Side::Platform => {
                let _quiet = self.platform.suppress(handler);
                f()
            }
        }
    }
}
