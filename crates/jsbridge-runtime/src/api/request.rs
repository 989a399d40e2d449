//! Request protocol
//!
//! Every operation that touches engine memory runs inside a request. The
//! outermost request on a runtime takes the engine lock through
//! [`rquickjs::Context::with`]; nested requests, including requests on a
//! sibling context made from a host callback, reuse the acquisition that is
//! already active. Depth is tracked per context and per runtime and is
//! restored by [`RequestGuard`] on every exit path.

use crate::api::context::ContextInner;
use crate::error::Result;
use log::trace;
use rquickjs::Ctx;

/// Scoped request registration; dropping it leaves the request
pub(crate) struct RequestGuard<'a> {
    context: &'a ContextInner,
}

impl<'a> RequestGuard<'a> {
    /// Register a request on `context`; returns whether it is the outermost one on its runtime
    pub(crate) fn enter(context: &'a ContextInner) -> (Self, bool) {
        let runtime = &context.runtime;
        let outermost = runtime.depth.get() == 0;
        runtime.depth.set(runtime.depth.get() + 1);
        context.depth.set(context.depth.get() + 1);
        trace!(
            "enter request on {} (context depth {}, runtime depth {})",
            runtime.id,
            context.depth.get(),
            runtime.depth.get()
        );
        (Self { context }, outermost)
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let runtime = &self.context.runtime;
        self.context.depth.set(self.context.depth.get().saturating_sub(1));
        runtime.depth.set(runtime.depth.get().saturating_sub(1));
        trace!(
            "leave request on {} (context depth {}, runtime depth {})",
            runtime.id,
            self.context.depth.get(),
            runtime.depth.get()
        );
    }
}

/// Run `f` inside a request on `context`
pub(crate) fn with_request<R, F>(context: &ContextInner, f: F) -> Result<R>
where
    F: for<'js> FnOnce(Ctx<'js>) -> Result<R>,
{
    let (_guard, outermost) = RequestGuard::enter(context);
    if outermost {
        context.engine.with(f)
    } else {
        // SAFETY: a request is active on this runtime, so the engine lock is
        // held further up the stack and `raw` is kept alive by `context.engine`.
        let ctx = unsafe { Ctx::from_raw(context.raw) };
        f(ctx)
    }
}
