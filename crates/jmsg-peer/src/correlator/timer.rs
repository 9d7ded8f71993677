//! Where per-call timers run.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

/// The caller's runtime when there is one; otherwise a process-wide
/// single-worker runtime started on first use, so a call registered from
/// plain threads still times out.
pub(super) fn runtime() -> Option<Handle> {
    if let Ok(rt) = Handle::try_current() {
        return Some(rt);
    }

    static BACKGROUND: OnceLock<Option<Runtime>> = OnceLock::new();
    BACKGROUND
        .get_or_init(|| {
            let built = Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("jmsg-timer")
                .enable_time()
                .build();
            match built {
                Ok(rt) => {
                    tracing::debug!("started background timer runtime");
                    Some(rt)
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to start background timer runtime");
                    None
                }
            }
        })
        .as_ref()
        .map(|rt| rt.handle().clone())
}
