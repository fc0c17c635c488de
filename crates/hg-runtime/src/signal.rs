use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on the first Ctrl-C (or SIGTERM on unix).
pub async fn cancel_on_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = interrupt() => {}
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}

#[cfg(unix)]
async fn interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            hg_warn!(sys, error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = sigterm.recv() => {
            hg_info!(sys, signal = "SIGTERM", "received signal, stopping without flush");
        }
    }
}

#[cfg(not(unix))]
async fn interrupt() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => hg_info!(sys, signal = "SIGINT", "received signal, stopping without flush"),
        // never resolve: without a handler there is nothing to wait for
        Err(e) => {
            hg_warn!(sys, error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}
