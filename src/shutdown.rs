//! Graceful shutdown coordinator.
//!
//! The first SIGINT or SIGTERM cancels a token the engine checks between
//! messages, so the current message finishes (and is recorded) before the
//! process exits. A second signal force-exits. Anything in flight at a hard
//! stop was never recorded and is simply retried on the next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let already_signalled = Arc::new(AtomicBool::new(false));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler")
        };

        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("failed to listen for Ctrl+C");
            }

            if already_signalled.swap(true, Ordering::SeqCst) {
                tracing::warn!("second signal, exiting immediately");
                std::process::exit(130);
            }
            tracing::info!("shutdown requested, finishing the current message");
            tracing::info!("press Ctrl+C again to force exit");
            handler_token.cancel();
        }
    });

    token
}
