//! SIGINT/SIGTERM handling.
//!
//! The handler only flips an atomic flag; the decision loop polls it once
//! per iteration through its display surface.

use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Register SIGINT and SIGTERM to set the returned flag.
pub fn install() -> std::io::Result<Arc<AtomicBool>> {
    let quit = Arc::new(AtomicBool::new(false));
    for signum in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signum, Arc::clone(&quit))?;
    }
    tracing::debug!("signal handlers installed");
    Ok(quit)
}
