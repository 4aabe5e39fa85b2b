use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::runtime::Runtime;

/// Extraction directories to remove if the process is interrupted mid-install
#[derive(Default)]
pub struct CleanupContext {
    #[cfg(test)]
    pub paths: Vec<PathBuf>,
    #[cfg(not(test))]
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Forget a path, e.g. once the install has removed it itself
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Remove every registered path that still exists
    pub fn cleanup<R: Runtime>(&self, runtime: &R) {
        for path in &self.paths {
            if !runtime.exists(path) {
                continue;
            }
            debug!("Cleaning up: {:?}", path);
            let result = if runtime.is_dir(path) {
                runtime.remove_dir_all(path)
            } else {
                runtime.remove_file(path)
            };
            if let Err(e) = result {
                warn!("Failed to clean up {:?}: {:#}", path, e);
            }
        }
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Keeps a path registered until [`success`](CleanupGuard::success) is called
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        match ctx.lock() {
            Ok(mut guard) => guard.add(path.clone()),
            Err(_) => warn!("Cleanup context is poisoned; {:?} is not tracked", path),
        }
        Self { ctx, path }
    }

    /// The path no longer needs cleaning up on interruption
    pub fn success(self) {
        if let Ok(mut guard) = self.ctx.lock() {
            guard.remove(&self.path);
        }
    }
}
