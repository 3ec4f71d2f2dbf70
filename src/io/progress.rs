use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
    time::Duration,
};

/// Progress events emitted while a partition is packed.
#[derive(Clone, Debug)]
pub enum PackProgress {
    Started {
        total: usize,
        workers: usize,
    },
    /// One track finished, in completion order.
    Track {
        done: usize,
        total: usize,
        index: usize,
        name: String,
        path: Option<PathBuf>,
        /// `(channels, samples)` of the packed mixture.
        mixture_shape: Option<(usize, usize)>,
        error: Option<String>,
    },
    Finished {
        packed: usize,
        failed: usize,
        elapsed: Duration,
    },
}

type ProgressCallback = Box<dyn Fn(&PackProgress) + Send + 'static>;

static PACK_PROGRESS_CB: OnceLock<Mutex<Option<ProgressCallback>>> = OnceLock::new();

/// Installs the process-wide progress callback. Only the first call wins.
pub fn set_pack_progress_callback(cb: impl Fn(&PackProgress) + Send + 'static) {
    let _ = PACK_PROGRESS_CB.set(Mutex::new(Some(Box::new(cb))));
}

pub fn emit_pack_progress(event: PackProgress) {
    if let Some(m) = PACK_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(&event);
            }
        }
    }
}
