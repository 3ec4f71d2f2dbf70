use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Instant,
};

use tracing::{debug, error, info};

use crate::{
    catalog::Catalog,
    core::packer::pack_track,
    error::{PackError, Result},
    io::progress::{emit_pack_progress, PackProgress},
    types::{FailurePolicy, PackOptions, PackedTrack, RunReport, TrackFailure, TrackHandle},
};

enum Outcome {
    Packed(PackedTrack),
    /// Failed; `seq` is the completion sequence number.
    Failed { seq: usize, failure: TrackFailure },
    /// Never started because an earlier failure aborted the run.
    NotStarted,
}

/// Runs `pack` once per track on a dedicated pool of `workers` threads.
///
/// Tracks start in list order and are reported in completion order.
/// Under [`FailurePolicy::Abort`] no track starts after the first failure
/// (tracks already running still finish) and that failure is returned.
pub fn run<F>(
    tracks: &[TrackHandle],
    workers: usize,
    policy: FailurePolicy,
    pack: F,
) -> Result<RunReport>
where
    F: Fn(&TrackHandle) -> Result<PackedTrack> + Sync,
{
    let started = Instant::now();
    let total = tracks.len();
    let workers = workers.max(1);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("stem-packer-{i}"))
        .build()
        .map_err(|e| PackError::Config(format!("Failed to build worker pool: {e}")))?;

    info!(total, workers, ?policy, "packing tracks");
    emit_pack_progress(PackProgress::Started { total, workers });

    // Held while emitting so events arrive in completion order.
    let done = Mutex::new(0usize);
    let complete = |emit: &dyn Fn(usize) -> PackProgress| -> usize {
        let mut n = done.lock().unwrap_or_else(|p| p.into_inner());
        *n += 1;
        emit_pack_progress(emit(*n));
        *n
    };
    let abort = AtomicBool::new(false);

    // Each track is its own FIFO job, so tracks start in list order.
    let slots: Mutex<Vec<(usize, Outcome)>> = Mutex::new(Vec::with_capacity(total));
    let pack_one = |track: &TrackHandle| -> Outcome {
        if abort.load(Ordering::SeqCst) {
            debug!(track = %track.name, "not started, run aborted");
            return Outcome::NotStarted;
        }

        match pack(track) {
            Ok(packed) => {
                complete(&|seq| PackProgress::Track {
                    done: seq,
                    total,
                    index: track.index,
                    name: track.name.clone(),
                    path: Some(packed.path.clone()),
                    mixture_shape: Some(packed.mixture_shape),
                    error: None,
                });
                Outcome::Packed(packed)
            }
            Err(e) => {
                if policy == FailurePolicy::Abort {
                    abort.store(true, Ordering::SeqCst);
                }
                let reason = e.to_string();
                error!(index = track.index, track = %track.name, "{reason}");
                let seq = complete(&|seq| PackProgress::Track {
                    done: seq,
                    total,
                    index: track.index,
                    name: track.name.clone(),
                    path: None,
                    mixture_shape: None,
                    error: Some(reason.clone()),
                });
                Outcome::Failed {
                    seq,
                    failure: TrackFailure {
                        index: track.index,
                        name: track.name.clone(),
                        reason,
                    },
                }
            }
        }
    };

    pool.scope_fifo(|scope| {
        for (pos, track) in tracks.iter().enumerate() {
            let (pack_one, slots) = (&pack_one, &slots);
            scope.spawn_fifo(move |_| {
                let outcome = pack_one(track);
                slots
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push((pos, outcome));
            });
        }
    });

    let mut outcomes = slots.into_inner().unwrap_or_else(|p| p.into_inner());
    outcomes.sort_by_key(|(pos, _)| *pos);

    let mut packed = Vec::new();
    let mut failures: Vec<(usize, TrackFailure)> = Vec::new();
    let mut not_started = 0usize;
    for (_, outcome) in outcomes {
        match outcome {
            Outcome::Packed(p) => packed.push(p),
            Outcome::Failed { seq, failure } => failures.push((seq, failure)),
            Outcome::NotStarted => not_started += 1,
        }
    }
    failures.sort_by_key(|(seq, _)| *seq);
    let failures: Vec<TrackFailure> = failures.into_iter().map(|(_, f)| f).collect();

    let elapsed = started.elapsed();
    info!(
        packed = packed.len(),
        failed = failures.len(),
        not_started,
        "finished in {:.2}s",
        elapsed.as_secs_f64()
    );
    emit_pack_progress(PackProgress::Finished {
        packed: packed.len(),
        failed: failures.len(),
        elapsed,
    });

    if policy == FailurePolicy::Abort {
        if let Some(first) = failures.first() {
            return Err(PackError::TrackFailed {
                track: first.name.clone(),
                reason: first.reason.clone(),
            });
        }
    }

    Ok(RunReport {
        total,
        packed,
        failures,
        elapsed,
    })
}

/// Packs every track of `catalog` with `opts`.
pub fn pack_dataset<C: Catalog + ?Sized>(catalog: &C, opts: &PackOptions) -> Result<RunReport> {
    opts.validate()?;
    let tracks = catalog.list_tracks()?;
    info!(
        tracks = tracks.len(),
        output = %opts.output_dir.display(),
        sample_rate = opts.sample_rate,
        channels = ?opts.channels,
        resample = %opts.resample,
        "catalog listed"
    );
    std::fs::create_dir_all(&opts.output_dir).map_err(|e| PackError::io(&opts.output_dir, e))?;

    run(&tracks, opts.worker_count(), opts.failure_policy, |track| {
        pack_track(catalog, track, opts)
    })
}
