use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use ndarray::Array2;
use stem_packer_core::{
    pack_dataset, run, FailurePolicy, PackError, PackOptions, PackedRecord, PackedTrack,
    ResampleAlgorithm, SourceType, TrackHandle,
};
use tempfile::tempdir;

mod common;
use common::{files_in, sine, MemoryCatalog};

fn catalog_with(tracks: usize) -> MemoryCatalog {
    let mut catalog = MemoryCatalog::default();
    for i in 0..tracks {
        let name = format!("track {i:02}");
        catalog.add(&name, SourceType::Vocals, sine(2, 2_000, 16_000, 200.0, 0.3), 16_000);
        catalog.add(&name, SourceType::Mixture, sine(2, 2_000, 16_000, 300.0, 0.3), 16_000);
    }
    catalog
}

fn handles(n: usize) -> Vec<TrackHandle> {
    (0..n)
        .map(|index| TrackHandle {
            index,
            name: format!("t{index}"),
            location: format!("t{index}").into(),
        })
        .collect()
}

#[test]
fn ten_tracks_on_four_workers_yield_ten_records() {
    let tmp = tempdir().unwrap();
    let catalog = catalog_with(10);
    let opts = PackOptions {
        sample_rate: 8_000,
        resample: ResampleAlgorithm::SincFast,
        sources: vec![SourceType::Vocals],
        output_dir: tmp.path().join("out"),
        workers: Some(4),
        ..PackOptions::default()
    };

    let report = pack_dataset(&catalog, &opts).unwrap();
    assert!(report.is_success());
    assert_eq!(report.total, 10);
    assert_eq!(report.packed.len(), 10);

    let files = files_in(&opts.output_dir);
    assert_eq!(files.len(), 10);
    for i in 0..10 {
        let path = opts.output_dir.join(format!("track {i:02}.stpk"));
        let record = PackedRecord::open(&path).unwrap();
        assert_eq!(record.sample_rate(), 8_000);
        assert_eq!(record.array("mixture").unwrap().dim(), (2, 1_000));
        assert_eq!(record.array("vocals").unwrap().dim(), (2, 1_000));
    }
}

#[test]
fn continue_policy_collects_every_failure() {
    let tmp = tempdir().unwrap();
    let mut catalog = catalog_with(5);
    // A track with no mixture cannot be packed.
    catalog.add("broken", SourceType::Vocals, Array2::zeros((2, 10)), 16_000);
    let opts = PackOptions {
        sample_rate: 16_000,
        sources: vec![SourceType::Vocals],
        output_dir: tmp.path().to_path_buf(),
        workers: Some(3),
        failure_policy: FailurePolicy::Continue,
        ..PackOptions::default()
    };

    let report = pack_dataset(&catalog, &opts).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.total, 6);
    assert_eq!(report.packed.len(), 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "broken");
    assert!(report.failures[0].reason.contains("mixture"));
    assert_eq!(files_in(tmp.path()).len(), 5);
}

#[test]
fn abort_policy_stops_scheduling_and_returns_first_failure() {
    let tracks = handles(8);
    let calls = AtomicUsize::new(0);

    let result = run(&tracks, 1, FailurePolicy::Abort, |track| {
        calls.fetch_add(1, Ordering::SeqCst);
        if track.index == 0 {
            return Err(PackError::InvalidInput("boom".into()));
        }
        Ok(PackedTrack {
            index: track.index,
            name: track.name.clone(),
            path: track.location.clone(),
            mixture_shape: (2, 1),
        })
    });

    match result {
        Err(PackError::TrackFailed { track, reason }) => {
            assert_eq!(track, "t0");
            assert!(reason.contains("boom"));
        }
        other => panic!("expected TrackFailed, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn tracks_start_in_list_order() {
    let tracks = handles(12);
    let started = Mutex::new(Vec::new());

    let report = run(&tracks, 1, FailurePolicy::Continue, |track| {
        started.lock().unwrap().push(track.index);
        Ok(PackedTrack {
            index: track.index,
            name: track.name.clone(),
            path: track.location.clone(),
            mixture_shape: (1, 0),
        })
    })
    .unwrap();

    assert_eq!(started.into_inner().unwrap(), (0..12).collect::<Vec<_>>());
    let packed: Vec<usize> = report.packed.iter().map(|p| p.index).collect();
    assert_eq!(packed, (0..12).collect::<Vec<_>>());
}

#[test]
fn every_item_runs_exactly_once() {
    let tracks = handles(37);
    let seen: Vec<AtomicUsize> = (0..37).map(|_| AtomicUsize::new(0)).collect();

    let report = run(&tracks, 4, FailurePolicy::Continue, |track| {
        seen[track.index].fetch_add(1, Ordering::SeqCst);
        Ok(PackedTrack {
            index: track.index,
            name: track.name.clone(),
            path: track.location.clone(),
            mixture_shape: (1, 0),
        })
    })
    .unwrap();

    assert_eq!(report.packed.len(), 37);
    assert!(seen.iter().all(|c| c.load(Ordering::SeqCst) == 1));
}

#[test]
fn empty_track_list_is_a_successful_no_op() {
    let report = run(&[], 2, FailurePolicy::Abort, |_| unreachable!()).unwrap();
    assert_eq!(report.total, 0);
    assert!(report.is_success());
}
