use std::fs;

use ndarray::{array, Array2};
use stem_packer_core::{PackError, PackedRecord, RecordBuilder};
use tempfile::tempdir;

mod common;
use common::files_in;

fn sample_record() -> RecordBuilder {
    let mut b = RecordBuilder::new("Artist - Title", 22_050);
    b.push("vocals", Array2::from_shape_fn((2, 1000), |(c, i)| (i as i16) - (c as i16) * 500));
    b.push("mixture", array![[i16::MAX, -32767, 0, 1, -1]]);
    b
}

#[test]
fn written_record_reads_back() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("track.stpk");
    let builder = sample_record();
    builder.write_atomic(&path).unwrap();

    let record = PackedRecord::open(&path).unwrap();
    assert_eq!(record.audio_name(), "Artist - Title");
    assert_eq!(record.sample_rate(), 22_050);
    assert_eq!(record.names().collect::<Vec<_>>(), vec!["vocals", "mixture"]);

    let vocals = record.array("vocals").unwrap();
    assert_eq!(vocals.dim(), (2, 1000));
    assert_eq!(vocals[(0, 999)], 999);
    assert_eq!(vocals[(1, 0)], -500);

    let mixture = record.array("mixture").unwrap();
    assert_eq!(mixture.row(0).to_vec(), vec![32767, -32767, 0, 1, -1]);
    assert!(record.array("drums").is_none());

    // Only the final file remains; the temporary file was renamed.
    assert_eq!(files_in(tmp.path()), vec!["track.stpk".to_string()]);
}

#[test]
fn arrays_are_aligned_for_memory_mapping() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("track.stpk");
    sample_record().write_atomic(&path).unwrap();

    let record = PackedRecord::open(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    for entry in &record.header().arrays {
        assert_eq!(entry.offset % 64, 0);
        assert_eq!(entry.dtype, "int16");
        let start = entry.offset as usize;
        let first = i16::from_le_bytes([bytes[start], bytes[start + 1]]);
        let expected = record.array(&entry.name).unwrap()[(0, 0)];
        assert_eq!(first, expected);
    }
}

#[test]
fn rewriting_replaces_previous_record() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("track.stpk");
    sample_record().write_atomic(&path).unwrap();

    let mut b = RecordBuilder::new("Artist - Title", 16_000);
    b.push("mixture", Array2::zeros((1, 3)));
    b.write_atomic(&path).unwrap();

    let record = PackedRecord::open(&path).unwrap();
    assert_eq!(record.sample_rate(), 16_000);
    assert_eq!(record.names().collect::<Vec<_>>(), vec!["mixture"]);
}

#[test]
fn rejects_foreign_and_truncated_files() {
    let tmp = tempdir().unwrap();

    let foreign = tmp.path().join("foreign.stpk");
    fs::write(&foreign, b"RIFF....WAVEfmt ").unwrap();
    assert!(matches!(
        PackedRecord::open(&foreign),
        Err(PackError::Container { .. })
    ));

    let path = tmp.path().join("track.stpk");
    sample_record().write_atomic(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    let truncated = tmp.path().join("truncated.stpk");
    fs::write(&truncated, &bytes[..bytes.len() - 10]).unwrap();
    match PackedRecord::open(&truncated) {
        Err(PackError::Container { reason, .. }) => assert!(reason.contains("truncated")),
        other => panic!("expected container error, got {other:?}"),
    }
}

#[test]
fn long_names_are_truncated_in_header() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("long.stpk");
    let name = "x".repeat(250);
    let mut b = RecordBuilder::new(&name, 44_100);
    b.push("mixture", Array2::zeros((2, 4)));
    b.write_atomic(&path).unwrap();

    let record = PackedRecord::open(&path).unwrap();
    assert_eq!(record.audio_name(), "x".repeat(100));
}

#[test]
fn oversized_shape_in_header_is_rejected() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("hostile.stpk");
    let header = format!(
        r#"{{"audio_name":"x","sample_rate":44100,"arrays":[{{"name":"mixture","dtype":"int16","shape":[{},2],"offset":64,"length":4}}]}}"#,
        u64::MAX
    );
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"STPK");
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.resize(256, 0);
    fs::write(&path, &bytes).unwrap();

    match PackedRecord::open(&path) {
        Err(PackError::Container { reason, .. }) => assert!(reason.contains("mis-sized")),
        other => panic!("expected container error, got {other:?}"),
    }
}
