//! # stem-packer-core
//!
//! Packs a multi-track source separation dataset (mixture plus stems) into
//! one binary record per track: every source resampled to a common rate,
//! reduced to mono or stereo and quantized to 16-bit PCM.

pub mod catalog;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

pub use crate::{
    catalog::{Catalog, DirectoryCatalog},
    core::{
        audio::{read_audio, unpack_record, write_audio},
        dispatch::{pack_dataset, run},
        dsp::{quantize, resample, resampled_len, transform},
        packer::{pack_track, record_path},
    },
    error::{PackError, Result},
    io::{
        container::{PackedRecord, RecordBuilder, RecordHeader},
        progress::{set_pack_progress_callback, PackProgress},
    },
    types::{
        ChannelMode, FailurePolicy, PackOptions, PackedTrack, ResampleAlgorithm, RunReport,
        SourceType, TrackFailure, TrackHandle, Waveform,
    },
};
