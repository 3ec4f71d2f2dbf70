use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    core::dsp::{quantize, transform},
    error::{PackError, Result},
    io::container::{RecordBuilder, RECORD_EXTENSION},
    types::{PackOptions, PackedTrack, SourceType, TrackHandle},
};

/// Path of the record for `track_name` inside `output_dir`.
pub fn record_path(output_dir: &Path, track_name: &str) -> Result<PathBuf> {
    let mut components = Path::new(track_name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if track_name.is_empty() || !single_normal || track_name.contains(&['/', '\\'][..]) {
        return Err(PackError::InvalidInput(format!(
            "track name `{track_name}` cannot be used as a file name"
        )));
    }
    Ok(output_dir.join(format!("{track_name}.{RECORD_EXTENSION}")))
}

/// Transforms the mixture and every requested stem of one track and writes
/// them into a single record.
///
/// The record only appears at its final path once completely written; a
/// failure leaves any earlier record for the track untouched.
pub fn pack_track<C: Catalog + ?Sized>(
    catalog: &C,
    track: &TrackHandle,
    opts: &PackOptions,
) -> Result<PackedTrack> {
    let path = record_path(&opts.output_dir, track.name())?;
    let mut record = RecordBuilder::new(track.name(), opts.sample_rate);
    let mut shape: Option<(usize, usize)> = None;

    for source in opts.packing_order() {
        let (wave, native_rate) = match catalog.track_audio(track, source) {
            Ok(audio) => audio,
            Err(e) if e.is_stem_not_found() && opts.is_optional(source) => {
                warn!(track = %track.name, %source, "optional stem missing, skipping");
                continue;
            }
            Err(e) if e.is_stem_not_found() => {
                return Err(PackError::MissingRequiredStem {
                    track: track.name.clone(),
                    stem: source,
                });
            }
            Err(e) => return Err(e),
        };

        let out = transform(
            &wave,
            opts.channels.is_mono(),
            native_rate,
            opts.sample_rate,
            opts.resample,
        )?;
        let pcm = quantize(&out);

        let dim = pcm.dim();
        match shape {
            None => shape = Some(dim),
            Some(expected) if expected != dim => {
                return Err(PackError::InconsistentShape {
                    track: track.name.clone(),
                    stem: source,
                    expected,
                    got: dim,
                });
            }
            Some(_) => {}
        }

        debug!(
            track = %track.name,
            %source,
            native_rate,
            channels = dim.0,
            samples = dim.1,
            "staged source"
        );
        record.push(source.as_str(), pcm);
    }

    // Mixture is required and last, so reaching here means it was staged.
    let mixture_shape = shape.ok_or_else(|| PackError::MissingRequiredStem {
        track: track.name.clone(),
        stem: SourceType::Mixture,
    })?;

    record.write_atomic(&path)?;

    info!(
        index = track.index,
        path = %path.display(),
        shape = ?mixture_shape,
        "packed track"
    );

    Ok(PackedTrack {
        index: track.index,
        name: track.name.clone(),
        path,
        mixture_shape,
    })
}
