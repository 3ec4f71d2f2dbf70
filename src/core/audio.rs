use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use hound::WavWriter;
use ndarray::{Array2, ArrayView2};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::{
    error::{PackError, Result},
    io::container::PackedRecord,
    types::Waveform,
};

/// Decodes an audio file into a planar `(channels, samples)` waveform and
/// its native sample rate.
pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<(Waveform, u32)> {
    let path: &Path = path.as_ref();
    let decode_err = |reason: String| PackError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| decode_err("no default track".into()))?;

    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: usize = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();

    while let Ok(packet) = format.next_packet() {
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| decode_err(e.to_string()))?;
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count();

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        interleaved.extend_from_slice(buffer.samples());
    }

    if channels == 0 || sample_rate == 0 {
        return Err(decode_err("stream has no channels or sample rate".into()));
    }

    let frames = interleaved.len() / channels;
    let wave = Array2::from_shape_fn((channels, frames), |(c, i)| interleaved[i * channels + c]);

    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        frames,
        "read audio"
    );

    Ok((wave, sample_rate))
}

/// Writes a planar float waveform as a 16-bit PCM WAV file.
pub fn write_audio<P: AsRef<Path>>(path: P, wave: &Waveform, sample_rate: u32) -> Result<()> {
    let pcm = wave.mapv(crate::core::dsp::quantize_sample);
    write_pcm16(path, pcm.view(), sample_rate)
}

/// Writes already-quantized planar samples as a 16-bit PCM WAV file.
pub fn write_pcm16<P: AsRef<Path>>(
    path: P,
    pcm: ArrayView2<'_, i16>,
    sample_rate: u32,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: pcm.nrows() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for frame in pcm.columns() {
        for &s in frame {
            writer.write_sample(s)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Writes every array of `record` to `<dir>/<array name>.wav`.
pub fn unpack_record(record: &PackedRecord, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| PackError::io(dir, e))?;
    let mut written = Vec::new();
    for name in record.names() {
        let pcm = record
            .array(name)
            .ok_or_else(|| PackError::container(record.path(), format!("`{name}` unreadable")))?;
        let path = dir.join(format!("{name}.wav"));
        write_pcm16(&path, pcm.view(), record.sample_rate())?;
        written.push(path);
    }
    Ok(written)
}
