use ndarray::{Array1, Array2, Axis};
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};

use crate::{
    error::{PackError, Result},
    types::{ResampleAlgorithm, Waveform},
};

/// Input frames fed to the resampler per call.
const CHUNK_FRAMES: usize = 4096;

/// Upper bound on the output frames one resampler call may produce.
const MAX_CHUNK_OUTPUT: usize = 1 << 16;

/// Full-scale value of the PCM16 convention used by records.
pub const PCM16_SCALE: f32 = 32767.0;

impl ResampleAlgorithm {
    fn sinc_parameters(self) -> InterpolationParameters {
        match self {
            ResampleAlgorithm::SincBest => InterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: InterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            ResampleAlgorithm::SincMedium => InterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.925,
                interpolation: InterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            ResampleAlgorithm::SincFast => InterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.9,
                interpolation: InterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::Blackman2,
            },
        }
    }
}

/// Length of a signal of `frames` samples after resampling `from` -> `to`:
/// `frames * to / from`, rounded half to even.
pub fn resampled_len(frames: usize, from: u32, to: u32) -> usize {
    let num = frames as u128 * to as u128;
    let den = from as u128;
    let (q, r) = (num / den, num % den);
    let q = match (2 * r).cmp(&den) {
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => q + (q & 1),
        std::cmp::Ordering::Less => q,
    };
    q as usize
}

/// Channel mean of a planar waveform.
pub fn downmix(wave: &Waveform) -> Result<Array1<f32>> {
    wave.mean_axis(Axis(0))
        .ok_or_else(|| PackError::InvalidInput("waveform has no channels".into()))
}

/// Resamples every channel of `wave` from `from` Hz to `to` Hz.
///
/// Output length always equals [`resampled_len`] of the input length, so
/// stems of equal length stay equal after resampling.
pub fn resample(wave: &Waveform, from: u32, to: u32, algorithm: ResampleAlgorithm) -> Result<Waveform> {
    if from == 0 || to == 0 {
        return Err(PackError::InvalidInput(format!(
            "sample rates must be positive (got {from} -> {to})"
        )));
    }
    let channels = wave.nrows();
    if channels == 0 {
        return Err(PackError::InvalidInput("waveform has no channels".into()));
    }
    if from == to {
        return Ok(wave.to_owned());
    }

    let frames = wave.ncols();
    let out_len = resampled_len(frames, from, to);
    if frames == 0 || out_len == 0 {
        return Ok(Array2::zeros((channels, out_len)));
    }

    let params = algorithm.sinc_parameters();
    let ratio = to as f64 / from as f64;
    let chunk_len = chunk_frames(ratio);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_len, channels)?;

    let max_block = (chunk_len as f64 * ratio).ceil() as usize + 1;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(out_len + max_block); channels];
    let mut chunk = vec![vec![0f32; chunk_len]; channels];
    let mut pos = 0usize;

    // The kernel is centred, so output frame i lines up with input i / ratio.
    // Past the end the input is zero-padded until `out_len` frames exist.
    while out[0].len() < out_len {
        for (row, buf) in wave.outer_iter().zip(chunk.iter_mut()) {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = row.get(pos + i).copied().unwrap_or(0.0);
            }
        }
        let block = resampler.process(&chunk, None)?;
        for (dst, src) in out.iter_mut().zip(block) {
            dst.extend_from_slice(&src);
        }
        pos += chunk_len;
    }

    Ok(Array2::from_shape_fn((channels, out_len), |(c, i)| out[c][i]))
}

/// Input chunk size for `ratio`, small enough that one call stays under
/// [`MAX_CHUNK_OUTPUT`] output frames.
fn chunk_frames(ratio: f64) -> usize {
    let bounded = (MAX_CHUNK_OUTPUT as f64 / ratio).floor() as usize;
    bounded.clamp(1, CHUNK_FRAMES)
}

/// Converts a waveform to the record's channel layout and sample rate.
///
/// With `to_mono` the channels are averaged into one; otherwise they are
/// kept as-is, which must be one or two. The result is always 2-D.
pub fn transform(
    wave: &Waveform,
    to_mono: bool,
    source_rate: u32,
    target_rate: u32,
    algorithm: ResampleAlgorithm,
) -> Result<Waveform> {
    if source_rate == 0 || target_rate == 0 {
        return Err(PackError::InvalidInput(format!(
            "sample rates must be positive (got {source_rate} -> {target_rate})"
        )));
    }
    if wave.nrows() == 0 {
        return Err(PackError::InvalidInput("waveform has no channels".into()));
    }

    if to_mono {
        let mono = downmix(wave)?.insert_axis(Axis(0));
        resample(&mono, source_rate, target_rate, algorithm)
    } else {
        if wave.nrows() > 2 {
            return Err(PackError::InvalidInput(format!(
                "{} channels cannot be stored without downmixing to mono",
                wave.nrows()
            )));
        }
        resample(wave, source_rate, target_rate, algorithm)
    }
}

pub fn quantize_sample(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

/// Clips to [-1, 1] and scales to PCM16, truncating toward zero.
pub fn quantize(wave: &Waveform) -> Array2<i16> {
    wave.mapv(quantize_sample)
}
