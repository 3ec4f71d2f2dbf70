use std::{fmt, path::PathBuf, str::FromStr};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::PackError;

/// Planar audio, shaped `(channels, samples)`.
pub type Waveform = Array2<f32>;

/// Labels of the audio sources a track can provide.
///
/// Declaration order is the packing order; `Mixture` always goes last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Vocals,
    Drums,
    Bass,
    Other,
    Accompaniment,
    Mixture,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::Vocals,
        SourceType::Drums,
        SourceType::Bass,
        SourceType::Other,
        SourceType::Accompaniment,
        SourceType::Mixture,
    ];

    pub const STEMS: [SourceType; 5] = [
        SourceType::Vocals,
        SourceType::Drums,
        SourceType::Bass,
        SourceType::Other,
        SourceType::Accompaniment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Vocals => "vocals",
            SourceType::Drums => "drums",
            SourceType::Bass => "bass",
            SourceType::Other => "other",
            SourceType::Accompaniment => "accompaniment",
            SourceType::Mixture => "mixture",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PackError::Config(format!("unknown source type `{s}`")))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Mono,
    #[default]
    Stereo,
}

impl ChannelMode {
    pub fn is_mono(self) -> bool {
        self == ChannelMode::Mono
    }
}

impl FromStr for ChannelMode {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mono" => Ok(ChannelMode::Mono),
            "stereo" => Ok(ChannelMode::Stereo),
            other => Err(PackError::Config(format!("unknown channel mode `{other}`"))),
        }
    }
}

/// Named resampling strategies. All are windowed-sinc; they trade kernel
/// length for speed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleAlgorithm {
    #[default]
    SincBest,
    SincMedium,
    SincFast,
}

impl ResampleAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            ResampleAlgorithm::SincBest => "sinc_best",
            ResampleAlgorithm::SincMedium => "sinc_medium",
            ResampleAlgorithm::SincFast => "sinc_fast",
        }
    }
}

impl fmt::Display for ResampleAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleAlgorithm {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sinc_best" | "best" => Ok(ResampleAlgorithm::SincBest),
            "sinc_medium" | "medium" => Ok(ResampleAlgorithm::SincMedium),
            "sinc_fast" | "fast" => Ok(ResampleAlgorithm::SincFast),
            other => Err(PackError::Config(format!(
                "unknown resample algorithm `{other}`"
            ))),
        }
    }
}

/// What the dispatcher does after a track fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep packing the remaining tracks and report every failure at the end.
    #[default]
    Continue,
    /// Start no new tracks once one has failed.
    Abort,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    pub subset: String,
    pub split: String,
    pub sample_rate: u32,
    pub channels: ChannelMode,
    pub resample: ResampleAlgorithm,
    pub sources: Vec<SourceType>,
    pub optional_sources: Vec<SourceType>,
    pub output_dir: PathBuf,
    pub workers: Option<usize>,
    pub failure_policy: FailurePolicy,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            subset: "train".into(),
            split: "all".into(),
            sample_rate: 44_100,
            channels: ChannelMode::Stereo,
            resample: ResampleAlgorithm::SincBest,
            sources: SourceType::STEMS.to_vec(),
            optional_sources: vec![SourceType::Accompaniment],
            output_dir: "./packed".into(),
            workers: None,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl PackOptions {
    pub fn from_json_file(path: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| PackError::io(&path, e))?;
        let opts: PackOptions = serde_json::from_str(&text)
            .map_err(|e| PackError::Config(format!("{}: {e}", path.display())))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.sample_rate == 0 {
            return Err(PackError::Config("sample_rate must be positive".into()));
        }
        if self.workers == Some(0) {
            return Err(PackError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Requested stems in packing order, deduplicated, followed by the mixture.
    pub fn packing_order(&self) -> Vec<SourceType> {
        SourceType::STEMS
            .into_iter()
            .filter(|s| self.sources.contains(s))
            .chain(std::iter::once(SourceType::Mixture))
            .collect()
    }

    pub fn is_optional(&self, source: SourceType) -> bool {
        source != SourceType::Mixture && self.optional_sources.contains(&source)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// One track as enumerated by a catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackHandle {
    pub index: usize,
    pub name: String,
    pub location: PathBuf,
}

impl TrackHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of one successfully packed track.
#[derive(Clone, Debug)]
pub struct PackedTrack {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub mixture_shape: (usize, usize),
}

#[derive(Clone, Debug)]
pub struct TrackFailure {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub total: usize,
    pub packed: Vec<PackedTrack>,
    pub failures: Vec<TrackFailure>,
    pub elapsed: std::time::Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.packed.len() == self.total
    }
}
