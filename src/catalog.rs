//! Dataset catalogs: enumerate tracks and hand out their stem audio.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    core::audio::read_audio,
    error::{PackError, Result},
    types::{SourceType, TrackHandle, Waveform},
};

/// File extensions probed for each source, in preference order.
const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "flac"];

/// Split name that selects every track of a subset.
pub const ALL_SPLIT: &str = "all";

/// Read-only access to a multi-track dataset partition.
pub trait Catalog: Sync {
    /// Tracks of the partition in a stable order.
    fn list_tracks(&self) -> Result<Vec<TrackHandle>>;

    /// Waveform and native sample rate of one source of `track`.
    ///
    /// Fails with [`PackError::StemNotFound`] when the dataset has no such
    /// source for the track.
    fn track_audio(&self, track: &TrackHandle, source: SourceType) -> Result<(Waveform, u32)>;
}

/// MUSDB18-HQ style layout: `<root>/<subset>/<track>/<source>.wav`.
#[derive(Clone, Debug)]
pub struct DirectoryCatalog {
    subset_dir: PathBuf,
    split: String,
}

impl DirectoryCatalog {
    pub fn open(root: impl AsRef<Path>, subset: &str, split: &str) -> Result<Self> {
        let subset_dir = root.as_ref().join(subset);
        if !subset_dir.is_dir() {
            return Err(PackError::InvalidInput(format!(
                "subset directory does not exist: {}",
                subset_dir.display()
            )));
        }
        Ok(Self {
            subset_dir,
            split: split.to_string(),
        })
    }

    fn split_members(&self) -> Result<Option<Vec<String>>> {
        if self.split.is_empty() || self.split == ALL_SPLIT {
            return Ok(None);
        }
        let list = self.subset_dir.join(format!("{}.txt", self.split));
        if !list.is_file() {
            return Err(PackError::InvalidInput(format!(
                "split `{}` has no track list at {}",
                self.split,
                list.display()
            )));
        }
        let text = fs::read_to_string(&list).map_err(|e| PackError::io(&list, e))?;
        Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
        ))
    }

    fn source_file(track: &TrackHandle, source: SourceType) -> Option<PathBuf> {
        AUDIO_EXTENSIONS
            .iter()
            .map(|ext| track.location.join(format!("{}.{ext}", source.as_str())))
            .find(|p| p.is_file())
    }

    /// Accompaniment is the sum of every non-vocal stem.
    fn derive_accompaniment(&self, track: &TrackHandle) -> Result<(Waveform, u32)> {
        let parts = [SourceType::Drums, SourceType::Bass, SourceType::Other];
        let mut sum: Option<(Waveform, u32)> = None;
        for part in parts {
            let path = Self::source_file(track, part).ok_or_else(|| PackError::StemNotFound {
                track: track.name.clone(),
                stem: SourceType::Accompaniment,
            })?;
            let (wave, rate) = read_audio(path)?;
            sum = Some(match sum {
                None => (wave, rate),
                Some((acc, acc_rate)) => {
                    if acc.dim() != wave.dim() || acc_rate != rate {
                        return Err(PackError::InvalidInput(format!(
                            "track `{}`: `{part}` does not match the other stems' layout",
                            track.name
                        )));
                    }
                    (acc + &wave, acc_rate)
                }
            });
        }
        debug!(track = %track.name, "derived accompaniment from drums, bass and other");
        sum.ok_or_else(|| PackError::StemNotFound {
            track: track.name.clone(),
            stem: SourceType::Accompaniment,
        })
    }
}

impl Catalog for DirectoryCatalog {
    fn list_tracks(&self) -> Result<Vec<TrackHandle>> {
        let entries =
            fs::read_dir(&self.subset_dir).map_err(|e| PackError::io(&self.subset_dir, e))?;

        let mut dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PackError::io(&self.subset_dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                dirs.push((name.to_string(), path.clone()));
            }
        }
        dirs.sort();

        if let Some(members) = self.split_members()? {
            if let Some(missing) = members.iter().find(|m| !dirs.iter().any(|(n, _)| n == *m)) {
                return Err(PackError::TrackNotFound(missing.clone()));
            }
            dirs.retain(|(n, _)| members.contains(n));
        }

        Ok(dirs
            .into_iter()
            .enumerate()
            .map(|(index, (name, location))| TrackHandle {
                index,
                name,
                location,
            })
            .collect())
    }

    fn track_audio(&self, track: &TrackHandle, source: SourceType) -> Result<(Waveform, u32)> {
        if !track.location.is_dir() {
            return Err(PackError::TrackNotFound(track.name.clone()));
        }
        match Self::source_file(track, source) {
            Some(path) => read_audio(path),
            None if source == SourceType::Accompaniment => self.derive_accompaniment(track),
            None => Err(PackError::StemNotFound {
                track: track.name.clone(),
                stem: source,
            }),
        }
    }
}
