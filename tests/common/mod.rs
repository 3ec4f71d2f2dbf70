#![allow(dead_code)]

use std::{collections::HashMap, f32::consts::PI, fs, path::Path};

use ndarray::Array2;
use stem_packer_core::{
    write_audio, Catalog, PackError, Result, SourceType, TrackHandle, Waveform,
};

pub fn sine(channels: usize, frames: usize, sample_rate: u32, freq: f32, amp: f32) -> Waveform {
    Array2::from_shape_fn((channels, frames), |(c, i)| {
        let t = i as f32 / sample_rate as f32;
        amp * (2.0 * PI * freq * (c + 1) as f32 * t).sin()
    })
}

/// Catalog backed by waveforms held in memory.
#[derive(Default)]
pub struct MemoryCatalog {
    tracks: Vec<String>,
    audio: HashMap<(String, SourceType), (Waveform, u32)>,
}

impl MemoryCatalog {
    pub fn add(&mut self, track: &str, source: SourceType, wave: Waveform, rate: u32) {
        if !self.tracks.iter().any(|t| t == track) {
            self.tracks.push(track.to_string());
        }
        self.audio.insert((track.to_string(), source), (wave, rate));
    }

    pub fn handle(&self, name: &str) -> TrackHandle {
        let index = self.tracks.iter().position(|t| t == name).expect("unknown track");
        TrackHandle {
            index,
            name: name.to_string(),
            location: name.into(),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn list_tracks(&self) -> Result<Vec<TrackHandle>> {
        Ok(self.tracks.iter().map(|t| self.handle(t)).collect())
    }

    fn track_audio(&self, track: &TrackHandle, source: SourceType) -> Result<(Waveform, u32)> {
        self.audio
            .get(&(track.name.clone(), source))
            .cloned()
            .ok_or_else(|| PackError::StemNotFound {
                track: track.name.clone(),
                stem: source,
            })
    }
}

/// Writes `<subset_dir>/<track>/<source>.wav` for every given source.
pub fn write_track_dir(subset_dir: &Path, track: &str, sources: &[(SourceType, &Waveform)], rate: u32) {
    let dir = subset_dir.join(track);
    fs::create_dir_all(&dir).unwrap();
    for (source, wave) in sources {
        write_audio(dir.join(format!("{}.wav", source.as_str())), wave, rate).unwrap();
    }
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
