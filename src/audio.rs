//! Impact audio
//!
//! The simulation only ever asks for an impact cue at some intensity. The
//! mixer turns that into a gain and queues it; the host drains the queue
//! and does the actual playback. No sample loaded means no sound, never an
//! error.

use crate::settings::AudioSettings;

/// Audio collaborator contract (fire-and-forget)
pub trait AudioSink {
    /// `intensity` is normalized to [0, 1]
    fn play_impact(&mut self, intensity: f32);
}

/// Handle to a decoded impact sample owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleId(pub u32);

/// A queued playback request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactCue {
    pub sample: SampleId,
    pub gain: f32,
}

/// Impact cue mixer
#[derive(Debug)]
pub struct ImpactMixer {
    sample: Option<SampleId>,
    master_volume: f32,
    sfx_volume: f32,
    muted: bool,
    pending: Vec<ImpactCue>,
}

impl Default for ImpactMixer {
    fn default() -> Self {
        Self::new(&AudioSettings::default())
    }
}

impl ImpactMixer {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            sample: None,
            master_volume: settings.master_volume.clamp(0.0, 1.0),
            sfx_volume: settings.sfx_volume.clamp(0.0, 1.0),
            muted: settings.muted,
            pending: Vec::new(),
        }
    }

    /// Called by the host once the impact sample finished loading
    pub fn set_sample(&mut self, sample: SampleId) {
        log::info!("Impact sample {:?} ready", sample);
        self.sample = Some(sample);
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    /// Set master volume (0.0 - 1.0)
    pub fn set_master_volume(&mut self, vol: f32) {
        self.master_volume = vol.clamp(0.0, 1.0);
    }

    /// Set SFX volume (0.0 - 1.0)
    pub fn set_sfx_volume(&mut self, vol: f32) {
        self.sfx_volume = vol.clamp(0.0, 1.0);
    }

    /// Mute/unmute all audio
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Get effective volume
    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.master_volume * self.sfx_volume
        }
    }

    /// Take all cues queued since the last drain
    pub fn drain(&mut self) -> Vec<ImpactCue> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[ImpactCue] {
        &self.pending
    }
}

impl AudioSink for ImpactMixer {
    fn play_impact(&mut self, intensity: f32) {
        let Some(sample) = self.sample else {
            log::debug!("Impact cue dropped: sample not loaded");
            return;
        };
        let intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let gain = intensity * self.effective_volume();
        if gain <= 0.0 {
            return;
        }
        self.pending.push(ImpactCue { sample, gain });
    }
}

/// Normalized cue intensity for a launch at `power`
#[inline]
pub fn launch_intensity(power: f32, full_intensity_power: f32) -> f32 {
    if full_intensity_power <= 0.0 {
        return 1.0;
    }
    (power / full_intensity_power).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sample_is_noop() {
        let mut mixer = ImpactMixer::default();
        mixer.play_impact(1.0);
        assert!(mixer.pending().is_empty());
    }

    #[test]
    fn test_gain_scaled_by_volume() {
        let mut mixer = ImpactMixer::default();
        mixer.set_sample(SampleId(7));
        mixer.set_master_volume(0.5);
        mixer.set_sfx_volume(0.5);
        mixer.play_impact(0.8);
        let cues = mixer.drain();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].sample, SampleId(7));
        assert!((cues[0].gain - 0.2).abs() < 1e-6);
        assert!(mixer.pending().is_empty());
    }

    #[test]
    fn test_muted_and_silent_cues_dropped() {
        let mut mixer = ImpactMixer::default();
        mixer.set_sample(SampleId(1));
        mixer.play_impact(0.0);
        mixer.play_impact(f32::NAN);
        mixer.set_muted(true);
        mixer.play_impact(1.0);
        assert!(mixer.pending().is_empty());
    }

    #[test]
    fn test_launch_intensity() {
        assert_eq!(launch_intensity(4.0, 8.0), 0.5);
        assert_eq!(launch_intensity(50.0, 8.0), 1.0);
        assert_eq!(launch_intensity(20.0, 0.0), 1.0);
    }
}
