//! # Equalizer Configuration Store
//!
//! Enable flag, active preset and per-band gains over a fixed ten band
//! layout. Pure data: the controller pushes [`EqualizerConfig::curve`] to the
//! audio session whenever the configuration changes.

use crate::error::{PlaybackError, Result};
use bridge_traits::{BandGain, EqualizerCurve};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of equalizer bands.
pub const BAND_COUNT: usize = 10;

/// Center frequency of each band, lowest first.
pub const BAND_FREQUENCIES_HZ: [u32; BAND_COUNT] =
    [32, 64, 125, 250, 500, 1_000, 2_000, 4_000, 8_000, 16_000];

pub const MIN_GAIN_DB: i8 = -12;
pub const MAX_GAIN_DB: i8 = 12;

/// Gain table in whole decibels, indexed like [`BAND_FREQUENCIES_HZ`].
pub type BandTable = [i8; BAND_COUNT];

/// Named presets plus the user-editable `Custom` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqPreset {
    #[default]
    Flat,
    BassBoost,
    TrebleBoost,
    Vocal,
    Rock,
    Pop,
    Jazz,
    Classical,
    Electronic,
    Custom,
}

impl EqPreset {
    pub const NAMED: [EqPreset; 9] = [
        EqPreset::Flat,
        EqPreset::BassBoost,
        EqPreset::TrebleBoost,
        EqPreset::Vocal,
        EqPreset::Rock,
        EqPreset::Pop,
        EqPreset::Jazz,
        EqPreset::Classical,
        EqPreset::Electronic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::BassBoost => "bass_boost",
            EqPreset::TrebleBoost => "treble_boost",
            EqPreset::Vocal => "vocal",
            EqPreset::Rock => "rock",
            EqPreset::Pop => "pop",
            EqPreset::Jazz => "jazz",
            EqPreset::Classical => "classical",
            EqPreset::Electronic => "electronic",
            EqPreset::Custom => "custom",
        }
    }

    /// Fixed gain table of a named preset. `None` for `Custom`.
    pub fn table(&self) -> Option<BandTable> {
        let table = match self {
            EqPreset::Flat => [0; BAND_COUNT],
            EqPreset::BassBoost => [6, 5, 4, 2, 0, 0, 0, 0, 0, 0],
            EqPreset::TrebleBoost => [0, 0, 0, 0, 0, 1, 2, 4, 5, 6],
            EqPreset::Vocal => [-2, -1, 0, 2, 4, 4, 3, 1, 0, -1],
            EqPreset::Rock => [5, 4, 2, 0, -1, -1, 1, 3, 4, 5],
            EqPreset::Pop => [-1, 1, 3, 4, 3, 1, -1, -1, 0, 1],
            EqPreset::Jazz => [3, 2, 1, 2, -1, -1, 0, 1, 2, 3],
            EqPreset::Classical => [4, 3, 2, 1, 0, 0, 0, 1, 3, 4],
            EqPreset::Electronic => [5, 4, 1, 0, -2, 2, 1, 2, 4, 5],
            EqPreset::Custom => return None,
        };
        Some(table)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, EqPreset::Custom)
    }
}

impl fmt::Display for EqPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EqPreset {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        EqPreset::NAMED
            .iter()
            .chain(std::iter::once(&EqPreset::Custom))
            .find(|preset| preset.as_str() == s)
            .copied()
            .ok_or_else(|| PlaybackError::InvalidArgument(format!("unknown preset: {}", s)))
    }
}

/// Round to a whole decibel and clamp to the supported range.
pub fn clamp_gain(db: f32) -> i8 {
    db.round().clamp(MIN_GAIN_DB as f32, MAX_GAIN_DB as f32) as i8
}

/// Equalizer state: exactly one preset is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizerConfig {
    pub enabled: bool,
    pub preset: EqPreset,
    /// Gains used while `preset` is `Custom`.
    pub custom_bands: BandTable,
}

impl EqualizerConfig {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Activate a preset. Switching from a named preset to `Custom` copies the
    /// named table so the audible curve does not jump.
    pub fn set_preset(&mut self, preset: EqPreset) {
        if preset.is_custom() {
            if let Some(table) = self.preset.table() {
                self.custom_bands = table;
            }
        }
        self.preset = preset;
    }

    /// Set one band's gain; the active preset becomes `Custom`.
    pub fn set_band_value(&mut self, band: usize, db: f32) -> Result<()> {
        if band >= BAND_COUNT {
            return Err(PlaybackError::InvalidArgument(format!(
                "band {} out of range 0..{}",
                band, BAND_COUNT
            )));
        }
        if db.is_nan() {
            return Err(PlaybackError::InvalidArgument(
                "gain must be a number".to_string(),
            ));
        }

        self.set_preset(EqPreset::Custom);
        self.custom_bands[band] = clamp_gain(db);
        Ok(())
    }

    /// Zero the custom table. Leaves `enabled` and `preset` alone.
    pub fn reset_custom_bands(&mut self) {
        self.custom_bands = [0; BAND_COUNT];
    }

    /// The effective gain table.
    pub fn band_values(&self) -> BandTable {
        self.preset.table().unwrap_or(self.custom_bands)
    }

    /// Curve handed to the audio session.
    pub fn curve(&self) -> EqualizerCurve {
        EqualizerCurve {
            enabled: self.enabled,
            bands: BAND_FREQUENCIES_HZ
                .iter()
                .zip(self.band_values())
                .map(|(&frequency_hz, gain)| BandGain {
                    frequency_hz,
                    gain_db: gain as f32,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_preset_reports_its_table() {
        let mut eq = EqualizerConfig::default();
        for preset in EqPreset::NAMED {
            eq.set_preset(preset);
            assert_eq!(eq.band_values(), preset.table().unwrap());
        }
    }

    #[test]
    fn test_band_edit_after_named_preset_switches_to_custom() {
        let mut eq = EqualizerConfig::default();
        eq.set_preset(EqPreset::Rock);
        eq.set_band_value(4, 3.0).unwrap();

        let mut expected = EqPreset::Rock.table().unwrap();
        expected[4] = 3;
        assert_eq!(eq.preset, EqPreset::Custom);
        assert_eq!(eq.band_values(), expected);

        eq.set_band_value(0, -2.0).unwrap();
        assert_eq!(eq.preset, EqPreset::Custom);
    }

    #[test]
    fn test_gain_is_clamped_and_rounded() {
        let mut eq = EqualizerConfig::default();
        eq.set_band_value(0, 40.0).unwrap();
        eq.set_band_value(1, -13.5).unwrap();
        eq.set_band_value(2, 2.6).unwrap();
        assert_eq!(&eq.band_values()[..3], &[12, -12, 3]);
    }

    #[test]
    fn test_invalid_band_is_rejected() {
        let mut eq = EqualizerConfig::default();
        assert!(eq.set_band_value(BAND_COUNT, 1.0).is_err());
        assert!(eq.set_band_value(0, f32::NAN).is_err());
        assert_eq!(eq.preset, EqPreset::Flat);
    }

    #[test]
    fn test_selecting_custom_keeps_current_gains() {
        let mut eq = EqualizerConfig::default();
        eq.set_preset(EqPreset::BassBoost);
        eq.set_preset(EqPreset::Custom);
        assert_eq!(eq.band_values(), EqPreset::BassBoost.table().unwrap());
    }

    #[test]
    fn test_reset_custom_bands_keeps_preset_and_flag() {
        let mut eq = EqualizerConfig::default();
        eq.set_enabled(true);
        eq.set_band_value(3, 5.0).unwrap();
        eq.reset_custom_bands();
        assert!(eq.enabled);
        assert_eq!(eq.preset, EqPreset::Custom);
        assert_eq!(eq.band_values(), [0; BAND_COUNT]);

        eq.set_preset(EqPreset::Jazz);
        eq.set_band_value(0, 1.0).unwrap();
        eq.set_preset(EqPreset::Pop);
        eq.reset_custom_bands();
        assert_eq!(eq.band_values(), EqPreset::Pop.table().unwrap());
    }

    #[test]
    fn test_preset_names_round_trip() {
        for preset in EqPreset::NAMED {
            assert_eq!(preset.as_str().parse::<EqPreset>().unwrap(), preset);
        }
        assert!("loudness".parse::<EqPreset>().is_err());
    }

    #[test]
    fn test_curve_carries_frequencies() {
        let mut eq = EqualizerConfig::default();
        eq.set_enabled(true);
        eq.set_preset(EqPreset::TrebleBoost);
        let curve = eq.curve();
        assert!(curve.enabled);
        assert_eq!(curve.bands.len(), BAND_COUNT);
        assert_eq!(curve.bands[9].frequency_hz, 16_000);
        assert_eq!(curve.bands[9].gain_db, 6.0);
    }
}
