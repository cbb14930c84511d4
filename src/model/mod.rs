//! Light settings and per-light state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::protocol::Rgb;

pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 9909;
pub const DEFAULT_TAG: &str = "ui-controller";
pub const DEFAULT_NUM_LIGHTS: usize = 24;

pub const MIN_LIGHTS: usize = 1;
pub const MAX_LIGHTS: usize = 64;

pub const DEFAULT_RGB: Rgb = [255, 255, 255];
pub const DEFAULT_INTENSITY: u8 = 255;

/// Rejected settings updates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be an integer, got {value:?}")]
    NotAnInteger { field: &'static str, value: String },
    #[error("port must be between 0 and 65535, got {0}")]
    PortOutOfRange(i64),
    #[error("number of lights must be between 1 and 64, got {0}")]
    LightCountOutOfRange(i64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("no light with index {index} (have {count})")]
    NoSuchLight { index: usize, count: usize },
}

/// Where and how to send light packets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Effect server host name or address.
    pub server_ip: String,
    /// Effect server UDP port.
    pub server_port: u16,
    /// Tag sent in front of the light commands.
    pub tag: String,
    /// Number of lights to control.
    pub num_lights: usize,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            tag: DEFAULT_TAG.to_string(),
            num_lights: DEFAULT_NUM_LIGHTS,
        }
    }
}

/// Unvalidated settings, as typed in by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub server_ip: String,
    pub server_port: i64,
    pub tag: String,
    pub num_lights: i64,
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, ValidationError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::NotAnInteger {
            field,
            value: value.to_string(),
        })
}

impl SettingsUpdate {
    /// Parse raw text fields. Port and light count must be integers.
    pub fn parse(
        server_ip: &str,
        port: &str,
        tag: &str,
        num_lights: &str,
    ) -> Result<SettingsUpdate, ValidationError> {
        Ok(SettingsUpdate {
            num_lights: parse_int("number of lights", num_lights)?,
            server_port: parse_int("port", port)?,
            server_ip: server_ip.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Check ranges and fill in defaults for empty text fields.
    pub fn validate(&self) -> Result<Settings, ValidationError> {
        let lights_range = MIN_LIGHTS as i64..=MAX_LIGHTS as i64;
        if !lights_range.contains(&self.num_lights) {
            return Err(ValidationError::LightCountOutOfRange(self.num_lights));
        }
        if !(0..=i64::from(u16::MAX)).contains(&self.server_port) {
            return Err(ValidationError::PortOutOfRange(self.server_port));
        }

        let or_default = |value: &str, default: &str| {
            let value = value.trim();
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Ok(Settings {
            server_ip: or_default(&self.server_ip, DEFAULT_SERVER_IP),
            server_port: self.server_port as u16,
            tag: or_default(&self.tag, DEFAULT_TAG),
            num_lights: self.num_lights as usize,
        })
    }
}

/// A single light's color and intensity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LightRecord {
    pub index: usize,
    /// Color before intensity is applied.
    pub base_rgb: Rgb,
    pub intensity: u8,
}

impl LightRecord {
    pub fn new(index: usize) -> LightRecord {
        LightRecord {
            index,
            base_rgb: DEFAULT_RGB,
            intensity: DEFAULT_INTENSITY,
        }
    }

    /// Base color as `#rrggbb`.
    pub fn hex(&self) -> String {
        let [r, g, b] = self.base_rgb;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

/// Parse a `#rrggbb` color.
pub fn parse_hex_rgb(hex: &str) -> Option<Rgb> {
    let digits = hex.trim().strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Lights ordered by index, always `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LightSet {
    lights: Vec<LightRecord>,
}

impl LightSet {
    pub fn new(count: usize) -> LightSet {
        let mut set = LightSet::default();
        set.resize(count);
        set
    }

    /// Change the number of lights, clamped to 1..=64.
    ///
    /// Records below the new count keep their values, new indices start
    /// at the defaults and the rest are dropped.
    pub fn resize(&mut self, count: usize) {
        let count = count.max(MIN_LIGHTS).min(MAX_LIGHTS);
        if self.lights.len() == count {
            return;
        }

        let mut previous: HashMap<usize, LightRecord> =
            self.lights.drain(..).map(|l| (l.index, l)).collect();
        self.lights = (0..count)
            .map(|i| previous.remove(&i).unwrap_or_else(|| LightRecord::new(i)))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LightRecord> {
        self.lights.get(index)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut LightRecord, StateError> {
        let count = self.lights.len();
        self.lights
            .get_mut(index)
            .ok_or(StateError::NoSuchLight { index, count })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LightRecord> {
        self.lights.iter()
    }
}

/// Point-in-time copy of the whole state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub settings: Settings,
    pub lights: Vec<LightRecord>,
}

/// Settings plus the lights they describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightState {
    settings: Settings,
    lights: LightSet,
}

impl Default for LightState {
    fn default() -> LightState {
        LightState::new(Settings::default())
    }
}

impl LightState {
    pub fn new(settings: Settings) -> LightState {
        let lights = LightSet::new(settings.num_lights);
        LightState { settings, lights }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Apply new settings. Nothing changes if validation fails.
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Result<(), ValidationError> {
        let settings = update.validate()?;
        self.lights.resize(settings.num_lights);
        self.settings = settings;
        Ok(())
    }

    pub fn set_light_color(&mut self, index: usize, rgb: Rgb) -> Result<(), StateError> {
        self.lights.get_mut(index)?.base_rgb = rgb;
        Ok(())
    }

    pub fn set_light_intensity(&mut self, index: usize, intensity: u8) -> Result<(), StateError> {
        self.lights.get_mut(index)?.intensity = intensity;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            settings: self.settings.clone(),
            lights: self.lights.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(num_lights: i64) -> SettingsUpdate {
        SettingsUpdate {
            server_ip: "10.0.0.2".to_string(),
            server_port: 9909,
            tag: "t".to_string(),
            num_lights,
        }
    }

    #[test]
    fn test_defaults() {
        let state = LightState::default();
        assert_eq!(state.settings().server_ip, "127.0.0.1");
        assert_eq!(state.settings().server_port, 9909);
        assert_eq!(state.settings().tag, "ui-controller");
        assert_eq!(state.lights().len(), 24);
        let light = state.lights().get(7).unwrap();
        assert_eq!(light.index, 7);
        assert_eq!(light.base_rgb, [255, 255, 255]);
        assert_eq!(light.intensity, 255);
    }

    #[test]
    fn test_resize_preserves_and_resets() {
        let mut set = LightSet::new(10);
        for i in 0..10 {
            set.get_mut(i).unwrap().base_rgb = [i as u8, 1, 2];
            set.get_mut(i).unwrap().intensity = 100 + i as u8;
        }

        set.resize(20);
        assert_eq!(set.len(), 20);
        for i in 0..10 {
            assert_eq!(set.get(i).unwrap().base_rgb, [i as u8, 1, 2]);
            assert_eq!(set.get(i).unwrap().intensity, 100 + i as u8);
        }
        assert_eq!(*set.get(15).unwrap(), LightRecord::new(15));

        set.resize(10);
        set.resize(5);
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(4).unwrap().intensity, 104);
        assert!(set.get(5).is_none());

        set.resize(10);
        for i in 5..10 {
            assert_eq!(*set.get(i).unwrap(), LightRecord::new(i));
        }
        assert_eq!(set.get(3).unwrap().base_rgb, [3, 1, 2]);
    }

    #[test]
    fn test_resize_clamps_count() {
        assert_eq!(LightSet::new(0).len(), 1);
        assert_eq!(LightSet::new(500).len(), 64);
    }

    #[test]
    fn test_too_many_lights_rejected() {
        let mut state = LightState::default();
        state.set_light_intensity(3, 10).unwrap();
        let before = state.clone();

        let err = state.update_settings(&update(100)).unwrap_err();
        assert_eq!(err, ValidationError::LightCountOutOfRange(100));
        assert_eq!(state, before);
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut state = LightState::default();
        let mut upd = update(4);
        upd.server_port = 70000;
        assert_eq!(
            state.update_settings(&upd),
            Err(ValidationError::PortOutOfRange(70000))
        );
        assert_eq!(state.lights().len(), 24);
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = SettingsUpdate::parse("a", "99x", "t", "4").unwrap_err();
        assert!(matches!(err, ValidationError::NotAnInteger { field: "port", .. }));
        assert!(SettingsUpdate::parse("a", "1", "t", "four").is_err());
    }

    #[test]
    fn test_empty_fields_fall_back_to_defaults() {
        let mut state = LightState::default();
        let upd = SettingsUpdate::parse("  ", "1234", "", " 8 ").unwrap();
        state.update_settings(&upd).unwrap();
        assert_eq!(state.settings().server_ip, DEFAULT_SERVER_IP);
        assert_eq!(state.settings().tag, DEFAULT_TAG);
        assert_eq!(state.settings().server_port, 1234);
        assert_eq!(state.lights().len(), 8);
    }

    #[test]
    fn test_set_light_out_of_range() {
        let mut state = LightState::new(Settings {
            num_lights: 2,
            ..Settings::default()
        });
        assert_eq!(
            state.set_light_color(2, [0, 0, 0]),
            Err(StateError::NoSuchLight { index: 2, count: 2 })
        );
        state.set_light_color(1, [1, 2, 3]).unwrap();
        assert_eq!(state.snapshot().lights[1].base_rgb, [1, 2, 3]);
    }

    #[test]
    fn test_hex_colors() {
        let mut light = LightRecord::new(0);
        light.base_rgb = [200, 100, 5];
        assert_eq!(light.hex(), "#c86405");
        assert_eq!(parse_hex_rgb("#c86405"), Some([200, 100, 5]));
        assert_eq!(parse_hex_rgb("c86405"), None);
        assert_eq!(parse_hex_rgb("#c8640"), None);
        assert_eq!(parse_hex_rgb("#zz6405"), None);
    }
}
