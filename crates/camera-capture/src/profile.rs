//! CSI camera profiles
//!
//! A profile pins a sensor, its rotation and one of the hardware sensor
//! modes. Everything derived from the mode (capture size, framerate, the
//! driver's internal mode index) comes out of a fixed table; there is no
//! runtime fallback for values outside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CameraError;

/// Rotation applied to each frame by the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
}

impl Rotation {
    /// Rotation in degrees
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
        }
    }

    /// `nvvidconv` flip-method value
    pub fn flip_code(self) -> u8 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 1,
            Rotation::Rotate180 => 2,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = CameraError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Rotate90),
            180 => Ok(Rotation::Rotate180),
            other => Err(CameraError::Configuration(format!(
                "Invalid input for rotation: {other} (expected 0, 90 or 180)"
            ))),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Hardware sensor mode for IMX219 / IMX477 CSI cameras
///
/// Variant names read sensor, capture size and framerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[allow(non_camel_case_types)]
pub enum SensorMode {
    Imx219_3264x2468_21,
    Imx219_3264x1848_28,
    #[default]
    Imx219_1920x1080_30,
    Imx219_1640x1232_30,
    Imx477_4032x3040_30,
    Imx477_1920x1080_60,
    Imx477_2560x1440_40,
}

/// Fixed capture parameters of a sensor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSpec {
    /// Public identifier (unique across sensors)
    pub id: u8,
    /// Canonical name, e.g. `IMX219_1920x1080_30_2`
    pub name: &'static str,
    pub capture_width: u32,
    pub capture_height: u32,
    pub framerate: u32,
    /// Index passed to `nvarguscamerasrc sensor-mode`
    pub mode_index: u8,
}

/// Indexed by `SensorMode` declaration order
static SENSOR_MODES: [ModeSpec; 7] = [
    ModeSpec { id: 0, name: "IMX219_3264x2468_21_0", capture_width: 3264, capture_height: 2468, framerate: 21, mode_index: 0 },
    ModeSpec { id: 1, name: "IMX219_3264x1848_28_1", capture_width: 3264, capture_height: 1848, framerate: 28, mode_index: 1 },
    ModeSpec { id: 2, name: "IMX219_1920x1080_30_2", capture_width: 1920, capture_height: 1080, framerate: 30, mode_index: 2 },
    ModeSpec { id: 3, name: "IMX219_1640x1232_30_3", capture_width: 1640, capture_height: 1232, framerate: 30, mode_index: 3 },
    ModeSpec { id: 4, name: "IMX477_4032x3040_30_0", capture_width: 4032, capture_height: 3040, framerate: 30, mode_index: 0 },
    ModeSpec { id: 5, name: "IMX477_1920x1080_60_1", capture_width: 1920, capture_height: 1080, framerate: 60, mode_index: 1 },
    ModeSpec { id: 7, name: "IMX477_2560x1440_40_3", capture_width: 2560, capture_height: 1440, framerate: 40, mode_index: 3 },
];

impl SensorMode {
    /// Every supported mode, in table order
    pub const ALL: [SensorMode; 7] = [
        SensorMode::Imx219_3264x2468_21,
        SensorMode::Imx219_3264x1848_28,
        SensorMode::Imx219_1920x1080_30,
        SensorMode::Imx219_1640x1232_30,
        SensorMode::Imx477_4032x3040_30,
        SensorMode::Imx477_1920x1080_60,
        SensorMode::Imx477_2560x1440_40,
    ];

    /// Table entry for this mode
    pub fn spec(self) -> &'static ModeSpec {
        &SENSOR_MODES[self as usize]
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for SensorMode {
    type Error = CameraError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        SensorMode::ALL
            .into_iter()
            .find(|mode| mode.spec().id == id)
            .ok_or_else(|| {
                CameraError::Configuration(format!("Invalid input for camera_mode: {id}"))
            })
    }
}

impl FromStr for SensorMode {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SensorMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                CameraError::Configuration(format!("Invalid input for camera_mode: {wanted:?}"))
            })
    }
}

impl TryFrom<String> for SensorMode {
    type Error = CameraError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SensorMode> for String {
    fn from(mode: SensorMode) -> Self {
        mode.name().to_string()
    }
}

/// Validated CSI camera profile
///
/// Derived fields are fixed at construction; a profile that exists is
/// always one the table supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraProfile {
    sensor_id: u32,
    rotation: Rotation,
    sensor_mode: SensorMode,
    display_width: u32,
    display_height: u32,
}

impl CameraProfile {
    /// Build a profile, rejecting zero-sized output
    pub fn new(
        sensor_id: u32,
        rotation: Rotation,
        sensor_mode: SensorMode,
        display_width: u32,
        display_height: u32,
    ) -> Result<Self, CameraError> {
        if display_width == 0 || display_height == 0 {
            return Err(CameraError::Configuration(format!(
                "Invalid display size {display_width}x{display_height}"
            )));
        }

        Ok(Self {
            sensor_id,
            rotation,
            sensor_mode,
            display_width,
            display_height,
        })
    }

    /// Build a profile from raw degrees and a mode identifier
    pub fn from_raw(
        sensor_id: u32,
        rotation_degrees: u16,
        sensor_mode_id: u8,
        display_width: u32,
        display_height: u32,
    ) -> Result<Self, CameraError> {
        Self::new(
            sensor_id,
            Rotation::try_from(rotation_degrees)?,
            SensorMode::try_from(sensor_mode_id)?,
            display_width,
            display_height,
        )
    }

    pub fn sensor_id(&self) -> u32 {
        self.sensor_id
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn sensor_mode(&self) -> SensorMode {
        self.sensor_mode
    }

    pub fn display_width(&self) -> u32 {
        self.display_width
    }

    pub fn display_height(&self) -> u32 {
        self.display_height
    }

    pub fn capture_width(&self) -> u32 {
        self.sensor_mode.spec().capture_width
    }

    pub fn capture_height(&self) -> u32 {
        self.sensor_mode.spec().capture_height
    }

    pub fn framerate(&self) -> u32 {
        self.sensor_mode.spec().framerate
    }

    pub fn mode_index(&self) -> u8 {
        self.sensor_mode.spec().mode_index
    }

    pub fn flip_code(&self) -> u8 {
        self.rotation.flip_code()
    }
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            rotation: Rotation::None,
            sensor_mode: SensorMode::Imx219_1920x1080_30,
            display_width: 640,
            display_height: 480,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mode_table() {
        let expected = [
            (SensorMode::Imx219_3264x2468_21, 3264, 2468, 21, 0),
            (SensorMode::Imx219_3264x1848_28, 3264, 1848, 28, 1),
            (SensorMode::Imx219_1920x1080_30, 1920, 1080, 30, 2),
            (SensorMode::Imx219_1640x1232_30, 1640, 1232, 30, 3),
            (SensorMode::Imx477_4032x3040_30, 4032, 3040, 30, 0),
            (SensorMode::Imx477_1920x1080_60, 1920, 1080, 60, 1),
            (SensorMode::Imx477_2560x1440_40, 2560, 1440, 40, 3),
        ];

        for (mode, width, height, fps, index) in expected {
            for (rotation, flip) in [
                (Rotation::None, 0),
                (Rotation::Rotate90, 1),
                (Rotation::Rotate180, 2),
            ] {
                let profile = CameraProfile::new(0, rotation, mode, 640, 480).unwrap();
                assert_eq!(
                    (
                        profile.capture_width(),
                        profile.capture_height(),
                        profile.framerate(),
                        profile.mode_index(),
                        profile.flip_code(),
                    ),
                    (width, height, fps, index, flip),
                    "{mode} rotated {}",
                    rotation.degrees()
                );
            }
        }
    }

    #[test]
    fn test_mode_ids_skip_six() {
        assert_eq!(SensorMode::try_from(7).unwrap(), SensorMode::Imx477_2560x1440_40);
        assert!(matches!(
            SensorMode::try_from(6),
            Err(CameraError::Configuration(_))
        ));
    }

    #[test]
    fn test_mode_from_name() {
        let mode: SensorMode = "imx477_1920x1080_60_1".parse().unwrap();
        assert_eq!(mode, SensorMode::Imx477_1920x1080_60);
        assert!("IMX999_1x1_1_1".parse::<SensorMode>().is_err());
    }

    #[test]
    fn test_invalid_rotation() {
        assert!(matches!(
            Rotation::try_from(270),
            Err(CameraError::Configuration(_))
        ));
        assert!(CameraProfile::from_raw(0, 45, 2, 640, 480).is_err());
    }

    #[test]
    fn test_zero_display_rejected() {
        let err = CameraProfile::new(0, Rotation::None, SensorMode::default(), 0, 480);
        assert!(matches!(err, Err(CameraError::Configuration(_))));
    }

    #[test]
    fn test_default_profile() {
        let profile = CameraProfile::default();
        assert_eq!(profile.sensor_mode(), SensorMode::Imx219_1920x1080_30);
        assert_eq!((profile.display_width(), profile.display_height()), (640, 480));
        assert_eq!(profile.flip_code(), 0);
    }

    #[test]
    fn test_serde_uses_degrees_and_names() {
        let json = serde_json::to_string(&(Rotation::Rotate180, SensorMode::Imx219_1640x1232_30)).unwrap();
        assert_eq!(json, r#"[180,"IMX219_1640x1232_30_3"]"#);
        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }

    proptest! {
        #[test]
        fn prop_only_table_ids_resolve(id in any::<u8>()) {
            let known = [0u8, 1, 2, 3, 4, 5, 7].contains(&id);
            prop_assert_eq!(SensorMode::try_from(id).is_ok(), known);
        }

        #[test]
        fn prop_only_three_rotations(degrees in any::<u16>()) {
            let known = matches!(degrees, 0 | 90 | 180);
            prop_assert_eq!(Rotation::try_from(degrees).is_ok(), known);
        }
    }
}
