//! Data models for decoded SHSWorks answers.
//!
//! These are the typed values the answer grammar produces: numbers with the
//! integer/float distinction preserved, classified parameter values, field
//! statistics and pass/fail evaluation results, plus the small wire enums
//! used to validate command arguments at compile time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, ShsError};

/// A numeric wire token.
///
/// SHSWorks answers mix integral and floating-point values (`AVE=8` vs
/// `GAI=1.0`); the distinction is part of the grammar, so it is kept rather
/// than collapsing everything to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Parse a numeric token: integral tokens become `Int`, tokens with a
    /// decimal point or exponent become `Float`.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if let Ok(value) = token.parse::<i64>() {
            return Ok(Number::Int(value));
        }
        if let Ok(value) = token.parse::<f64>() {
            return Ok(Number::Float(value));
        }
        Err(ShsError::UnexpectedFormat(format!(
            "not a numeric token: {token:?}"
        )))
    }

    /// Value widened to `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    /// Integral value, if this token was integral.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int(value) => Some(value),
            Number::Float(_) => None,
        }
    }

    /// Numeric truthiness (`0` / `0.0` are false), used for flag parameters.
    pub fn is_truthy(self) -> bool {
        self.as_f64() != 0.0
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}

/// A decoded SHSWorks parameter value.
///
/// Which variant applies is decided by a fixed per-name classification (see
/// `protocol::answer::classify_parameter`), never by sniffing the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Path(PathBuf),
    Num(Number),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            ParamValue::Num(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            ParamValue::Path(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(value) => f.write_str(value),
            ParamValue::Path(value) => write!(f, "{}", value.display()),
            ParamValue::Num(value) => write!(f, "{value}"),
        }
    }
}

/// Statistical field information (`get_field_stats`, opcode 35, and the
/// radial power map statistics, opcode 41).
///
/// Field order on the wire is protocol-fixed:
/// XMIN XMAX YMIN YMAX MIN MAX MEAN PV RMS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Peak-to-valley.
    pub pv: f64,
    pub rms: f64,
}

/// Result of a pass/fail evaluation: index → value, in response order.
///
/// The instrument reports values in the order the items are configured, and
/// callers correlate them with names queried separately, so insertion order
/// is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    entries: Vec<(i64, Number)>,
}

impl Evaluation {
    /// Value of a specific pass/fail item.
    pub fn get(&self, index: i64) -> Option<Number> {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, value)| *value)
    }

    /// Entries in response order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, Number)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(i64, Number)> for Evaluation {
    fn from_iter<T: IntoIterator<Item = (i64, Number)>>(iter: T) -> Self {
        Evaluation {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Camera settings: group label (`SHS`, and `VCC` when one is fitted) →
/// setting token → value.
pub type CamSettings = BTreeMap<String, BTreeMap<String, Number>>;

/// Camera selector for `set_cam_setting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Camera {
    /// The Shack-Hartmann sensor camera.
    Shs,
    /// The vision control camera.
    Vcc,
    /// The side view camera.
    Svc,
}

impl Camera {
    pub fn as_str(&self) -> &'static str {
        match self {
            Camera::Shs => "SHS",
            Camera::Vcc => "VCC",
            Camera::Svc => "SVC",
        }
    }
}

/// Settable camera parameter tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamSetting {
    /// Bus/grabber number.
    Bus,
    /// Camera number.
    Cam,
    /// Trigger mode.
    Tri,
    /// Autoshutter on/off.
    Ash,
    /// Frames averaged (1, 2, 4, 8, ..., 1024).
    Ave,
    /// Shutter time in microseconds.
    Shu,
    /// Brightness.
    Bri,
    /// Gain.
    Gai,
    /// Camera temperature (read-only on most models).
    Tem,
}

impl CamSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            CamSetting::Bus => "BUS",
            CamSetting::Cam => "CAM",
            CamSetting::Tri => "TRI",
            CamSetting::Ash => "ASH",
            CamSetting::Ave => "AVE",
            CamSetting::Shu => "SHU",
            CamSetting::Bri => "BRI",
            CamSetting::Gai => "GAI",
            CamSetting::Tem => "TEM",
        }
    }
}

/// Which part of a data field a file operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPart {
    /// Original (measurement) part.
    Org,
    /// Reference part.
    Ref,
    /// Both parts. For BIG and TXT files this is a synonym for ORG.
    Both,
}

impl FieldPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPart::Org => "ORG",
            FieldPart::Ref => "REF",
            FieldPart::Both => "BOTH",
        }
    }
}
