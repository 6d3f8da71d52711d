//! Composition metadata as reported by a served bundle.
//!
//! A bundle reports its compositions as plain JSON objects. Numbers arrive as
//! JavaScript numbers, which means `NaN` and `Infinity` are serialized as
//! `null` and a buggy bundle can hand us a string where a number belongs.
//! [`RawComposition`] keeps those values as-is so that validation can report
//! exactly what went wrong; [`CompositionMetadata`] is the checked form.

use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A composition failed validation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompositionError {
    /// Width or height is not a positive integer.
    #[error("{message}")]
    InvalidDimension {
        /// `"width"` or `"height"`.
        prop: String,
        /// Full human-readable message.
        message: String,
    },

    /// Frame rate is not a positive finite number.
    #[error("{message}")]
    InvalidFps {
        /// Full human-readable message.
        message: String,
    },

    /// Duration is not an integer `>= 1`.
    #[error("{message}")]
    InvalidDuration {
        /// Full human-readable message.
        message: String,
    },

    /// A frame index outside `0..duration_in_frames` was requested.
    #[error(
        "Cannot use frame {frame}: Duration of composition is {duration_in_frames}, therefore the highest frame that can be rendered is {}",
        duration_in_frames.saturating_sub(1)
    )]
    InvalidFrame {
        /// Composition identifier.
        id: String,
        /// The requested frame.
        frame: i64,
        /// Composition length.
        duration_in_frames: u32,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// JsNumber
// ─────────────────────────────────────────────────────────────────────────────

/// A numeric field as a JavaScript runtime reported it.
///
/// `null` decodes to `NaN` (that is how `JSON.stringify` encodes non-finite
/// numbers). Any other non-number decodes to [`JsNumber::WrongType`] carrying
/// the JavaScript `typeof` name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JsNumber {
    /// A number, possibly NaN or infinite.
    Value(f64),
    /// Not a number at all.
    WrongType(&'static str),
}

impl JsNumber {
    /// The numeric value, if this is a number.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::WrongType(_) => None,
        }
    }
}

impl From<f64> for JsNumber {
    fn from(v: f64) -> Self {
        Self::Value(v)
    }
}

impl From<u32> for JsNumber {
    fn from(v: u32) -> Self {
        Self::Value(f64::from(v))
    }
}

impl Default for JsNumber {
    fn default() -> Self {
        Self::WrongType("undefined")
    }
}

impl<'de> Deserialize<'de> for JsNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => Self::Value(n.as_f64().unwrap_or(f64::NAN)),
            Value::Null => Self::Value(f64::NAN),
            Value::String(_) => Self::WrongType("string"),
            Value::Bool(_) => Self::WrongType("boolean"),
            Value::Array(_) | Value::Object(_) => Self::WrongType("object"),
        })
    }
}

impl Serialize for JsNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // serde_json writes non-finite floats as null, mirroring JSON.stringify
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::WrongType(_) => serializer.serialize_none(),
        }
    }
}

/// Format a float the way JavaScript prints it in template strings.
fn js_display(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v == f64::INFINITY {
        "Infinity".into()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".into()
    } else {
        format!("{v}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-forced dimensions applied on top of what the bundle reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionOverrides {
    /// Forced width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Forced height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl DimensionOverrides {
    /// No overrides.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether neither dimension is overridden.
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RawComposition
// ─────────────────────────────────────────────────────────────────────────────

/// A composition exactly as the bundle's `getStaticCompositions()` returned it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComposition {
    /// Identifier, unique within one discovery response.
    pub id: String,
    /// Width in pixels.
    #[serde(default)]
    pub width: JsNumber,
    /// Height in pixels.
    #[serde(default)]
    pub height: JsNumber,
    /// Frames per second.
    #[serde(default)]
    pub fps: JsNumber,
    /// Length in frames.
    #[serde(default)]
    pub duration_in_frames: JsNumber,
    /// Props declared by the composition.
    #[serde(default, deserialize_with = "object_or_empty")]
    pub default_props: Map<String, Value>,
    /// Props after merging the caller's input props.
    #[serde(default, deserialize_with = "object_or_empty")]
    pub props: Map<String, Value>,
    /// Codec suggested by the composition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_codec: Option<String>,
    /// Output file name suggested by the composition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_out_name: Option<String>,
}

fn object_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(d)?.unwrap_or_default())
}

impl RawComposition {
    /// Replace width and/or height with the caller's forced values.
    ///
    /// Frame rate, duration, id and props are never touched.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &DimensionOverrides) -> Self {
        if let Some(width) = overrides.width {
            self.width = JsNumber::Value(width);
        }
        if let Some(height) = overrides.height {
            self.height = JsNumber::Value(height);
        }
        self
    }

    /// Check every numeric field and produce the validated form.
    pub fn validate(self) -> Result<CompositionMetadata, CompositionError> {
        let location = format!("of composition \"{}\"", self.id);
        let width = validate_dimension(self.width, "width", &location)?;
        let height = validate_dimension(self.height, "height", &location)?;
        let fps = validate_fps(self.fps, &location)?;
        let duration_in_frames = validate_duration_in_frames(self.duration_in_frames, &location)?;

        Ok(CompositionMetadata {
            id: self.id,
            width,
            height,
            fps,
            duration_in_frames,
            default_props: self.default_props,
            props: self.props,
            default_codec: self.default_codec,
            default_out_name: self.default_out_name,
        })
    }
}

/// Validate a width or height.
///
/// Checks run in a fixed order so the first reported problem is stable:
/// type, NaN, finiteness, integrality, positivity.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn validate_dimension(
    value: JsNumber,
    prop: &str,
    location: &str,
) -> Result<u32, CompositionError> {
    let fail = |message: String| CompositionError::InvalidDimension {
        prop: prop.to_owned(),
        message,
    };

    let v = match value {
        JsNumber::Value(v) => v,
        JsNumber::WrongType(ty) => {
            return Err(fail(format!(
                "The \"{prop}\" prop {location} must be a number, but you passed a value of type {ty}"
            )));
        }
    };
    if v.is_nan() {
        return Err(fail(format!(
            "The \"{prop}\" prop {location} must not be NaN, but is NaN."
        )));
    }
    if !v.is_finite() {
        return Err(fail(format!(
            "The \"{prop}\" prop {location} must be finite, but is {}.",
            js_display(v)
        )));
    }
    if v.fract() != 0.0 {
        return Err(fail(format!(
            "The \"{prop}\" prop {location} must be an integer, but is {}.",
            js_display(v)
        )));
    }
    if v <= 0.0 {
        return Err(fail(format!(
            "The \"{prop}\" prop {location} must be positive, but got {}.",
            js_display(v)
        )));
    }
    if v > f64::from(u32::MAX) {
        return Err(fail(format!(
            "The \"{prop}\" prop {location} must be at most {}, but got {}.",
            u32::MAX,
            js_display(v)
        )));
    }
    Ok(v as u32)
}

/// Validate a frame rate: a positive finite number.
pub fn validate_fps(value: JsNumber, location: &str) -> Result<f64, CompositionError> {
    let fail = |message: String| CompositionError::InvalidFps { message };
    let v = match value {
        JsNumber::Value(v) => v,
        JsNumber::WrongType(ty) => {
            return Err(fail(format!(
                "\"fps\" must be a number, but you passed a value of type {ty} {location}"
            )));
        }
    };
    if v.is_nan() {
        return Err(fail(format!("\"fps\" must not be NaN, but got NaN {location}")));
    }
    if !v.is_finite() {
        return Err(fail(format!(
            "\"fps\" must be finite, but you passed {} {location}",
            js_display(v)
        )));
    }
    if v <= 0.0 {
        return Err(fail(format!(
            "\"fps\" must be positive, but got {} {location}",
            js_display(v)
        )));
    }
    Ok(v)
}

/// Validate a duration: an integer `>= 1`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn validate_duration_in_frames(
    value: JsNumber,
    location: &str,
) -> Result<u32, CompositionError> {
    let fail = |message: String| CompositionError::InvalidDuration { message };
    let v = match value {
        JsNumber::Value(v) => v,
        JsNumber::WrongType(ty) => {
            return Err(fail(format!(
                "The \"durationInFrames\" prop {location} must be a number, but you passed a value of type {ty}"
            )));
        }
    };
    if !v.is_finite() {
        return Err(fail(format!(
            "The \"durationInFrames\" prop {location} must be finite, but got {}.",
            js_display(v)
        )));
    }
    if v <= 0.0 {
        return Err(fail(format!(
            "The \"durationInFrames\" prop {location} must be positive, but got {}.",
            js_display(v)
        )));
    }
    if v.fract() != 0.0 {
        return Err(fail(format!(
            "The \"durationInFrames\" prop {location} must be an integer, but got {}.",
            js_display(v)
        )));
    }
    if v > f64::from(u32::MAX) {
        return Err(fail(format!(
            "The \"durationInFrames\" prop {location} must be at most {}, but got {}.",
            u32::MAX,
            js_display(v)
        )));
    }
    Ok(v as u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// CompositionMetadata
// ─────────────────────────────────────────────────────────────────────────────

/// A validated composition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionMetadata {
    /// Identifier.
    pub id: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Length in frames (`>= 1`).
    pub duration_in_frames: u32,
    /// Props declared by the composition.
    pub default_props: Map<String, Value>,
    /// Props after merging the caller's input props.
    pub props: Map<String, Value>,
    /// Codec suggested by the composition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_codec: Option<String>,
    /// Output file name suggested by the composition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_out_name: Option<String>,
}

impl CompositionMetadata {
    /// Check that `frame` addresses an existing frame of this composition.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn validate_frame(&self, frame: i64) -> Result<u32, CompositionError> {
        if frame < 0 || frame >= i64::from(self.duration_in_frames) {
            return Err(CompositionError::InvalidFrame {
                id: self.id.clone(),
                frame,
                duration_in_frames: self.duration_in_frames,
            });
        }
        Ok(frame as u32)
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.duration_in_frames) / self.fps
    }
}

impl fmt::Display for CompositionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {} fps, {} frames)",
            self.id, self.width, self.height, self.fps, self.duration_in_frames
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
