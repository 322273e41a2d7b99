//! Hologram configuration values.
//!
//! All of these are plain values. Edits produce a changed copy through the
//! `with_*` functions rather than mutating a shared configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::spawner::WorkItem;
use crate::types::{Location, V3};

/// Vertical distance between consecutive lines.
pub const LINE_SPACING: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hologram {
    pub name: String,
    pub enabled: bool,
    pub location: Location,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub text: String,
    pub offset: V3<f64>,
    #[serde(rename = "display_settings")]
    pub settings: DisplaySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Billboard {
    #[default]
    Fixed,
    Vertical,
    Horizontal,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Brightness {
    pub sky: u8,
    pub block: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default = "default_opacity", skip_serializing_if = "is_default_opacity")]
    pub text_opacity: u8,
    #[serde(default = "default_line_width", skip_serializing_if = "is_default_line_width")]
    pub line_width: i32,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_default")]
    pub text_alignment: Alignment,
    /// ARGB hex, e.g. `0x4000FF00`. Only used when `default_background` is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub default_background: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub see_through: bool,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub shadow: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_default")]
    pub billboard: Billboard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(default, deserialize_with = "brightness", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<Brightness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_range: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_rotation: Option<[f32; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_rotation: Option<[f32; 4]>,
}

const fn default_opacity() -> u8 {
    255
}
const fn default_line_width() -> i32 {
    200
}
const fn yes() -> bool {
    true
}
fn is_default_opacity(v: &u8) -> bool {
    *v == default_opacity()
}
fn is_default_line_width(v: &i32) -> bool {
    *v == default_line_width()
}
fn is_true(v: &bool) -> bool {
    *v
}
fn is_false(v: &bool) -> bool {
    !*v
}
fn is_default<T: Default + PartialEq>(v: &T) -> bool {
    *v == T::default()
}

/// Unknown or non-string values fall back to the default instead of
/// rejecting the whole line.
fn lenient<'de, D: Deserializer<'de>, T: FromStr + Default>(d: D) -> Result<T, D::Error> {
    let value = serde_yaml::Value::deserialize(d)?;
    Ok(value.as_str().and_then(|s| s.parse().ok()).unwrap_or_default())
}

fn brightness<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Brightness>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Packed(i64),
        Split {
            #[serde(default)]
            sky: i64,
            #[serde(default)]
            block: i64,
        },
    }
    Ok(match Option::<Repr>::deserialize(d)? {
        Some(Repr::Packed(v)) => Some(Brightness::unpack(v)),
        Some(Repr::Split { sky, block }) => Brightness::new(sky, block),
        None => None,
    })
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            text_opacity: default_opacity(),
            line_width: default_line_width(),
            text_alignment: Alignment::Center,
            background: None,
            default_background: true,
            see_through: false,
            shadow: true,
            billboard: Billboard::Fixed,
            permission: None,
            brightness: None,
            shadow_radius: None,
            shadow_strength: None,
            view_range: None,
            translation: None,
            right_rotation: None,
            scale: None,
            left_rotation: None,
        }
    }
}

impl Brightness {
    /// Both components must be in 0..=15.
    pub fn new(sky: i64, block: i64) -> Option<Self> {
        let range = 0..=15;
        (range.contains(&sky) && range.contains(&block)).then(|| Self { sky: sky as u8, block: block as u8 })
    }
    pub fn unpack(packed: i64) -> Self {
        Self { sky: ((packed >> 4) & 0xF) as u8, block: (packed & 0xF) as u8 }
    }
    pub fn packed(self) -> u8 {
        self.sky << 4 | self.block
    }
}

impl FromStr for Alignment {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}
impl FromStr for Billboard {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            "center" => Ok(Self::Center),
            _ => Err(()),
        }
    }
}
impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "LEFT",
            Self::Center => "CENTER",
            Self::Right => "RIGHT",
        })
    }
}
impl fmt::Display for Billboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
            Self::Center => "center",
        })
    }
}

impl DisplaySettings {
    pub fn requires_permission(&self) -> Option<&str> {
        self.permission.as_deref().filter(|p| !p.is_empty())
    }
    /// The custom background colour, 0 when unset or unparsable.
    pub fn background_argb(&self) -> u32 {
        self.background.as_deref().and_then(parse_argb).unwrap_or(0)
    }

    pub fn with_opacity(self, text_opacity: u8) -> Self {
        Self { text_opacity, ..self }
    }
    pub fn with_line_width(self, line_width: i32) -> Self {
        Self { line_width, ..self }
    }
    pub fn with_alignment(self, text_alignment: Alignment) -> Self {
        Self { text_alignment, ..self }
    }
    pub fn with_background(self, background: Option<String>) -> Self {
        Self { background, ..self }
    }
    pub fn with_default_background(self, default_background: bool) -> Self {
        Self { default_background, ..self }
    }
    pub fn with_see_through(self, see_through: bool) -> Self {
        Self { see_through, ..self }
    }
    pub fn with_shadow(self, shadow: bool) -> Self {
        Self { shadow, ..self }
    }
    pub fn with_billboard(self, billboard: Billboard) -> Self {
        Self { billboard, ..self }
    }
    pub fn with_permission(self, permission: Option<String>) -> Self {
        Self { permission, ..self }
    }
    pub fn with_brightness(self, brightness: Option<Brightness>) -> Self {
        Self { brightness, ..self }
    }
    pub fn with_shadow_radius(self, shadow_radius: f64) -> Self {
        Self { shadow_radius: Some(shadow_radius), ..self }
    }
    pub fn with_shadow_strength(self, shadow_strength: f64) -> Self {
        Self { shadow_strength: Some(shadow_strength), ..self }
    }
    pub fn with_view_range(self, view_range: f32) -> Self {
        Self { view_range: Some(view_range), ..self }
    }
    pub fn with_translation(self, translation: [f32; 3]) -> Self {
        Self { translation: Some(translation), ..self }
    }
    pub fn with_right_rotation(self, right_rotation: [f32; 4]) -> Self {
        Self { right_rotation: Some(right_rotation), ..self }
    }
    pub fn with_scale(self, scale: [f32; 3]) -> Self {
        Self { scale: Some(scale), ..self }
    }
    pub fn with_left_rotation(self, left_rotation: [f32; 4]) -> Self {
        Self { left_rotation: Some(left_rotation), ..self }
    }
}

pub fn parse_argb(s: &str) -> Option<u32> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(hex, 16).ok()
}

impl Line {
    pub fn new(text: impl Into<String>, offset: V3<f64>) -> Self {
        Self { text: text.into(), offset, settings: DisplaySettings::default() }
    }
    pub fn with_text(self, text: impl Into<String>) -> Self {
        Self { text: text.into(), ..self }
    }
    pub fn with_offset(self, offset: V3<f64>) -> Self {
        Self { offset, ..self }
    }
    pub fn with_settings(self, f: impl FnOnce(DisplaySettings) -> DisplaySettings) -> Self {
        Self { settings: f(self.settings), ..self }
    }
}

impl Hologram {
    pub fn new(name: impl Into<String>, location: Location, lines: Vec<Line>) -> Self {
        Self { name: name.into(), enabled: true, location, lines }
    }
    pub fn with_lines(self, lines: Vec<Line>) -> Self {
        Self { lines, ..self }
    }
    pub fn with_location(self, location: Location) -> Self {
        Self { location, ..self }
    }
    pub fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }
    pub fn world(&self) -> &str {
        &self.location.world
    }
    /// Where line `i` sits in the world.
    pub fn line_location(&self, i: usize) -> Option<Location> {
        self.lines.get(i).map(|line| self.location.offset(line.offset))
    }
}

impl WorkItem for Hologram {
    fn name(&self) -> &str {
        &self.name
    }
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
