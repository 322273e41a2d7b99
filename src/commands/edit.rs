//! `/holo edit` actions.
//!
//! Parsing and applying are pure: an [`Edit`] is parsed from the command
//! arguments, then [`apply`] builds the changed hologram. Spawning and saving
//! the result is the command handler's job.

use thiserror::Error;

use crate::hologram::{Alignment, Billboard, Brightness, Hologram, Line, LINE_SPACING};
use crate::types::V3;

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    AddLine(String),
    /// Line numbers are 1-based.
    EditLine { line: usize, text: String },
    RemoveLine(usize),
    /// `line: None` applies the change to every line.
    Set { line: Option<usize>, change: Change },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Scale([f32; 3]),
    LeftRotation([f32; 4]),
    RightRotation([f32; 4]),
    Alignment(Alignment),
    Billboard(Billboard),
    SeeThrough(bool),
    Shadow(bool),
    DefaultBackground(bool),
    Background(Option<String>),
    LineWidth(i32),
    Opacity(u8),
    SkyLight(u8),
    BlockLight(u8),
    ViewRange(f32),
    ShadowRadius(f64),
    ShadowStrength(f64),
    Permission(Option<String>),
    Offset(Axis, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown edit action '{0}'")]
    UnknownAction(String),
    #[error("missing arguments")]
    Usage,
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("line must be between 1 and {lines}")]
    InvalidLine { lines: usize },
    #[error("line {0} already has that text")]
    SameText(usize),
    #[error("a hologram needs at least one line")]
    LastLine,
}

type Parse = fn(&[&str]) -> Result<Edit, EditError>;

pub struct ActionSpec {
    pub name: &'static str,
    pub usage: &'static str,
    parse: Parse,
}

pub const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "addline",
        usage: "addline <text>",
        parse: |args| text(args).map(Edit::AddLine),
    },
    ActionSpec {
        name: "editline",
        usage: "editline <line> <text>",
        parse: |args| match args {
            [line, rest @ ..] => Ok(Edit::EditLine { line: line_number(line)?, text: text(rest)? }),
            [] => Err(EditError::Usage),
        },
    },
    ActionSpec {
        name: "removeline",
        usage: "removeline <line>",
        parse: |args| match args {
            [line] => line_number(line).map(Edit::RemoveLine),
            _ => Err(EditError::Usage),
        },
    },
    ActionSpec {
        name: "set_scale",
        usage: "set_scale [line] [x,y,z]",
        parse: |args| targeted(args, |v| floats(v).map(Change::Scale)),
    },
    ActionSpec {
        name: "set_leftrotation",
        usage: "set_leftrotation [line] [x,y,z,w]",
        parse: |args| targeted(args, |v| floats(v).map(Change::LeftRotation)),
    },
    ActionSpec {
        name: "set_rightrotation",
        usage: "set_rightrotation [line] [x,y,z,w]",
        parse: |args| targeted(args, |v| floats(v).map(Change::RightRotation)),
    },
    ActionSpec {
        name: "set_alignment",
        usage: "set_alignment [line] <left|center|right>",
        parse: |args| targeted(args, |v| v.parse().ok().map(Change::Alignment)),
    },
    ActionSpec {
        name: "set_billboard",
        usage: "set_billboard [line] <fixed|vertical|horizontal|center>",
        parse: |args| targeted(args, |v| v.parse().ok().map(Change::Billboard)),
    },
    ActionSpec {
        name: "set_seethrough",
        usage: "set_seethrough [line] <true|false>",
        parse: |args| targeted(args, |v| boolean(v).map(Change::SeeThrough)),
    },
    ActionSpec {
        name: "set_shadow",
        usage: "set_shadow [line] <true|false>",
        parse: |args| targeted(args, |v| boolean(v).map(Change::Shadow)),
    },
    ActionSpec {
        name: "set_defaultbackground",
        usage: "set_defaultbackground [line] <true|false>",
        parse: |args| targeted(args, |v| boolean(v).map(Change::DefaultBackground)),
    },
    ActionSpec {
        name: "set_background",
        usage: "set_background [line] <0xAARRGGBB|none>",
        parse: |args| targeted(args, |v| optional(v, argb).map(Change::Background)),
    },
    ActionSpec {
        name: "set_linewidth",
        usage: "set_linewidth [line] <width>",
        parse: |args| targeted(args, |v| v.parse::<i32>().ok().filter(|w| *w > 0).map(Change::LineWidth)),
    },
    ActionSpec {
        name: "set_opacity",
        usage: "set_opacity [line] <0-255>",
        parse: |args| targeted(args, |v| v.parse().ok().map(Change::Opacity)),
    },
    ActionSpec {
        name: "set_brightness",
        usage: "set_brightness <sky|block> [line] <0-15>",
        parse: |args| {
            let (kind, rest) = args.split_first().ok_or(EditError::Usage)?;
            let change: fn(u8) -> Change = match kind.to_ascii_lowercase().as_str() {
                "sky" => Change::SkyLight,
                "block" => Change::BlockLight,
                _ => return Err(EditError::InvalidValue(kind.to_string())),
            };
            targeted(rest, |v| v.parse::<u8>().ok().filter(|l| *l <= 15).map(change))
        },
    },
    ActionSpec {
        name: "set_viewrange",
        usage: "set_viewrange [line] <range>",
        parse: |args| targeted(args, |v| non_negative(v).map(|r| Change::ViewRange(r as f32))),
    },
    ActionSpec {
        name: "set_shadowradius",
        usage: "set_shadowradius [line] <radius>",
        parse: |args| targeted(args, |v| non_negative(v).map(Change::ShadowRadius)),
    },
    ActionSpec {
        name: "set_shadowstrength",
        usage: "set_shadowstrength [line] <strength>",
        parse: |args| targeted(args, |v| non_negative(v).map(Change::ShadowStrength)),
    },
    ActionSpec {
        name: "set_permission",
        usage: "set_permission [line] <permission|none>",
        parse: |args| targeted(args, |v| optional(v, |p| Some(p.to_owned())).map(Change::Permission)),
    },
    ActionSpec {
        name: "set_offset_x",
        usage: "set_offset_x [line] <value>",
        parse: |args| targeted(args, |v| finite(v).map(|o| Change::Offset(Axis::X, o))),
    },
    ActionSpec {
        name: "set_offset_y",
        usage: "set_offset_y [line] <value>",
        parse: |args| targeted(args, |v| finite(v).map(|o| Change::Offset(Axis::Y, o))),
    },
    ActionSpec {
        name: "set_offset_z",
        usage: "set_offset_z [line] <value>",
        parse: |args| targeted(args, |v| finite(v).map(|o| Change::Offset(Axis::Z, o))),
    },
];

pub fn find(action: &str) -> Option<&'static ActionSpec> {
    ACTIONS.iter().find(|a| a.name.eq_ignore_ascii_case(action))
}

pub fn action_names() -> Vec<&'static str> {
    ACTIONS.iter().map(|a| a.name).collect()
}

impl ActionSpec {
    pub fn parse(&self, args: &[&str]) -> Result<Edit, EditError> {
        (self.parse)(args)
    }
}

fn text(args: &[&str]) -> Result<String, EditError> {
    let text = args.join(" ");
    if text.trim().is_empty() {
        return Err(EditError::Usage);
    }
    Ok(text)
}

/// Negative numbers become 0 so they are reported as out of range.
fn line_number(arg: &str) -> Result<usize, EditError> {
    let n: i64 = arg.parse().map_err(|_| EditError::InvalidValue(arg.to_owned()))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

/// `[line] <value>`: a leading integer is a line number only when a value
/// follows it.
fn targeted(args: &[&str], value: impl FnOnce(&str) -> Option<Change>) -> Result<Edit, EditError> {
    let (line, raw) = match args {
        [first, raw, ..] if first.parse::<i64>().is_ok() => (Some(line_number(first)?), *raw),
        [raw, ..] => (None, *raw),
        [] => return Err(EditError::Usage),
    };
    let change = value(raw).ok_or_else(|| EditError::InvalidValue(raw.to_owned()))?;
    Ok(Edit::Set { line, change })
}

fn boolean(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn finite(v: &str) -> Option<f64> {
    v.parse::<f64>().ok().filter(|f| f.is_finite())
}
fn non_negative(v: &str) -> Option<f64> {
    finite(v).filter(|f| *f >= 0.0)
}

/// `[a,b,c]` with exactly `N` components.
fn floats<const N: usize>(v: &str) -> Option<[f32; N]> {
    let inner = v.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut parts = inner.split(',');
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = parts.next()?.trim().parse().ok().filter(|f: &f32| f.is_finite())?;
    }
    parts.next().is_none().then_some(out)
}

/// Eight hex digits, optionally prefixed with `0x`. Stored as `0x` + lowercase.
fn argb(v: &str) -> Option<String> {
    let lower = v.trim().to_ascii_lowercase();
    let hex = lower.strip_prefix("0x").unwrap_or(&lower);
    (hex.len() == 8 && hex.bytes().all(|b| b.is_ascii_hexdigit())).then(|| format!("0x{hex}"))
}

/// `none` clears the value.
fn optional(v: &str, parse: impl FnOnce(&str) -> Option<String>) -> Option<Option<String>> {
    if v.eq_ignore_ascii_case("none") {
        Some(None)
    } else {
        parse(v).map(Some)
    }
}

impl Change {
    fn apply(&self, line: Line) -> Line {
        match self {
            Self::Scale(v) => line.with_settings(|s| s.with_scale(*v)),
            Self::LeftRotation(v) => line.with_settings(|s| s.with_left_rotation(*v)),
            Self::RightRotation(v) => line.with_settings(|s| s.with_right_rotation(*v)),
            Self::Alignment(a) => line.with_settings(|s| s.with_alignment(*a)),
            Self::Billboard(b) => line.with_settings(|s| s.with_billboard(*b)),
            Self::SeeThrough(b) => line.with_settings(|s| s.with_see_through(*b)),
            Self::Shadow(b) => line.with_settings(|s| s.with_shadow(*b)),
            Self::DefaultBackground(b) => line.with_settings(|s| s.with_default_background(*b)),
            Self::Background(Some(hex)) => {
                line.with_settings(|s| s.with_background(Some(hex.clone())).with_default_background(false))
            }
            Self::Background(None) => line.with_settings(|s| s.with_background(None).with_default_background(true)),
            Self::LineWidth(w) => line.with_settings(|s| s.with_line_width(*w)),
            Self::Opacity(o) => line.with_settings(|s| s.with_opacity(*o)),
            Self::SkyLight(level) => line.with_settings(|s| {
                let old = s.brightness.unwrap_or(Brightness { sky: 0, block: 0 });
                s.with_brightness(Some(Brightness { sky: *level, ..old }))
            }),
            Self::BlockLight(level) => line.with_settings(|s| {
                let old = s.brightness.unwrap_or(Brightness { sky: 0, block: 0 });
                s.with_brightness(Some(Brightness { block: *level, ..old }))
            }),
            Self::ViewRange(r) => line.with_settings(|s| s.with_view_range(*r)),
            Self::ShadowRadius(r) => line.with_settings(|s| s.with_shadow_radius(*r)),
            Self::ShadowStrength(v) => line.with_settings(|s| s.with_shadow_strength(*v)),
            Self::Permission(p) => line.with_settings(|s| s.with_permission(p.clone())),
            Self::Offset(axis, v) => {
                let V3 { x, y, z } = line.offset;
                let offset = match axis {
                    Axis::X => V3(*v, y, z),
                    Axis::Y => V3(x, *v, z),
                    Axis::Z => V3(x, y, *v),
                };
                line.with_offset(offset)
            }
        }
    }
}

/// The hologram with `edit` applied. `hologram` is left untouched.
pub fn apply(hologram: &Hologram, edit: &Edit) -> Result<Hologram, EditError> {
    let mut lines = hologram.lines.clone();
    let count = lines.len();
    let index = |line: usize| {
        if (1..=count).contains(&line) {
            Ok(line - 1)
        } else {
            Err(EditError::InvalidLine { lines: count })
        }
    };
    match edit {
        Edit::AddLine(text) => {
            let offset = V3(0.0, -(count as f64) * LINE_SPACING, 0.0);
            lines.push(Line::new(text.clone(), offset));
        }
        Edit::EditLine { line, text } => {
            let i = index(*line)?;
            if lines[i].text == *text {
                return Err(EditError::SameText(*line));
            }
            lines[i] = lines[i].clone().with_text(text.clone());
        }
        Edit::RemoveLine(line) => {
            let i = index(*line)?;
            if count <= 1 {
                return Err(EditError::LastLine);
            }
            lines.remove(i);
        }
        Edit::Set { line, change } => {
            let targets = match line {
                Some(line) => index(*line).map(|i| i..i + 1)?,
                None => 0..count,
            };
            for target in &mut lines[targets] {
                *target = change.apply(target.clone());
            }
        }
    }
    Ok(hologram.clone().with_lines(lines))
}
