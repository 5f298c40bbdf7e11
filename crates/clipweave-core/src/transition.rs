//! Transition catalog and its evaluation into per-layer render transforms.
//!
//! A transition covers the first (`Start`) or last (`End`) `duration` seconds
//! of a clip. Evaluation is a pure function of kind, position, progress and
//! frame size, so the preview style backend and the export raster path share
//! one source of truth.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Affine, ClipRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    Fade,
    Dissolve,
    CrossDissolve,
    ZoomIn,
    ZoomOut,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    WipeLeft,
    WipeRight,
    WipeUp,
    WipeDown,
    CircleWipe,
    DiamondWipe,
    RotateIn,
    RotateOut,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 17] = [
        Self::Fade,
        Self::Dissolve,
        Self::CrossDissolve,
        Self::ZoomIn,
        Self::ZoomOut,
        Self::SlideLeft,
        Self::SlideRight,
        Self::SlideUp,
        Self::SlideDown,
        Self::WipeLeft,
        Self::WipeRight,
        Self::WipeUp,
        Self::WipeDown,
        Self::CircleWipe,
        Self::DiamondWipe,
        Self::RotateIn,
        Self::RotateOut,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Dissolve => "dissolve",
            Self::CrossDissolve => "cross-dissolve",
            Self::ZoomIn => "zoom-in",
            Self::ZoomOut => "zoom-out",
            Self::SlideLeft => "slide-left",
            Self::SlideRight => "slide-right",
            Self::SlideUp => "slide-up",
            Self::SlideDown => "slide-down",
            Self::WipeLeft => "wipe-left",
            Self::WipeRight => "wipe-right",
            Self::WipeUp => "wipe-up",
            Self::WipeDown => "wipe-down",
            Self::CircleWipe => "circle-wipe",
            Self::DiamondWipe => "diamond-wipe",
            Self::RotateIn => "rotate-in",
            Self::RotateOut => "rotate-out",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transition kind: {0}")]
pub struct UnknownTransition(pub String);

impl FromStr for TransitionKind {
    type Err = UnknownTransition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownTransition(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionPosition {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: Uuid,
    pub clip_id: Uuid,
    pub kind: TransitionKind,
    pub duration: Duration,
    pub position: TransitionPosition,
}

impl Transition {
    pub fn new(clip_id: Uuid, kind: TransitionKind, duration: Duration, position: TransitionPosition) -> Self {
        Self {
            id: Uuid::new_v4(),
            clip_id,
            kind,
            duration,
            position,
        }
    }
}

/// A transition whose window contains the queried local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTransition<'a> {
    pub transition: &'a Transition,
    /// 0.0 (fully hidden) .. 1.0 (fully shown).
    pub progress: f64,
}

/// Finds the transition active at `local_t` seconds into a clip of visible
/// length `clip_len`. The start window wins when both windows overlap.
pub fn transition_progress<'a, I>(clip_len: f64, transitions: I, local_t: f64) -> Option<ActiveTransition<'a>>
where
    I: IntoIterator<Item = &'a Transition>,
{
    let mut start = None;
    let mut end = None;
    for t in transitions {
        match t.position {
            TransitionPosition::Start => start = start.or(Some(t)),
            TransitionPosition::End => end = end.or(Some(t)),
        }
    }

    if let Some(t) = start {
        let d = t.duration.as_secs_f64();
        if d > 0.0 && local_t < d {
            return Some(ActiveTransition {
                transition: t,
                progress: (local_t / d).clamp(0.0, 1.0),
            });
        }
    }
    if let Some(t) = end {
        let d = t.duration.as_secs_f64();
        if d > 0.0 && local_t > clip_len - d {
            return Some(ActiveTransition {
                transition: t,
                progress: ((clip_len - local_t) / d).clamp(0.0, 1.0),
            });
        }
    }
    None
}

/// Geometric operation applied to a layer. Scale and rotate pivot on the
/// frame center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GeometricOp {
    Translate(f64, f64),
    Scale(f64, f64),
    Rotate(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTransform {
    pub alpha: f64,
    pub ops: Vec<GeometricOp>,
    pub clip_region: Option<ClipRegion>,
}

impl Default for RenderTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RenderTransform {
    pub fn identity() -> Self {
        Self {
            alpha: 1.0,
            ops: Vec::new(),
            clip_region: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        (self.alpha - 1.0).abs() < 1e-9
            && self.clip_region.is_none()
            && self.ops.iter().all(|op| match *op {
                GeometricOp::Translate(dx, dy) => dx.abs() < 1e-9 && dy.abs() < 1e-9,
                GeometricOp::Scale(sx, sy) => (sx - 1.0).abs() < 1e-9 && (sy - 1.0).abs() < 1e-9,
                GeometricOp::Rotate(deg) => deg.abs() < 1e-9,
            })
    }

    /// Composes the ops, in order, into a destination-space matrix for a
    /// frame of the given size.
    pub fn to_affine(&self, frame_w: u32, frame_h: u32) -> Affine {
        let (cx, cy) = (frame_w as f64 / 2.0, frame_h as f64 / 2.0);
        let about_center = |m: Affine| {
            Affine::translation(cx, cy)
                .then(&m)
                .then(&Affine::translation(-cx, -cy))
        };
        self.ops.iter().fold(Affine::identity(), |acc, op| {
            let step = match *op {
                GeometricOp::Translate(dx, dy) => Affine::translation(dx, dy),
                GeometricOp::Scale(sx, sy) => about_center(Affine::scaling(sx, sy)),
                GeometricOp::Rotate(deg) => about_center(Affine::rotation_deg(deg)),
            };
            acc.then(&step)
        })
    }

    /// CSS `transform` value for an element sized like the frame the
    /// transform was evaluated for. `transform-origin` is assumed centered.
    pub fn to_css_transform(&self) -> String {
        if self.ops.is_empty() {
            return "none".to_string();
        }
        self.ops
            .iter()
            .map(|op| match *op {
                GeometricOp::Translate(dx, dy) => format!("translate({dx:.2}px, {dy:.2}px)"),
                GeometricOp::Scale(sx, sy) => format!("scale({sx:.4}, {sy:.4})"),
                GeometricOp::Rotate(deg) => format!("rotate({deg:.2}deg)"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// CSS `clip-path` value.
    pub fn to_css_clip_path(&self) -> String {
        match self.clip_region {
            None => "none".to_string(),
            Some(ClipRegion::Rect {
                x,
                y,
                width,
                height,
            }) => format!(
                "polygon({x:.2}px {y:.2}px, {r:.2}px {y:.2}px, {r:.2}px {b:.2}px, {x:.2}px {b:.2}px)",
                r = x + width,
                b = y + height
            ),
            Some(ClipRegion::Circle { cx, cy, radius }) => {
                format!("circle({radius:.2}px at {cx:.2}px {cy:.2}px)")
            }
            Some(ClipRegion::Diamond { cx, cy, radius }) => format!(
                "polygon({cx:.2}px {t:.2}px, {r:.2}px {cy:.2}px, {cx:.2}px {b:.2}px, {l:.2}px {cy:.2}px)",
                t = cy - radius,
                r = cx + radius,
                b = cy + radius,
                l = cx - radius
            ),
        }
    }
}

/// Evaluates a transition at progress `p` for a frame of `w`x`h` pixels.
///
/// End-position transitions continue moving in the named direction, so
/// slide offsets, wipe anchors and rotation signs are mirrored for `End`.
pub fn evaluate(kind: TransitionKind, position: TransitionPosition, p: f64, w: u32, h: u32) -> RenderTransform {
    let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 1.0 };
    if p >= 1.0 {
        return RenderTransform::identity();
    }
    let inv = 1.0 - p;
    let (w, h) = (w as f64, h as f64);
    let sign = match position {
        TransitionPosition::Start => 1.0,
        TransitionPosition::End => -1.0,
    };
    let end = position == TransitionPosition::End;

    let mut out = RenderTransform::identity();
    match kind {
        TransitionKind::Fade | TransitionKind::Dissolve | TransitionKind::CrossDissolve => {
            out.alpha = p;
        }
        TransitionKind::ZoomIn => {
            out.alpha = p;
            out.ops.push(GeometricOp::Scale(p, p));
        }
        TransitionKind::ZoomOut => {
            let s = 1.5 - 0.5 * p;
            out.alpha = p;
            out.ops.push(GeometricOp::Scale(s, s));
        }
        // slide-left enters from the right edge moving left
        TransitionKind::SlideLeft => out.ops.push(GeometricOp::Translate(sign * inv * w, 0.0)),
        TransitionKind::SlideRight => out.ops.push(GeometricOp::Translate(-sign * inv * w, 0.0)),
        TransitionKind::SlideUp => out.ops.push(GeometricOp::Translate(0.0, sign * inv * h)),
        TransitionKind::SlideDown => out.ops.push(GeometricOp::Translate(0.0, -sign * inv * h)),
        TransitionKind::WipeRight => {
            let x = if end { inv * w } else { 0.0 };
            out.clip_region = Some(ClipRegion::Rect {
                x,
                y: 0.0,
                width: p * w,
                height: h,
            });
        }
        TransitionKind::WipeLeft => {
            let x = if end { 0.0 } else { inv * w };
            out.clip_region = Some(ClipRegion::Rect {
                x,
                y: 0.0,
                width: p * w,
                height: h,
            });
        }
        TransitionKind::WipeDown => {
            let y = if end { inv * h } else { 0.0 };
            out.clip_region = Some(ClipRegion::Rect {
                x: 0.0,
                y,
                width: w,
                height: p * h,
            });
        }
        TransitionKind::WipeUp => {
            let y = if end { 0.0 } else { inv * h };
            out.clip_region = Some(ClipRegion::Rect {
                x: 0.0,
                y,
                width: w,
                height: p * h,
            });
        }
        TransitionKind::CircleWipe => {
            let half_diag = (w * w + h * h).sqrt() / 2.0;
            out.clip_region = Some(ClipRegion::Circle {
                cx: w / 2.0,
                cy: h / 2.0,
                radius: p * half_diag,
            });
        }
        TransitionKind::DiamondWipe => {
            // L1 radius needed to cover the corners is w/2 + h/2.
            out.clip_region = Some(ClipRegion::Diamond {
                cx: w / 2.0,
                cy: h / 2.0,
                radius: p * (w + h) / 2.0,
            });
        }
        TransitionKind::RotateIn => {
            out.alpha = p;
            out.ops.push(GeometricOp::Rotate(-sign * inv * 180.0));
            out.ops.push(GeometricOp::Scale(p, p));
        }
        TransitionKind::RotateOut => {
            out.alpha = p;
            out.ops.push(GeometricOp::Rotate(sign * inv * 180.0));
            out.ops.push(GeometricOp::Scale(p, p));
        }
    }
    out
}

/// Windowing plus evaluation. `None` means the layer draws untransformed.
pub fn evaluate_at<'a, I>(clip_len: f64, transitions: I, local_t: f64, w: u32, h: u32) -> Option<RenderTransform>
where
    I: IntoIterator<Item = &'a Transition>,
{
    let active = transition_progress(clip_len, transitions, local_t)?;
    Some(evaluate(
        active.transition.kind,
        active.transition.position,
        active.progress,
        w,
        h,
    ))
}
