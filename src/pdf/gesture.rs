//! Pointer input to transform updates
//!
//! A single pointer pans; a second pointer starts a pinch anchored at the
//! centroid of the two fingers. Releasing a fast single-pointer drag reports a
//! fling velocity; the viewer owns the animation itself.

use std::collections::VecDeque;
use std::time::Duration;

use super::fling::should_fling;
use super::types::PointF;
use super::zoom::{Extents, ScaleBounds, Transform};

/// Samples older than this before the latest one are ignored for velocity
const VELOCITY_HORIZON: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerAction {
    /// First pointer touched down
    Down,
    /// An additional pointer touched down
    PointerDown,
    Move,
    /// A pointer lifted while others remain
    PointerUp,
    /// Last pointer lifted
    Up,
    /// Host aborted the gesture
    Cancel,
}

/// One input event with the positions of every active pointer, primary first
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub pointers: Vec<PointF>,
    /// Monotonic timestamp
    pub time: Duration,
}

impl PointerEvent {
    #[must_use]
    pub fn new(action: PointerAction, pointers: Vec<PointF>, time: Duration) -> Self {
        Self {
            action,
            pointers,
            time,
        }
    }

    #[must_use]
    pub fn single(action: PointerAction, at: PointF, time: Duration) -> Self {
        Self::new(action, vec![at], time)
    }

    fn primary(&self) -> Option<PointF> {
        self.pointers.first().copied()
    }

    fn pair(&self) -> Option<(PointF, PointF)> {
        match self.pointers.as_slice() {
            [a, b, ..] => Some((*a, *b)),
            _ => None,
        }
    }
}

/// Touch cardinality of the current gesture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TouchMode {
    #[default]
    Idle,
    Single,
    Multi,
}

/// State captured when a pinch starts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinchSnapshot {
    pub start_distance: f32,
    pub start_scale: f32,
    pub start_translate: PointF,
    pub start_center: PointF,
}

impl PinchSnapshot {
    /// Transform for the current finger positions, keeping the content point
    /// that was under the starting centroid under the current centroid
    #[must_use]
    pub fn transform_for(
        &self,
        a: PointF,
        b: PointF,
        bounds: &ScaleBounds,
        extents: &Extents,
    ) -> Transform {
        let scale = bounds.clamp(a.distance(b) / self.start_distance * self.start_scale);
        let center = a.midpoint(b);
        let ratio = scale / self.start_scale;
        let anchor = PointF::new(
            (self.start_center.x - self.start_translate.x) * ratio,
            (self.start_center.y - self.start_translate.y) * ratio,
        );
        let mut transform = Transform::new(scale, PointF::default());
        transform.set_translation(PointF::new(center.x - anchor.x, center.y - anchor.y), extents);
        transform
    }
}

/// Release velocity estimate from recent pointer samples
#[derive(Clone, Debug, Default)]
pub struct VelocityTracker {
    samples: VecDeque<(Duration, PointF)>,
}

impl VelocityTracker {
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn add(&mut self, time: Duration, position: PointF) {
        self.samples.push_back((time, position));
        while let Some(&(oldest, _)) = self.samples.front() {
            if time.saturating_sub(oldest) > VELOCITY_HORIZON {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pixels per second over the retained samples
    #[must_use]
    pub fn velocity(&self) -> PointF {
        let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.samples.front(), self.samples.back()) else {
            return PointF::default();
        };
        let dt = t1.saturating_sub(t0).as_secs_f32();
        if dt <= 0.0 {
            return PointF::default();
        }
        PointF::new((p1.x - p0.x) / dt, (p1.y - p0.y) / dt)
    }
}

/// What an event did to the gesture
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureOutcome {
    /// A new touch sequence or pinch began
    Started,
    /// The transform changed
    Moved,
    /// All pointers lifted; `fling` carries the release velocity when fast enough
    Released { fling: Option<PointF> },
    Ignored,
}

/// Turns pointer events into transform changes
#[derive(Debug)]
pub struct GestureController {
    mode: TouchMode,
    zoom_enabled: bool,
    pinch: Option<PinchSnapshot>,
    down_at: Option<PointF>,
    last: Option<PointF>,
    velocity: VelocityTracker,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl GestureController {
    #[must_use]
    pub fn new(zoom_enabled: bool) -> Self {
        Self {
            mode: TouchMode::Idle,
            zoom_enabled,
            pinch: None,
            down_at: None,
            last: None,
            velocity: VelocityTracker::default(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> TouchMode {
        self.mode
    }

    #[must_use]
    pub fn zoom_enabled(&self) -> bool {
        self.zoom_enabled
    }

    pub fn set_zoom_enabled(&mut self, enabled: bool) {
        self.zoom_enabled = enabled;
        if !enabled {
            self.pinch = None;
        }
    }

    /// Apply one event to `transform`
    pub fn on_event(
        &mut self,
        event: &PointerEvent,
        transform: &mut Transform,
        bounds: &ScaleBounds,
        extents: &Extents,
    ) -> GestureOutcome {
        match event.action {
            PointerAction::Down => {
                let Some(at) = event.primary() else {
                    return GestureOutcome::Ignored;
                };
                self.mode = TouchMode::Single;
                self.pinch = None;
                self.down_at = Some(at);
                self.last = Some(at);
                self.velocity.clear();
                self.velocity.add(event.time, at);
                GestureOutcome::Started
            }
            PointerAction::PointerDown => {
                self.mode = TouchMode::Multi;
                self.pinch = None;
                if self.zoom_enabled {
                    self.pinch = event.pair().and_then(|(a, b)| {
                        let start_distance = a.distance(b);
                        (start_distance > 0.0).then(|| PinchSnapshot {
                            start_distance,
                            start_scale: transform.scale,
                            start_translate: transform.translate,
                            start_center: a.midpoint(b),
                        })
                    });
                }
                GestureOutcome::Started
            }
            PointerAction::Move => match self.mode {
                TouchMode::Single => self.pan(event, transform, extents),
                TouchMode::Multi => self.zoom(event, transform, bounds, extents),
                TouchMode::Idle => GestureOutcome::Ignored,
            },
            PointerAction::PointerUp => {
                // Pinch stays in multi mode until every finger lifts
                self.pinch = None;
                GestureOutcome::Ignored
            }
            PointerAction::Up | PointerAction::Cancel => self.release(event),
        }
    }

    fn pan(
        &mut self,
        event: &PointerEvent,
        transform: &mut Transform,
        extents: &Extents,
    ) -> GestureOutcome {
        let (Some(at), Some(last)) = (event.primary(), self.last) else {
            return GestureOutcome::Ignored;
        };
        self.last = Some(at);
        self.velocity.add(event.time, at);
        let before = transform.translate;
        transform.pan_by(at.x - last.x, at.y - last.y, extents);
        if transform.translate == before {
            GestureOutcome::Ignored
        } else {
            GestureOutcome::Moved
        }
    }

    fn zoom(
        &mut self,
        event: &PointerEvent,
        transform: &mut Transform,
        bounds: &ScaleBounds,
        extents: &Extents,
    ) -> GestureOutcome {
        let (Some(pinch), Some((a, b))) = (self.pinch, event.pair()) else {
            return GestureOutcome::Ignored;
        };
        *transform = pinch.transform_for(a, b, bounds, extents);
        GestureOutcome::Moved
    }

    fn release(&mut self, event: &PointerEvent) -> GestureOutcome {
        let mode = std::mem::take(&mut self.mode);
        self.pinch = None;
        let last = self.last.take();
        let down_at = self.down_at.take();

        let fling = match (mode, event.action, down_at) {
            (TouchMode::Single, PointerAction::Up, Some(down)) => {
                let up = event.primary().or(last).unwrap_or(down);
                self.velocity.add(event.time, up);
                let velocity = self.velocity.velocity();
                let drag = PointF::new(up.x - down.x, up.y - down.y);
                should_fling(drag, velocity).then_some(velocity)
            }
            _ => None,
        };
        self.velocity.clear();

        match mode {
            TouchMode::Idle => GestureOutcome::Ignored,
            _ => GestureOutcome::Released { fling },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extents() -> Extents {
        Extents {
            content_width: 300.0,
            content_height: 1216.0,
            viewport_width: 300.0,
            viewport_height: 500.0,
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn at(x: f32, y: f32) -> PointF {
        PointF::new(x, y)
    }

    #[test]
    fn drag_pans_by_pointer_delta() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::single(PointerAction::Down, at(100.0, 300.0), ms(0)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(g.mode(), TouchMode::Single);
        let outcome = g.on_event(
            &PointerEvent::single(PointerAction::Move, at(100.0, 250.0), ms(16)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(outcome, GestureOutcome::Moved);
        assert_eq!(t.translate, at(0.0, -50.0));
    }

    #[test]
    fn slow_release_does_not_fling() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::single(PointerAction::Down, at(0.0, 400.0), ms(0)),
            &mut t,
            &b,
            &e,
        );
        for step in 1..=20_u64 {
            let y = 400.0 - step as f32 * 10.0;
            g.on_event(
                &PointerEvent::single(PointerAction::Move, at(0.0, y), ms(step * 100)),
                &mut t,
                &b,
                &e,
            );
        }
        let outcome = g.on_event(
            &PointerEvent::single(PointerAction::Up, at(0.0, 200.0), ms(2100)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(outcome, GestureOutcome::Released { fling: None });
        assert_eq!(g.mode(), TouchMode::Idle);
    }

    #[test]
    fn fast_release_reports_fling_velocity() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::single(PointerAction::Down, at(0.0, 400.0), ms(0)),
            &mut t,
            &b,
            &e,
        );
        g.on_event(
            &PointerEvent::single(PointerAction::Move, at(0.0, 300.0), ms(50)),
            &mut t,
            &b,
            &e,
        );
        let outcome = g.on_event(
            &PointerEvent::single(PointerAction::Up, at(0.0, 200.0), ms(100)),
            &mut t,
            &b,
            &e,
        );

        let GestureOutcome::Released { fling: Some(v) } = outcome else {
            panic!("expected fling, got {outcome:?}");
        };
        assert_eq!(v.x, 0.0);
        assert!((v.y + 2000.0).abs() < 0.01);
    }

    #[test]
    fn pinch_doubles_scale_around_centroid() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::single(PointerAction::Down, at(100.0, 250.0), ms(0)),
            &mut t,
            &b,
            &e,
        );
        g.on_event(
            &PointerEvent::new(
                PointerAction::PointerDown,
                vec![at(100.0, 250.0), at(200.0, 250.0)],
                ms(10),
            ),
            &mut t,
            &b,
            &e,
        );
        let content_before = t.to_layout(at(150.0, 250.0));

        g.on_event(
            &PointerEvent::new(
                PointerAction::Move,
                vec![at(50.0, 250.0), at(250.0, 250.0)],
                ms(30),
            ),
            &mut t,
            &b,
            &e,
        );

        assert_eq!(t.scale, 2.0);
        assert_eq!(t.to_screen(content_before), at(150.0, 250.0));
    }

    #[test]
    fn pinch_scale_is_clamped() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::new(
                PointerAction::PointerDown,
                vec![at(140.0, 250.0), at(160.0, 250.0)],
                ms(0),
            ),
            &mut t,
            &b,
            &e,
        );
        g.on_event(
            &PointerEvent::new(PointerAction::Move, vec![at(0.0, 250.0), at(300.0, 250.0)], ms(10)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(t.scale, 10.0);

        g.on_event(
            &PointerEvent::new(
                PointerAction::Move,
                vec![at(149.0, 250.0), at(151.0, 250.0)],
                ms(20),
            ),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(t.scale, 1.0);
    }

    #[test]
    fn zoom_disabled_ignores_pinch() {
        let mut g = GestureController::new(false);
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::new(
                PointerAction::PointerDown,
                vec![at(100.0, 250.0), at(200.0, 250.0)],
                ms(0),
            ),
            &mut t,
            &b,
            &e,
        );
        let outcome = g.on_event(
            &PointerEvent::new(PointerAction::Move, vec![at(0.0, 250.0), at(300.0, 250.0)], ms(10)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(outcome, GestureOutcome::Ignored);
        assert_eq!(t.scale, 1.0);
    }

    #[test]
    fn pinch_release_never_flings() {
        let mut g = GestureController::default();
        let mut t = Transform::default();
        let (b, e) = (ScaleBounds::default(), extents());

        g.on_event(
            &PointerEvent::single(PointerAction::Down, at(100.0, 250.0), ms(0)),
            &mut t,
            &b,
            &e,
        );
        g.on_event(
            &PointerEvent::new(
                PointerAction::PointerDown,
                vec![at(100.0, 250.0), at(200.0, 250.0)],
                ms(5),
            ),
            &mut t,
            &b,
            &e,
        );
        g.on_event(
            &PointerEvent::single(PointerAction::PointerUp, at(100.0, 250.0), ms(10)),
            &mut t,
            &b,
            &e,
        );
        let outcome = g.on_event(
            &PointerEvent::single(PointerAction::Up, at(100.0, 0.0), ms(15)),
            &mut t,
            &b,
            &e,
        );
        assert_eq!(outcome, GestureOutcome::Released { fling: None });
    }
}
