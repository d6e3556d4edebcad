//! Inertial scroll animation

use std::time::Duration;

use super::types::PointF;

/// Minimum drag distance on either axis for a release to fling
pub const FLING_MIN_DISTANCE: f32 = 100.0;
/// Minimum release velocity (px/s) on either axis for a release to fling
pub const FLING_MIN_VELOCITY: f32 = 500.0;
/// Fraction of the release velocity (px/s) travelled by a fling
pub const FLING_VELOCITY_FACTOR: f32 = 0.75;

/// Whether a release with this drag and velocity should fling
#[must_use]
pub fn should_fling(drag: PointF, velocity: PointF) -> bool {
    (drag.x.abs() > FLING_MIN_DISTANCE || drag.y.abs() > FLING_MIN_DISTANCE)
        && (velocity.x.abs() > FLING_MIN_VELOCITY || velocity.y.abs() > FLING_MIN_VELOCITY)
}

/// Animation length for a fling travelling `distance`
#[must_use]
pub fn fling_duration(distance: PointF) -> Duration {
    let millis = (distance.x.abs().max(distance.y.abs()) / 20.0) as u64;
    let millis = match millis {
        0..100 => 400,
        100..600 => 600,
        m => m,
    };
    Duration::from_millis(millis)
}

/// Decelerating easing curve on `[0, 1]`
#[must_use]
pub fn decelerate(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// A running fling from one translation to another
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlingAnimation {
    from: PointF,
    to: PointF,
    started_at: Duration,
    duration: Duration,
}

impl FlingAnimation {
    /// Animate from `from` to the already clamped target `to`
    #[must_use]
    pub fn new(from: PointF, to: PointF, started_at: Duration) -> Self {
        let distance = PointF::new(to.x - from.x, to.y - from.y);
        Self {
            from,
            to,
            started_at,
            duration: fling_duration(distance),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Translation at `now`, and whether the animation has finished
    #[must_use]
    pub fn value_at(&self, now: Duration) -> (PointF, bool) {
        let elapsed = now.saturating_sub(self.started_at);
        if elapsed >= self.duration {
            return (self.to, true);
        }
        let f = decelerate(elapsed.as_secs_f32() / self.duration.as_secs_f32());
        (
            PointF::new(
                self.from.x + (self.to.x - self.from.x) * f,
                self.from.y + (self.to.y - self.from.y) * f,
            ),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bands_are_literal() {
        let ms = |d: f32| fling_duration(PointF::new(0.0, d)).as_millis();
        assert_eq!(ms(0.0), 400);
        assert_eq!(ms(1980.0), 400);
        // 100ms starts the second band
        assert_eq!(ms(2000.0), 600);
        assert_eq!(ms(11_980.0), 600);
        assert_eq!(ms(12_000.0), 600);
        assert_eq!(ms(12_020.0), 601);
        assert_eq!(ms(-20_000.0), 1000);
        assert_eq!(fling_duration(PointF::new(30_000.0, 100.0)).as_millis(), 1500);
    }

    #[test]
    fn fling_requires_distance_and_speed() {
        assert!(should_fling(PointF::new(0.0, 150.0), PointF::new(0.0, 800.0)));
        assert!(!should_fling(PointF::new(0.0, 50.0), PointF::new(0.0, 800.0)));
        assert!(!should_fling(PointF::new(0.0, 150.0), PointF::new(0.0, 300.0)));
        assert!(should_fling(PointF::new(-150.0, 0.0), PointF::new(0.0, -900.0)));
    }

    #[test]
    fn easing_decelerates() {
        assert_eq!(decelerate(0.0), 0.0);
        assert_eq!(decelerate(1.0), 1.0);
        assert_eq!(decelerate(0.5), 0.75);
        assert!(decelerate(0.25) - decelerate(0.0) > decelerate(1.0) - decelerate(0.75));
    }

    #[test]
    fn animation_interpolates_and_finishes() {
        let start = Duration::from_millis(1000);
        let anim = FlingAnimation::new(PointF::new(0.0, 0.0), PointF::new(0.0, -400.0), start);
        assert_eq!(anim.duration(), Duration::from_millis(400));

        let (mid, done) = anim.value_at(start + Duration::from_millis(200));
        assert!(!done);
        assert_eq!(mid, PointF::new(0.0, -300.0));

        let (end, done) = anim.value_at(start + Duration::from_millis(450));
        assert!(done);
        assert_eq!(end, PointF::new(0.0, -400.0));
    }
}
