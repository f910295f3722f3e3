//! Wheel Animation Engine.
//!
//! Turns a server-declared winner into a spin that always stops with that
//! player's segment under the pointer at 12 o'clock.
//!
//! The engine is a clock-injected state machine: every input takes the
//! current [`Instant`], and [`WheelEngine::next_deadline`] tells the caller
//! when to call [`WheelEngine::poll`] next. The client's session loop sleeps
//! on that deadline; tests simply pass instants in.
//!
//! ```text
//! Idle ──spin requested──▶ Armed ──winner known + SETTLE_DELAY──▶ Spinning
//!  ▲                         │                                       │
//!  └──── retract / segments changed / desync ◀───────────────────────┤
//!  └──────────────────────── Settled (after SPIN_DURATION) ◀─────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{Result, WheelClientError};
use crate::protocol::Player;

/// Full turns added to every spin before the winner offset.
pub const FULL_ROTATIONS: u32 = 5;

/// Pause between resetting the wheel to 0° and committing the target angle.
///
/// Renderers that batch style changes would otherwise merge the reset and
/// the target into one update and skip the animation.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// How long the wheel turns before it is declared settled.
pub const SPIN_DURATION: Duration = Duration::from_millis(4000);

/// Segment colors, assigned by roster position.
pub const COLOR_PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEEAD", "#D4A5A5", "#9B59B6", "#3498DB",
];

// ── Segments ────────────────────────────────────────────────────────

/// One wedge of the wheel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelSegment {
    pub label: String,
    pub color: &'static str,
}

/// Lay out one segment per player, in roster order.
pub fn segments_for(players: &[Player]) -> Vec<WheelSegment> {
    players
        .iter()
        .zip(COLOR_PALETTE.iter().cycle())
        .map(|(player, color)| WheelSegment {
            label: player.name.clone(),
            color,
        })
        .collect()
}

/// Angular extent of a segment, in degrees clockwise from the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentGeometry {
    pub start_deg: f64,
    pub end_deg: f64,
}

impl SegmentGeometry {
    /// Where the segment's label belongs.
    pub fn center_deg(&self) -> f64 {
        (self.start_deg + self.end_deg) / 2.0
    }
}

/// Geometry of segment `index` on a wheel of `count` segments.
pub fn segment_geometry(index: usize, count: usize) -> Option<SegmentGeometry> {
    if index >= count {
        return None;
    }
    let width = segment_width(count);
    let start_deg = index as f64 * width;
    Some(SegmentGeometry {
        start_deg,
        end_deg: start_deg + width,
    })
}

fn segment_width(count: usize) -> f64 {
    360.0 / count as f64
}

// ── Targeting ───────────────────────────────────────────────────────

/// Absolute rotation, in degrees, that parks the center of segment
/// `winner_index` under the pointer after `full_rotations` whole turns.
///
/// The result is measured from 0°, never from a previous resting angle.
///
/// # Errors
///
/// Returns [`WheelClientError::WinnerOutOfRange`] if `winner_index` is not a
/// valid segment of a `segments`-wedge wheel.
pub fn target_rotation(winner_index: usize, segments: usize, full_rotations: u32) -> Result<f64> {
    if winner_index >= segments {
        return Err(WheelClientError::WinnerOutOfRange {
            index: winner_index,
            segments,
        });
    }
    let width = segment_width(segments);
    let offset = 360.0 - winner_index as f64 * width - width / 2.0;
    Ok(360.0 * f64::from(full_rotations) + offset)
}

/// Which segment sits under the pointer when the wheel is turned by
/// `rotation_deg` clockwise.
pub fn segment_under_pointer(rotation_deg: f64, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let wheel_angle = (360.0 - rotation_deg.rem_euclid(360.0)).rem_euclid(360.0);
    let index = (wheel_angle / segment_width(count)).floor() as usize;
    Some(index.min(count - 1))
}

/// Deceleration curve used while spinning: fast start, gentle stop.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

// ── Engine ──────────────────────────────────────────────────────────

/// Timing knobs. Defaults are [`SETTLE_DELAY`], [`SPIN_DURATION`] and
/// [`FULL_ROTATIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelTiming {
    pub settle_delay: Duration,
    pub spin_duration: Duration,
    pub full_rotations: u32,
}

impl Default for WheelTiming {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            spin_duration: SPIN_DURATION,
            full_rotations: FULL_ROTATIONS,
        }
    }
}

/// Observable engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelPhase {
    /// At rest.
    Idle,
    /// Spin requested; holding at 0° until the winner is known and the
    /// settle delay has passed.
    Armed,
    /// Turning towards the committed target.
    Spinning,
}

/// Why an in-flight cycle was abandoned without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The spin request was withdrawn.
    Retracted,
    /// The roster, and with it the segment layout, changed.
    SegmentsChanged,
    /// A new round began before this one settled.
    Superseded,
    /// The winner does not exist on this wheel.
    WinnerOutOfRange { index: usize, segments: usize },
}

/// Engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum WheelEvent {
    /// Target committed; the wheel is turning.
    SpinStarted {
        winner_index: usize,
        target_rotation: f64,
    },
    /// The spin finished on `winner_index`. The only completion signal.
    Settled { winner_index: usize },
    /// The cycle ended early. Never accompanied by a completion.
    Aborted { reason: AbortReason },
}

/// What a renderer needs to draw the wheel right now.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelView {
    /// The live layout. Any change to it ends an in-flight spin, so while
    /// spinning this is the layout the target was computed against.
    pub segments: Arc<[WheelSegment]>,
    /// Rotation to display, in degrees.
    pub rotation_deg: f64,
    /// Set while spinning: animate towards `rotation_deg` over this long.
    /// `None` means jump straight to `rotation_deg`.
    pub transition: Option<Duration>,
    /// When the current transition began.
    pub spin_started: Option<Instant>,
    pub phase: WheelPhase,
}

impl WheelView {
    /// Rotation to draw at `now`, eased along the active transition.
    pub fn rotation_at(&self, now: Instant) -> f64 {
        let (Some(duration), Some(started)) = (self.transition, self.spin_started) else {
            return self.rotation_deg;
        };
        let duration = duration.as_secs_f64();
        let progress = if duration > 0.0 {
            now.saturating_duration_since(started).as_secs_f64() / duration
        } else {
            1.0
        };
        self.rotation_deg * ease_out_cubic(progress)
    }
}

impl Default for WheelView {
    fn default() -> Self {
        Self {
            segments: Arc::from(Vec::new()),
            rotation_deg: 0.0,
            transition: None,
            spin_started: None,
            phase: WheelPhase::Idle,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Armed {
        commit: Option<(usize, Instant)>,
    },
    Spinning {
        winner_index: usize,
        started: Instant,
        settles_at: Instant,
    },
}

/// The spin state machine.
#[derive(Debug, Clone)]
pub struct WheelEngine {
    timing: WheelTiming,
    segments: Arc<[WheelSegment]>,
    phase: Phase,
    rotation: f64,
}

impl Default for WheelEngine {
    fn default() -> Self {
        Self::new(WheelTiming::default())
    }
}

impl WheelEngine {
    /// Create an idle engine with no segments.
    pub fn new(timing: WheelTiming) -> Self {
        Self {
            timing,
            segments: Arc::from(Vec::new()),
            phase: Phase::Idle,
            rotation: 0.0,
        }
    }

    pub fn timing(&self) -> WheelTiming {
        self.timing
    }

    pub fn phase(&self) -> WheelPhase {
        match self.phase {
            Phase::Idle => WheelPhase::Idle,
            Phase::Armed { .. } => WheelPhase::Armed,
            Phase::Spinning { .. } => WheelPhase::Spinning,
        }
    }

    /// Whether a spin is currently requested (Armed or Spinning).
    pub fn is_spin_requested(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Current rotation: 0° while armed, the target while spinning, the last
    /// resting angle while idle.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// The live segment layout.
    pub fn segments(&self) -> &[WheelSegment] {
        &self.segments
    }

    /// Replace the segment layout. A changed layout aborts any in-flight cycle.
    pub fn set_segments(&mut self, segments: Vec<WheelSegment>) -> Option<WheelEvent> {
        if *self.segments == *segments {
            return None;
        }
        debug!(count = segments.len(), "wheel segments changed");
        self.segments = Arc::from(segments);
        if self.is_spin_requested() {
            return Some(self.abort(AbortReason::SegmentsChanged));
        }
        None
    }

    /// Raise or drop the spin request.
    ///
    /// Raising it while a cycle is already in flight abandons that cycle
    /// (reported as [`AbortReason::Superseded`]) and re-arms from 0°.
    pub fn set_spin_requested(&mut self, requested: bool) -> Option<WheelEvent> {
        if !requested {
            if self.is_spin_requested() {
                return Some(self.abort(AbortReason::Retracted));
            }
            return None;
        }
        let superseded = self
            .is_spin_requested()
            .then(|| self.abort(AbortReason::Superseded));
        self.phase = Phase::Armed { commit: None };
        self.rotation = 0.0;
        debug!("wheel armed");
        superseded
    }

    /// Supply (or withdraw) the server-declared winner.
    ///
    /// Only meaningful while armed; a winner with no spin request is
    /// ignored. An index outside the current layout fails closed: the cycle
    /// aborts and no rotation is applied.
    pub fn resolve_winner(&mut self, winner: Option<usize>, now: Instant) -> Option<WheelEvent> {
        match (&mut self.phase, winner) {
            (Phase::Idle, Some(index)) => {
                debug!(index, "winner arrived with no spin requested; ignoring");
                None
            }
            (Phase::Idle, None) => None,
            (Phase::Armed { commit }, None) => {
                *commit = None;
                None
            }
            (Phase::Armed { commit }, Some(index)) => {
                let segments = self.segments.len();
                if index >= segments {
                    error!(
                        index,
                        segments, "round winner does not fit the wheel layout; aborting spin"
                    );
                    return Some(self.abort(AbortReason::WinnerOutOfRange { index, segments }));
                }
                *commit = Some((index, now + self.timing.settle_delay));
                None
            }
            (Phase::Spinning { winner_index, .. }, _) => {
                debug!(
                    winner_index = *winner_index,
                    "winner update while spinning; ignoring"
                );
                None
            }
        }
    }

    /// When [`poll`](Self::poll) next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::Armed {
                commit: Some((_, at)),
            } => Some(*at),
            Phase::Spinning { settles_at, .. } => Some(*settles_at),
            _ => None,
        }
    }

    /// Advance timers. Returns at most one event per call.
    pub fn poll(&mut self, now: Instant) -> Option<WheelEvent> {
        match &self.phase {
            Phase::Armed {
                commit: Some((winner_index, at)),
            } if now >= *at => {
                let (winner_index, started) = (*winner_index, *at);
                let target = match target_rotation(
                    winner_index,
                    self.segments.len(),
                    self.timing.full_rotations,
                ) {
                    Ok(target) => target,
                    Err(e) => {
                        error!("cannot target winner: {e}");
                        let segments = self.segments.len();
                        return Some(self.abort(AbortReason::WinnerOutOfRange {
                            index: winner_index,
                            segments,
                        }));
                    }
                };
                self.rotation = target;
                self.phase = Phase::Spinning {
                    winner_index,
                    started,
                    settles_at: started + self.timing.spin_duration,
                };
                debug!(winner_index, target, "wheel spinning");
                Some(WheelEvent::SpinStarted {
                    winner_index,
                    target_rotation: target,
                })
            }
            Phase::Spinning {
                winner_index,
                settles_at,
                ..
            } if now >= *settles_at => {
                let winner_index = *winner_index;
                self.phase = Phase::Idle;
                debug!(winner_index, "wheel settled");
                Some(WheelEvent::Settled { winner_index })
            }
            _ => None,
        }
    }

    /// Rotation to draw at `now` for renderers that animate frame by frame.
    pub fn rotation_at(&self, now: Instant) -> f64 {
        self.view().rotation_at(now)
    }

    /// Snapshot for renderers.
    pub fn view(&self) -> WheelView {
        let (transition, spin_started) = match &self.phase {
            Phase::Spinning { started, .. } => (Some(self.timing.spin_duration), Some(*started)),
            _ => (None, None),
        };
        WheelView {
            segments: Arc::clone(&self.segments),
            rotation_deg: self.rotation,
            transition,
            spin_started,
            phase: self.phase(),
        }
    }

    fn abort(&mut self, reason: AbortReason) -> WheelEvent {
        warn!(?reason, "wheel spin aborted");
        self.phase = Phase::Idle;
        self.rotation = 0.0;
        WheelEvent::Aborted { reason }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("p{i}"), format!("P{i}")))
            .collect()
    }

    fn engine_with(n: usize) -> WheelEngine {
        let mut engine = WheelEngine::default();
        assert!(engine.set_segments(segments_for(&players(n))).is_none());
        engine
    }

    #[test]
    fn segments_follow_roster_order_and_cycle_palette() {
        let segs = segments_for(&players(10));
        assert_eq!(segs.len(), 10);
        assert_eq!(segs[0].label, "P0");
        assert_eq!(segs[0].color, "#FF6B6B");
        assert_eq!(segs[7].color, "#3498DB");
        assert_eq!(segs[8].color, segs[0].color);
        assert_eq!(segs[9].label, "P9");
    }

    #[test]
    fn four_segment_target_centers_winner_two() {
        let target = target_rotation(2, 4, FULL_ROTATIONS).unwrap();
        assert!((target - (1800.0 + 135.0)).abs() < EPS);
        // Segment 2 spans 180°..270°; its center must end up at the pointer.
        let center = segment_geometry(2, 4).unwrap().center_deg();
        let at_pointer = (center + target).rem_euclid(360.0);
        assert!(at_pointer.abs() < EPS || (360.0 - at_pointer).abs() < EPS);
        assert_eq!(segment_under_pointer(target, 4), Some(2));
    }

    #[test]
    fn every_winner_lands_under_the_pointer() {
        for n in 1..=12 {
            for winner in 0..n {
                let target = target_rotation(winner, n, FULL_ROTATIONS).unwrap();
                assert_eq!(segment_under_pointer(target, n), Some(winner), "n={n}");
                assert!(target >= 360.0 * f64::from(FULL_ROTATIONS));
                assert!(target <= 360.0 * f64::from(FULL_ROTATIONS + 1));
            }
        }
    }

    #[test]
    fn targeting_is_idempotent_modulo_full_turns() {
        let a = target_rotation(1, 3, 5).unwrap();
        let b = target_rotation(1, 3, 5).unwrap();
        let c = target_rotation(1, 3, 9).unwrap();
        assert_eq!(a, b);
        assert!((a.rem_euclid(360.0) - c.rem_euclid(360.0)).abs() < EPS);
        assert!((c - a - 4.0 * 360.0).abs() < EPS);
    }

    #[test]
    fn out_of_range_winner_is_an_error() {
        assert!(matches!(
            target_rotation(4, 4, 5),
            Err(WheelClientError::WinnerOutOfRange {
                index: 4,
                segments: 4
            })
        ));
        assert!(target_rotation(0, 0, 5).is_err());
        assert!(segment_under_pointer(10.0, 0).is_none());
    }

    #[test]
    fn full_cycle_reports_settled_winner() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);

        assert!(engine.set_spin_requested(true).is_none());
        assert_eq!(engine.phase(), WheelPhase::Armed);
        assert_eq!(engine.rotation(), 0.0);
        assert!(engine.next_deadline().is_none());

        assert!(engine.resolve_winner(Some(2), t0).is_none());
        assert_eq!(engine.next_deadline(), Some(t0 + SETTLE_DELAY));
        // Still held at 0° until the settle delay passes.
        assert!(engine.poll(t0 + Duration::from_millis(10)).is_none());
        assert_eq!(engine.rotation(), 0.0);

        let (winner_index, target_rotation) = match engine.poll(t0 + SETTLE_DELAY) {
            Some(WheelEvent::SpinStarted {
                winner_index,
                target_rotation,
            }) => (winner_index, target_rotation),
            other => panic!("expected SpinStarted, got {other:?}"),
        };
        assert_eq!(winner_index, 2);
        assert_eq!(engine.phase(), WheelPhase::Spinning);
        assert_eq!(engine.view().transition, Some(SPIN_DURATION));
        assert_eq!(engine.rotation(), target_rotation);

        let settle_at = t0 + SETTLE_DELAY + SPIN_DURATION;
        assert_eq!(engine.next_deadline(), Some(settle_at));
        assert!(engine.poll(settle_at - Duration::from_millis(1)).is_none());
        assert_eq!(
            engine.poll(settle_at),
            Some(WheelEvent::Settled { winner_index: 2 })
        );
        assert_eq!(engine.phase(), WheelPhase::Idle);
        // Resting angle is held after settling.
        assert_eq!(engine.rotation(), target_rotation);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn winner_without_spin_request_stays_idle() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        assert!(engine.resolve_winner(Some(1), t0).is_none());
        assert_eq!(engine.phase(), WheelPhase::Idle);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn out_of_range_winner_fails_closed() {
        let t0 = Instant::now();
        let mut engine = engine_with(3);
        engine.set_spin_requested(true);
        let event = engine.resolve_winner(Some(3), t0);
        assert_eq!(
            event,
            Some(WheelEvent::Aborted {
                reason: AbortReason::WinnerOutOfRange {
                    index: 3,
                    segments: 3
                }
            })
        );
        assert_eq!(engine.phase(), WheelPhase::Idle);
        assert_eq!(engine.rotation(), 0.0);
        assert!(engine.poll(t0 + SPIN_DURATION * 2).is_none());
    }

    #[test]
    fn retracting_spin_aborts_without_completion() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(0), t0);
        engine.poll(t0 + SETTLE_DELAY).unwrap();
        assert_eq!(
            engine.set_spin_requested(false),
            Some(WheelEvent::Aborted {
                reason: AbortReason::Retracted
            })
        );
        assert!(engine.poll(t0 + SETTLE_DELAY + SPIN_DURATION).is_none());
        assert!(engine.set_spin_requested(false).is_none());
    }

    #[test]
    fn segment_change_while_armed_aborts() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(3), t0);
        let event = engine.set_segments(segments_for(&players(3)));
        assert_eq!(
            event,
            Some(WheelEvent::Aborted {
                reason: AbortReason::SegmentsChanged
            })
        );
        assert!(engine.poll(t0 + SETTLE_DELAY).is_none());
    }

    #[test]
    fn identical_segments_do_not_disturb_a_spin() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(1), t0);
        engine.poll(t0 + SETTLE_DELAY).unwrap();
        assert!(engine.set_segments(segments_for(&players(4))).is_none());
        assert_eq!(engine.phase(), WheelPhase::Spinning);
    }

    #[test]
    fn roster_change_mid_spin_aborts_instead_of_retargeting() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(1), t0);
        engine.poll(t0 + SETTLE_DELAY).unwrap();
        let view = engine.view();
        assert_eq!(view.segments.len(), 4);
        assert_eq!(view.phase, WheelPhase::Spinning);
        // A roster change mid-spin aborts rather than retargets.
        let event = engine.set_segments(segments_for(&players(2)));
        assert!(matches!(event, Some(WheelEvent::Aborted { .. })));
        assert_eq!(engine.view().segments.len(), 2);
        assert_eq!(engine.view().rotation_deg, 0.0);
    }

    #[test]
    fn new_round_mid_spin_supersedes_and_rearms() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(1), t0);
        engine.poll(t0 + SETTLE_DELAY).unwrap();
        assert_eq!(
            engine.set_spin_requested(true),
            Some(WheelEvent::Aborted {
                reason: AbortReason::Superseded
            })
        );
        assert_eq!(engine.phase(), WheelPhase::Armed);
        assert_eq!(engine.rotation(), 0.0);
    }

    #[test]
    fn each_round_targets_from_zero() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        let mut now = t0;
        let mut targets = Vec::new();
        for winner in [3, 3] {
            engine.set_spin_requested(true);
            engine.resolve_winner(Some(winner), now);
            now += SETTLE_DELAY;
            if let Some(WheelEvent::SpinStarted {
                target_rotation, ..
            }) = engine.poll(now)
            {
                targets.push(target_rotation);
            }
            now += SPIN_DURATION;
            assert!(engine.poll(now).is_some());
        }
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], targets[1]);
    }

    #[test]
    fn withdrawn_winner_returns_to_waiting() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(1), t0);
        engine.resolve_winner(None, t0);
        assert!(engine.next_deadline().is_none());
        assert_eq!(engine.phase(), WheelPhase::Armed);
    }

    #[test]
    fn rotation_eases_towards_target() {
        let t0 = Instant::now();
        let mut engine = engine_with(4);
        engine.set_spin_requested(true);
        engine.resolve_winner(Some(0), t0);
        engine.poll(t0 + SETTLE_DELAY).unwrap();
        let start = t0 + SETTLE_DELAY;
        let target = engine.rotation();
        assert_eq!(engine.rotation_at(start), 0.0);
        let half = engine.rotation_at(start + SPIN_DURATION / 2);
        assert!(half > target / 2.0 && half < target);
        assert!((engine.rotation_at(start + SPIN_DURATION) - target).abs() < EPS);
    }

    #[test]
    fn ease_out_is_clamped() {
        assert_eq!(ease_out_cubic(-1.0), 0.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < EPS);
    }

    #[test]
    fn geometry_splits_circle_evenly() {
        let g = segment_geometry(1, 3).unwrap();
        assert!((g.start_deg - 120.0).abs() < EPS);
        assert!((g.end_deg - 240.0).abs() < EPS);
        assert!((g.center_deg() - 180.0).abs() < EPS);
        assert!(segment_geometry(3, 3).is_none());
    }
}
