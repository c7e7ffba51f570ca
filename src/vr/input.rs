use super::{Pose, Side, TrackedLimb};
use glam::{Quat, Vec3};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Source of tracked limb poses at a predicted display time.
pub trait PoseOracle: Send + Sync {
    fn limb_pose(&self, time: i64, limb: TrackedLimb) -> Pose;
}

/// Hands swaying slowly around a resting position, driven by the display time.
#[derive(Debug, Clone)]
pub struct SimulatedPoseOracle {
    rest: [Vec3; 2],
    sway_meters: f32,
    sway_period_seconds: f64,
}

impl Default for SimulatedPoseOracle {
    fn default() -> Self {
        Self {
            rest: [Vec3::new(-0.25, 1.4, -0.3), Vec3::new(0.25, 1.4, -0.3)],
            sway_meters: 0.05,
            sway_period_seconds: 2.0,
        }
    }
}

impl PoseOracle for SimulatedPoseOracle {
    fn limb_pose(&self, time: i64, limb: TrackedLimb) -> Pose {
        let side = match limb {
            TrackedLimb::LeftHand => Side::Left,
            TrackedLimb::RightHand => Side::Right,
        };
        let seconds = time as f64 / 1_000_000_000.0;
        let phase = (seconds / self.sway_period_seconds * std::f64::consts::TAU).sin() as f32;
        let position = self.rest[side.index()] + Vec3::new(phase * self.sway_meters, 0.0, 0.0);
        Pose::new(position, Quat::from_rotation_y(phase * 0.2))
    }
}

/// Window within which a press counts as short; past it a long press fires.
pub const ACTION_TIME: Duration = Duration::from_millis(666);
/// Magnitude above which an axis action is active.
pub const AXIS_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionInput {
    Button(bool),
    Axis(f32),
}

impl ActionInput {
    fn pressed(self) -> bool {
        match self {
            ActionInput::Button(pressed) => pressed,
            ActionInput::Axis(value) => value.abs() > AXIS_EPSILON,
        }
    }

    fn value(self) -> f32 {
        match self {
            ActionInput::Button(pressed) => {
                if pressed {
                    1.0
                } else {
                    0.0
                }
            }
            ActionInput::Axis(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Fires on release when released inside [`ACTION_TIME`].
    Press,
    /// Fires once when held past [`ACTION_TIME`].
    LongPress,
    /// Active for as long as the button is down.
    Hold,
    /// Active while the axis magnitude exceeds [`AXIS_EPSILON`].
    Axis,
}

impl ActionKind {
    fn is_continuous(self) -> bool {
        matches!(self, ActionKind::Axis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionEvent {
    pub action: &'static str,
    pub kind: ActionKind,
    pub value: f32,
    pub activated: bool,
    pub deactivated: bool,
}

#[derive(Debug, Clone)]
pub struct Action {
    name: &'static str,
    kind: ActionKind,
    pressed: bool,
    deadline: Option<Instant>,
    latched: bool,
    active: bool,
    value: f32,
    previous: f32,
    on_activate: bool,
    on_deactivate: bool,
}

impl Action {
    pub fn new(name: &'static str, kind: ActionKind) -> Self {
        Self {
            name,
            kind,
            pressed: false,
            deadline: None,
            latched: false,
            active: false,
            value: 0.0,
            previous: 0.0,
            on_activate: false,
            on_deactivate: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn previous(&self) -> f32 {
        self.previous
    }

    pub fn on_activate(&self) -> bool {
        self.on_activate
    }

    pub fn on_deactivate(&self) -> bool {
        self.on_deactivate
    }

    /// Samples the input, recomputes activation edges, and reports the
    /// action when it should be dispatched this tick.
    pub fn update(&mut self, input: ActionInput, now: Instant) -> Option<ActionEvent> {
        let was_active = self.active;
        self.previous = self.value;

        match self.kind {
            ActionKind::Press => self.update_press(input, now),
            ActionKind::LongPress => self.update_long_press(input, now),
            ActionKind::Hold => self.update_hold(input),
            ActionKind::Axis => self.update_axis(input),
        }

        let changed = was_active != self.active;
        self.on_activate = changed && self.active;
        self.on_deactivate = changed && !self.active;

        self.should_queue().then(|| ActionEvent {
            action: self.name,
            kind: self.kind,
            value: self.value,
            activated: self.on_activate,
            deactivated: self.on_deactivate,
        })
    }

    pub fn update_and_queue(
        &mut self,
        input: ActionInput,
        now: Instant,
        queue: &mut VecDeque<ActionEvent>,
    ) {
        if let Some(event) = self.update(input, now) {
            queue.push_back(event);
        }
    }

    fn should_queue(&self) -> bool {
        self.on_activate || self.on_deactivate || (self.active && self.kind.is_continuous())
    }

    /// Returns whether the pressed state flipped.
    fn sample_button(&mut self, input: ActionInput) -> bool {
        let old = self.pressed;
        self.pressed = input.pressed();
        old != self.pressed
    }

    fn update_press(&mut self, input: ActionInput, now: Instant) {
        self.active = false;
        let changed = self.sample_button(input);
        if changed && self.pressed {
            self.deadline = Some(now + ACTION_TIME);
        }
        if changed && !self.pressed {
            self.active = self.deadline.is_some_and(|deadline| now < deadline);
        }
        self.value = if self.pressed { 1.0 } else { 0.0 };
    }

    fn update_long_press(&mut self, input: ActionInput, now: Instant) {
        self.active = false;
        let changed = self.sample_button(input);
        if changed && self.pressed {
            self.deadline = Some(now + ACTION_TIME);
            self.latched = false;
        }
        if self.pressed && !self.latched && self.deadline.is_some_and(|deadline| now >= deadline) {
            self.active = true;
            self.latched = true;
            self.value = 1.0;
        }
        if changed && !self.pressed {
            self.value = 0.0;
        }
    }

    fn update_hold(&mut self, input: ActionInput) {
        self.sample_button(input);
        self.active = self.pressed;
        self.value = if self.pressed { 1.0 } else { 0.0 };
    }

    fn update_axis(&mut self, input: ActionInput) {
        self.value = input.value();
        self.active = self.value.abs() > AXIS_EPSILON;
        if !self.active {
            self.value = 0.0;
        }
    }
}
