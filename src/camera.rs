//! Orbit camera
//!
//! Orbits around a target point with eased transitions. The camera never
//! decides the zoom level itself; the session reads `distance()` each frame
//! and lets the store derive the level from it.

use crate::graph::Position;
use crate::store::CameraAnimationRequest;

/// Closest the camera may get to its target
pub const MIN_DISTANCE: f32 = 50.0;

/// Farthest the camera may get from its target
pub const MAX_DISTANCE: f32 = 1000.0;

const LERP_FACTOR: f32 = 0.12;
const EPSILON: f32 = 0.001;
const DEFAULT_PHI: f32 = std::f32::consts::FRAC_PI_4;

/// Camera orbiting a target point
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Point the camera looks at
    pub target: Position,
    distance: f32,
    /// Horizontal angle (azimuth) in radians
    theta: f32,
    /// Vertical angle (elevation) in radians
    phi: f32,

    goal_distance: f32,
    goal_theta: f32,
    goal_phi: f32,
    goal_target: Position,

    is_animating: bool,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(crate::zoom::ZoomLevel::Ecosystem.canonical_distance())
    }
}

impl OrbitCamera {
    pub fn new(distance: f32) -> Self {
        let distance = distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
        Self {
            target: Position::ORIGIN,
            distance,
            theta: 0.0,
            phi: DEFAULT_PHI,
            goal_distance: distance,
            goal_theta: 0.0,
            goal_phi: DEFAULT_PHI,
            goal_target: Position::ORIGIN,
            is_animating: false,
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Distance the current animation is heading to
    pub fn goal_distance(&self) -> f32 {
        self.goal_distance
    }

    pub fn is_animating(&self) -> bool {
        self.is_animating
    }

    /// Start animating toward a store request
    pub fn apply_request(&mut self, request: &CameraAnimationRequest) {
        self.goal_distance = request.distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
        if let Some(target) = request.target {
            self.goal_target = target;
        }
        self.is_animating = true;
    }

    /// Scale the distance, e.g. from a scroll wheel
    pub fn zoom(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.goal_distance = (self.goal_distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.is_animating = true;
    }

    pub fn orbit_horizontal(&mut self, delta: f32) {
        self.goal_theta += delta;
        self.is_animating = true;
    }

    pub fn orbit_vertical(&mut self, delta: f32) {
        // Keep away from the poles
        self.goal_phi = (self.goal_phi + delta).clamp(0.1, std::f32::consts::PI - 0.1);
        self.is_animating = true;
    }

    /// Return to the default orientation around the origin, keeping distance
    pub fn reset_view(&mut self) {
        self.goal_theta = 0.0;
        self.goal_phi = DEFAULT_PHI;
        self.goal_target = Position::ORIGIN;
        self.is_animating = true;
    }

    /// Jump straight to the goal, for reduced motion
    pub fn snap(&mut self) {
        self.distance = self.goal_distance;
        self.theta = self.goal_theta;
        self.phi = self.goal_phi;
        self.target = self.goal_target;
        self.is_animating = false;
    }

    /// Advance one frame; returns `true` while still moving
    pub fn update_animation(&mut self) -> bool {
        let mut moving = false;
        moving |= ease(&mut self.distance, self.goal_distance);
        moving |= ease(&mut self.theta, self.goal_theta);
        moving |= ease(&mut self.phi, self.goal_phi);
        moving |= ease(&mut self.target.x, self.goal_target.x);
        moving |= ease(&mut self.target.y, self.goal_target.y);
        moving |= ease(&mut self.target.z, self.goal_target.z);

        self.is_animating = moving;
        moving
    }

    /// Camera position in world space
    pub fn position(&self) -> Position {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        Position::new(
            self.target.x + self.distance * sin_phi * sin_theta,
            self.target.y + self.distance * cos_phi,
            self.target.z + self.distance * sin_phi * cos_theta,
        )
    }
}

fn ease(value: &mut f32, goal: f32) -> bool {
    if (*value - goal).abs() > EPSILON {
        *value += (goal - *value) * LERP_FACTOR;
        true
    } else {
        *value = goal;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoom::ZoomLevel;

    fn settle(camera: &mut OrbitCamera) -> usize {
        let mut frames = 0;
        while camera.update_animation() {
            frames += 1;
            assert!(frames < 1000, "camera never settled");
        }
        frames
    }

    #[test]
    fn animates_to_requested_distance() {
        let mut camera = OrbitCamera::default();
        camera.apply_request(&CameraAnimationRequest {
            level: ZoomLevel::Hcp,
            distance: 90.0,
            target: Some(Position::new(10.0, 0.0, 0.0)),
        });

        assert!(camera.is_animating());
        assert!(settle(&mut camera) > 1);
        assert_eq!(camera.distance(), 90.0);
        assert_eq!(camera.target, Position::new(10.0, 0.0, 0.0));
        assert!(!camera.is_animating());
    }

    #[test]
    fn distance_decreases_monotonically_while_zooming_in() {
        let mut camera = OrbitCamera::new(600.0);
        camera.zoom(0.5);

        let mut last = camera.distance();
        while camera.update_animation() {
            assert!(camera.distance() <= last);
            last = camera.distance();
        }
        assert_eq!(camera.distance(), 300.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = OrbitCamera::new(100.0);
        camera.zoom(0.01);
        camera.snap();
        assert_eq!(camera.distance(), MIN_DISTANCE);

        camera.zoom(1000.0);
        camera.snap();
        assert_eq!(camera.distance(), MAX_DISTANCE);

        camera.zoom(f32::NAN);
        assert_eq!(camera.goal_distance(), MAX_DISTANCE);
    }

    #[test]
    fn reset_view_recentres_without_changing_distance() {
        let mut camera = OrbitCamera::new(300.0);
        camera.orbit_horizontal(1.0);
        camera.apply_request(&CameraAnimationRequest {
            level: ZoomLevel::Campaign,
            distance: 275.0,
            target: Some(Position::new(5.0, 5.0, 5.0)),
        });
        camera.snap();

        camera.reset_view();
        settle(&mut camera);

        assert_eq!(camera.target, Position::ORIGIN);
        assert_eq!(camera.distance(), 275.0);
    }

    #[test]
    fn position_sits_at_distance_from_target() {
        let camera = OrbitCamera::new(400.0);
        let d = camera.position().distance_to(&camera.target);
        assert!((d - 400.0).abs() < 0.01);
    }
}
