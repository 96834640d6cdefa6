//! First-person camera, perspective projection and keyboard controller.

use cgmath::{Deg, InnerSpace, Matrix3, Matrix4, Point3, Rad, Vector2, Vector3, perspective};
use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::config::{CameraConfig, ProjectionConfig};

/// Degrees of rotation per pixel of mouse movement.
pub const DEFAULT_SENSITIVITY: f32 = 0.2;

/// Pitches that would bring the view within this angle of the up vector are skipped.
const MIN_PITCH_ANGLE: Deg<f32> = Deg(1.0);

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub view_direction: Vector3<f32>,
    pub up: Vector3<f32>,
    pub sensitivity: f32,
    last_mouse: Option<Vector2<f32>>,
}

impl Default for Camera {
    /// At the origin looking down -z.
    fn default() -> Self {
        Self {
            eye: Point3::new(0.0, 0.0, 0.0),
            view_direction: Vector3::new(0.0, 0.0, -1.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            sensitivity: DEFAULT_SENSITIVITY,
            last_mouse: None,
        }
    }
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(eye: P) -> Self {
        Self {
            eye: eye.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            sensitivity: config.sensitivity,
            ..Self::new(config.eye)
        }
    }

    /// Turn the camera by the mouse movement since the last call. The first
    /// call only records the position.
    pub fn mouse_look(&mut self, x: f32, y: f32) {
        let position = Vector2::new(x, y);
        let old = self.last_mouse.replace(position).unwrap_or(position);
        let delta = (old - position) * self.sensitivity;

        let yaw = Matrix3::from_axis_angle(self.up.normalize(), Deg(delta.x));
        self.view_direction = yaw * self.view_direction;

        let right = self.view_direction.cross(self.up);
        if right.magnitude2() <= f32::EPSILON {
            log::warn!("view direction is parallel to the up vector, skipping pitch");
            return;
        }
        let pitch = Matrix3::from_axis_angle(right.normalize(), Deg(delta.y));
        let pitched = pitch * self.view_direction;
        let angle: Deg<f32> = pitched.angle(self.up).into();
        if angle < MIN_PITCH_ANGLE || angle > Deg(180.0) - MIN_PITCH_ANGLE {
            return;
        }
        self.view_direction = pitched;
    }

    /// Forget the last mouse position, e.g. after the cursor re-entered the window.
    pub fn reset_mouse(&mut self) {
        self.last_mouse = None;
    }

    pub fn move_forward(&mut self, speed: f32) {
        self.eye += self.view_direction * speed;
    }

    pub fn move_backward(&mut self, speed: f32) {
        self.eye -= self.view_direction * speed;
    }

    pub fn move_left(&mut self, speed: f32) {
        self.eye -= self.strafe_direction() * speed;
    }

    pub fn move_right(&mut self, speed: f32) {
        self.eye += self.strafe_direction() * speed;
    }

    pub fn move_up(&mut self, speed: f32) {
        self.eye.y += speed;
    }

    pub fn move_down(&mut self, speed: f32) {
        self.eye.y -= speed;
    }

    fn strafe_direction(&self) -> Vector3<f32> {
        let right = self.view_direction.cross(self.up);
        Vector3::new(right.x, 0.0, right.z)
    }

    pub fn set_eye_position(&mut self, x: f32, y: f32, z: f32) {
        self.eye = Point3::new(x, y, z);
    }

    /// Right-handed look-at from the eye along the view direction.
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye, self.eye + self.view_direction, self.up)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    width: u32,
    height: u32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self::from_config(1280, 720, &ProjectionConfig::default())
    }
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            width,
            height,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn from_config(width: u32, height: u32, config: &ProjectionConfig) -> Self {
        Self::new(width, height, Deg(config.fovy_degrees), config.znear, config.zfar)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Width over height. A zero height (minimized window) counts as 1.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// OpenGL-convention perspective matrix (clip z in -w..w).
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        perspective(self.fovy, self.aspect(), self.znear, self.zfar)
    }
}

/// Keyboard movement: arrows move, Shift rises, Ctrl sinks.
#[derive(Clone, Debug, Default)]
pub struct CameraController {
    speed: f32,
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

impl CameraController {
    /// `speed` is the distance moved per update while a key is held.
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            ..Default::default()
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Returns whether the key is a movement key.
    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) -> bool {
        let pressed = state == ElementState::Pressed;
        match key {
            KeyCode::ArrowUp => self.forward = pressed,
            KeyCode::ArrowDown => self.backward = pressed,
            KeyCode::ArrowLeft => self.left = pressed,
            KeyCode::ArrowRight => self.right = pressed,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => self.up = pressed,
            KeyCode::ControlLeft | KeyCode::ControlRight => self.down = pressed,
            _ => return false,
        }
        true
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => self.process_keyboard(*key, *state),
            WindowEvent::Focused(false) => {
                *self = Self::new(self.speed);
                false
            }
            _ => false,
        }
    }

    pub fn update_camera(&self, camera: &mut Camera) {
        if self.forward {
            camera.move_forward(self.speed);
        }
        if self.backward {
            camera.move_backward(self.speed);
        }
        if self.left {
            camera.move_left(self.speed);
        }
        if self.right {
            camera.move_right(self.speed);
        }
        if self.up {
            camera.move_up(self.speed);
        }
        if self.down {
            camera.move_down(self.speed);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use cgmath::Vector4;

    use super::*;

    #[test]
    fn first_mouse_look_only_records_the_position() {
        let mut camera = Camera::default();
        camera.mouse_look(400.0, 300.0);
        assert_eq!(camera.view_direction, Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn mouse_look_yaws_by_sensitivity_degrees() {
        let mut camera = Camera::default();
        camera.mouse_look(100.0, 0.0);
        // moving left by 450 px turns left by 90 degrees
        camera.mouse_look(-350.0, 0.0);
        assert_abs_diff_eq!(
            camera.view_direction,
            Vector3::new(-1.0, 0.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn mouse_look_pitches_around_the_right_vector() {
        let mut camera = Camera::default();
        camera.mouse_look(0.0, 0.0);
        camera.mouse_look(0.0, 150.0);
        // 30 degrees down
        let expected = Vector3::new(0.0, -0.5, -(3.0f32.sqrt() / 2.0));
        assert_abs_diff_eq!(camera.view_direction, expected, epsilon = 1e-5);
    }

    #[test]
    fn pitch_never_reaches_the_up_vector() {
        let mut camera = Camera::default();
        camera.mouse_look(0.0, 0.0);
        camera.mouse_look(0.0, -450.0);
        let angle: Deg<f32> = camera.view_direction.angle(camera.up).into();
        assert!(angle >= MIN_PITCH_ANGLE, "{angle:?}");
        assert_abs_diff_eq!(camera.view_direction, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn strafing_stays_horizontal() {
        let mut camera = Camera::default();
        camera.view_direction = Vector3::new(0.0, -0.6, -0.8);
        camera.move_right(2.0);
        assert_relative_eq!(camera.eye, Point3::new(1.6, 0.0, 0.0), epsilon = 1e-6);
        camera.move_up(1.0);
        camera.move_down(0.25);
        assert_relative_eq!(camera.eye.y, 0.75);
    }

    #[test]
    fn view_matrix_looks_along_the_view_direction() {
        let mut camera = Camera::default();
        camera.set_eye_position(0.0, 0.5, 5.0);
        let p = camera.view_matrix() * Vector4::new(0.0, 0.5, 0.0, 1.0);
        assert_relative_eq!(p, Vector4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn projection_aspect_and_resize() {
        let mut projection = Projection::new(800, 600, Deg(45.0), 0.1, 512.0);
        assert_relative_eq!(projection.aspect(), 800.0 / 600.0);
        projection.resize(100, 0);
        assert_relative_eq!(projection.aspect(), 100.0);
        assert_eq!(projection.size(), (100, 0));
    }

    #[test]
    fn controller_moves_while_keys_are_held() {
        let mut controller = CameraController::new(0.5);
        let mut camera = Camera::default();
        assert!(controller.process_keyboard(KeyCode::ArrowUp, ElementState::Pressed));
        assert!(controller.process_keyboard(KeyCode::ShiftLeft, ElementState::Pressed));
        assert!(!controller.process_keyboard(KeyCode::KeyQ, ElementState::Pressed));
        controller.update_camera(&mut camera);
        controller.update_camera(&mut camera);
        assert_relative_eq!(camera.eye, Point3::new(0.0, 1.0, -1.0));

        controller.process_keyboard(KeyCode::ArrowUp, ElementState::Released);
        controller.process_keyboard(KeyCode::ShiftLeft, ElementState::Released);
        controller.update_camera(&mut camera);
        assert_relative_eq!(camera.eye, Point3::new(0.0, 1.0, -1.0));
    }
}
