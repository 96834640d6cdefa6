//! Point lights and their uniform upload.

use cgmath::{Point3, Vector3};

use crate::{
    camera::Camera,
    context::{GraphicsContext, Uniform},
    error::Result,
};

/// Where a light sits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightAnchor {
    /// One unit in front of the eye, following the camera.
    Camera,
    Fixed(Point3<f32>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub colour: Vector3<f32>,
    pub anchor: LightAnchor,
    pub ambient_intensity: f32,
    pub specular_strength: f32,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl PointLight {
    /// A white and a red light, both following the camera.
    pub fn defaults() -> Vec<PointLight> {
        vec![
            PointLight {
                colour: Vector3::new(1.0, 1.0, 1.0),
                anchor: LightAnchor::Camera,
                ambient_intensity: 0.9,
                specular_strength: 0.5,
                constant: 1.0,
                linear: 0.003,
                quadratic: 0.0,
            },
            PointLight {
                colour: Vector3::new(1.0, 0.0, 0.0),
                anchor: LightAnchor::Camera,
                ambient_intensity: 0.9,
                specular_strength: 0.5,
                constant: 1.0,
                linear: 0.09,
                quadratic: 0.032,
            },
        ]
    }

    pub fn position(&self, camera: &Camera) -> Point3<f32> {
        match self.anchor {
            LightAnchor::Camera => camera.eye + camera.view_direction,
            LightAnchor::Fixed(position) => position,
        }
    }

    /// Push this light as `pointLights[index]` into the bound program.
    pub fn upload(&self, ctx: &mut dyn GraphicsContext, index: usize, camera: &Camera) -> Result<()> {
        let position = self.position(camera);
        let fields: [(&str, Uniform); 7] = [
            ("lightColor", self.colour.into()),
            ("lightPos", Vector3::new(position.x, position.y, position.z).into()),
            ("ambientIntensity", self.ambient_intensity.into()),
            ("specularStrength", self.specular_strength.into()),
            ("constant", self.constant.into()),
            ("linear", self.linear.into()),
            ("quadratic", self.quadratic.into()),
        ];
        for (field, value) in fields {
            ctx.set_uniform(&format!("pointLights[{index}].{field}"), value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::RecordingContext, shader::ShaderSource};

    const LIGHTS: &str = r#"
        struct PointLight {
            lightColor: vec3<f32>,
            lightPos: vec3<f32>,
            ambientIntensity: f32,
            specularStrength: f32,
            constant: f32,
            linear: f32,
            quadratic: f32,
        }
        struct Uniforms { pointLights: array<PointLight, 2> }
    "#;

    #[test]
    fn camera_anchored_lights_sit_in_front_of_the_eye() {
        let mut camera = Camera::default();
        camera.set_eye_position(1.0, 2.0, 3.0);
        let light = PointLight::defaults()[0];
        assert_eq!(light.position(&camera), Point3::new(1.0, 2.0, 2.0));

        let fixed = PointLight {
            anchor: LightAnchor::Fixed(Point3::new(0.0, 10.0, 0.0)),
            ..light
        };
        assert_eq!(fixed.position(&camera), Point3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn upload_writes_indexed_fields() {
        let mut ctx = RecordingContext::new();
        let program = ctx
            .create_program("lights", &ShaderSource::new("lights", LIGHTS).unwrap())
            .unwrap();
        ctx.use_program(program).unwrap();
        let camera = Camera::default();
        for (i, light) in PointLight::defaults().iter().enumerate() {
            light.upload(&mut ctx, i, &camera).unwrap();
        }
        assert_eq!(
            ctx.uniform(program, "pointLights[1].lightColor"),
            Some(Uniform::Vec3(Vector3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(
            ctx.uniform(program, "pointLights[1].quadratic"),
            Some(Uniform::Float(0.032))
        );
        assert_eq!(
            ctx.uniform(program, "pointLights[0].lightPos"),
            Some(Uniform::Vec3(Vector3::new(0.0, 0.0, -1.0)))
        );

        // a third light has nowhere to go
        assert!(PointLight::defaults()[0].upload(&mut ctx, 2, &camera).is_err());
    }
}
