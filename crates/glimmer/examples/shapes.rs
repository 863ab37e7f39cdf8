//! Generates every primitive, uploads it as a model on the headless backend
//! and draws it once. Run with `RUST_LOG=info` to see the counts.

use glimmer::geometry::{DiscOptions, SphereRange, TorusOptions, crescent, flared_cube};
use glimmer::math::convention::mul4;
use glimmer::math::transform::{look_at, perspective, translation};
use glimmer::prelude::*;

const VS: &str = r#"
struct Uniforms {
    world: mat4x4<f32>,
    view_projection: mat4x4<f32>,
    light_direction: vec3<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.view_projection * u.world * vec4<f32>(position, 1.0);
    out.normal = (u.world * vec4<f32>(normal, 0.0)).xyz;
    return out;
}
"#;

const FS: &str = r#"
struct Uniforms {
    world: mat4x4<f32>,
    view_projection: mat4x4<f32>,
    light_direction: vec3<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) normal: vec3<f32>) -> @location(0) vec4<f32> {
    let light = max(dot(normalize(normal), -u.light_direction), 0.0);
    return vec4<f32>(vec3<f32>(0.2 + 0.8 * light), 1.0);
}
"#;

fn main() -> glimmer::Result<()> {
    env_logger::init();

    let shapes: Vec<(&str, Arrays)> = vec![
        ("sphere", sphere(1.0, 24, 12, SphereRange::default())?),
        ("cube", cube(1.5)?),
        ("flared cube", flared_cube(1.0, 1.5, 2)?),
        ("plane", plane(2.0, 2.0, 4, 4)?),
        ("truncated cone", truncated_cone(1.0, 0.5, 2.0, 24, 4, true, true)?),
        ("cylinder", cylinder(0.75, 2.0, 24, 1, true, true)?),
        ("torus", torus(1.0, 0.3, 32, 12, TorusOptions::default())?),
        ("disc", disc(1.0, 24, DiscOptions::default())?),
        ("crescent", crescent(1.0, 2.0, 1.5, 0.3, 8, 0.0, 1.0)?),
    ];

    let mut backend = HeadlessBackend::default();
    let mut programs = ProgramCache::new();
    let program = programs.get_or_create(&mut backend, VS, FS)?;

    let (width, height) = backend.default_target_size();
    let view_projection = mul4::<RowMajor>(
        look_at([0.0, 4.0, 16.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        perspective(45f32.to_radians(), width as f32 / height as f32, 0.1, 100.0),
    );
    let shared = [
        ("view_projection", UniformValue::Mat4(view_projection)),
        ("light_direction", UniformValue::Vec3([-0.3, -1.0, -0.5])),
    ];

    backend.clear(RenderTarget::Default, Some([0.1, 0.1, 0.1, 1.0]), Some(1.0))?;
    for (i, (name, arrays)) in shapes.iter().enumerate() {
        let mut model = Model::new(&mut backend, program.clone(), arrays, [], Primitive::Triangles)?;
        model.draw_prep(shared.iter().map(|(n, v)| (*n, v)))?;
        let world = UniformValue::Mat4(translation([(i as f32 - 4.0) * 3.0, 0.0, 0.0]));
        model.draw(&mut backend, RenderTarget::Default, [("world", &world)])?;
        log::info!("{name}: {} vertices, {} indices", arrays.num_vertices(), arrays.num_indices());
    }

    log::info!("{} draws, {} shader compiles", backend.draws().len(), backend.compile_count());
    Ok(())
}
