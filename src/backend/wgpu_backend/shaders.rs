//! WGSL sources for the capture programs
//!
//! Both programs share the vertex stage: the proxy cube's object-space
//! position is passed through as the sampling direction, and clip-space Y is
//! negated so that row 0 of each rendered face is the top of the face in the
//! cubemap convention.

/// Equirectangular HDR texture to cubemap face
pub const EQUIRECT_TO_CUBEMAP_SHADER: &str = r#"
struct CaptureUniforms {
    view_proj: mat4x4<f32>,
    sample_delta: f32,
    phi_steps: u32,
    theta_steps: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> capture: CaptureUniforms;
@group(0) @binding(1) var equirect_map: texture_2d<f32>;
@group(0) @binding(2) var equirect_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_pos: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.local_pos = in.position;
    let clip = capture.view_proj * vec4<f32>(in.position, 1.0);
    out.clip_position = vec4<f32>(clip.x, -clip.y, clip.z, clip.w);
    return out;
}

const INV_ATAN: vec2<f32> = vec2<f32>(0.15915494, 0.31830988);

fn sample_spherical_map(v: vec3<f32>) -> vec2<f32> {
    let uv = vec2<f32>(atan2(v.z, v.x), asin(clamp(v.y, -1.0, 1.0)));
    return uv * INV_ATAN + 0.5;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = sample_spherical_map(normalize(in.local_pos));
    let color = textureSampleLevel(equirect_map, equirect_sampler, uv, 0.0).rgb;
    return vec4<f32>(color, 1.0);
}
"#;

/// Cosine-weighted hemisphere convolution of an environment cubemap
pub const IRRADIANCE_CONVOLUTION_SHADER: &str = r#"
struct CaptureUniforms {
    view_proj: mat4x4<f32>,
    sample_delta: f32,
    phi_steps: u32,
    theta_steps: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> capture: CaptureUniforms;
@group(0) @binding(1) var environment_map: texture_cube<f32>;
@group(0) @binding(2) var environment_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_pos: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.local_pos = in.position;
    let clip = capture.view_proj * vec4<f32>(in.position, 1.0);
    out.clip_position = vec4<f32>(clip.x, -clip.y, clip.z, clip.w);
    return out;
}

const PI: f32 = 3.14159265359;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(in.local_pos);

    var up = vec3<f32>(0.0, 1.0, 0.0);
    if abs(normal.y) >= 0.999 {
        up = vec3<f32>(0.0, 0.0, 1.0);
    }
    let right = normalize(cross(up, normal));
    up = cross(normal, right);

    var irradiance = vec3<f32>(0.0);
    for (var i = 0u; i < capture.phi_steps; i++) {
        let phi = f32(i) * capture.sample_delta;
        for (var j = 0u; j < capture.theta_steps; j++) {
            let theta = f32(j) * capture.sample_delta;
            // Spherical to cartesian in tangent space, then to world
            let tangent_sample = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let sample_vec = tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;
            let radiance = textureSampleLevel(environment_map, environment_sampler, sample_vec, 0.0).rgb;
            irradiance += radiance * cos(theta) * sin(theta);
        }
    }

    irradiance = PI * irradiance / (f32(capture.phi_steps) * f32(capture.theta_steps));
    return vec4<f32>(irradiance, 1.0);
}
"#;
