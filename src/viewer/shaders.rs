//! WGSL sources for the viewer

/// Cook-Torrance PBR with four point lights and diffuse ambient from the irradiance map
pub const PBR_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct Light {
    position: vec4<f32>,
    radiance: vec4<f32>,
}

struct LightsUniform {
    lights: array<Light, 4>,
    count: u32,
    _padding0: u32,
    _padding1: u32,
    _padding2: u32,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    albedo: vec4<f32>,
    metallic: f32,
    roughness: f32,
    ao: f32,
    _padding: f32,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(0) @binding(1) var<uniform> lights: LightsUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;
@group(2) @binding(0) var irradiance_map: texture_cube<f32>;
@group(2) @binding(1) var irradiance_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_pos = object.model * vec4<f32>(in.position, 1.0);
    out.world_position = world_pos.xyz;
    out.clip_position = camera.view_proj * world_pos;
    out.world_normal = normalize((object.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz);
    return out;
}

const PI: f32 = 3.14159265359;

fn distribution_ggx(n: vec3<f32>, h: vec3<f32>, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let n_dot_h = max(dot(n, h), 0.0);
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n: vec3<f32>, v: vec3<f32>, l: vec3<f32>, roughness: f32) -> f32 {
    let ggx_v = geometry_schlick_ggx(max(dot(n, v), 0.0), roughness);
    let ggx_l = geometry_schlick_ggx(max(dot(n, l), 0.0), roughness);
    return ggx_v * ggx_l;
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = object.albedo.rgb;
    let n = normalize(in.world_normal);
    let v = normalize(camera.position.xyz - in.world_position);
    let f0 = mix(vec3<f32>(0.04), albedo, object.metallic);

    var lo = vec3<f32>(0.0);
    for (var i = 0u; i < lights.count; i++) {
        let light = lights.lights[i];
        let to_light = light.position.xyz - in.world_position;
        let l = normalize(to_light);
        let h = normalize(v + l);
        let distance = length(to_light);
        let radiance = light.radiance.rgb / (distance * distance);

        let ndf = distribution_ggx(n, h, object.roughness);
        let g = geometry_smith(n, v, l, object.roughness);
        let f = fresnel_schlick(max(dot(h, v), 0.0), f0);

        let specular = (ndf * g * f) / (4.0 * max(dot(n, v), 0.0) * max(dot(n, l), 0.0) + 0.0001);
        let k_d = (vec3<f32>(1.0) - f) * (1.0 - object.metallic);
        let n_dot_l = max(dot(n, l), 0.0);
        lo += (k_d * albedo / PI + specular) * radiance * n_dot_l;
    }

    let k_s = fresnel_schlick(max(dot(n, v), 0.0), f0);
    let k_d = (1.0 - k_s) * (1.0 - object.metallic);
    let irradiance = textureSample(irradiance_map, irradiance_sampler, n).rgb;
    let ambient = k_d * irradiance * albedo * object.ao;

    var color = ambient + lo;
    // Reinhard
    color = color / (color + vec3<f32>(1.0));
    return vec4<f32>(color, 1.0);
}
"#;

/// Flat-coloured spheres marking the light positions
pub const UNLIT_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    albedo: vec4<f32>,
    metallic: f32,
    roughness: f32,
    ao: f32,
    _padding: f32,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_proj * object.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(object.albedo.rgb, 1.0);
}
"#;

/// Background cube at infinite depth sampling a cubemap
pub const SKYBOX_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var sky_map: texture_cube<f32>;
@group(1) @binding(1) var sky_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_pos: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.local_pos = position;
    // Rotation only: the sky never moves with the camera
    let rot_view = mat4x4<f32>(
        vec4<f32>(camera.view[0].xyz, 0.0),
        vec4<f32>(camera.view[1].xyz, 0.0),
        vec4<f32>(camera.view[2].xyz, 0.0),
        vec4<f32>(0.0, 0.0, 0.0, 1.0),
    );
    let clip = camera.proj * rot_view * vec4<f32>(position, 1.0);
    // z = w puts every fragment on the far plane
    out.clip_position = clip.xyww;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(sky_map, sky_sampler, in.local_pos, 0.0).rgb;
    color = color / (color + vec3<f32>(1.0));
    return vec4<f32>(color, 1.0);
}
"#;
