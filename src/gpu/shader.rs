//! WGSL source for the layered noise sum

use glam::Mat4;

use crate::terrain::{BUFFER_SIZE, NoiseBlueprint};

/// WGSL `mat4x4<f32>` constructor, column-major
fn wgsl_mat4(m: &Mat4) -> String {
    let elements: Vec<String> = m.to_cols_array().iter().map(|v| format!("{:.12}", v)).collect();
    format!("mat4x4<f32>({})", elements.join(", "))
}

/// Name of the texture binding holding blueprint `index`
pub fn texture_binding_name(name: &str, index: usize) -> String {
    format!("{}_noise_{}", name, index)
}

/// Name of the helper resolving a position to its lattice texel
pub fn lattice_fn_name(name: &str) -> String {
    format!("{}_lattice", name)
}

/// WGSL fragment evaluating the layered field at `position`
///
/// Declares one `texture_3d<f32>` per blueprint at `@binding(i)` in `group`,
/// a lattice helper, and `fn <name>(position: vec4<f32>) -> f32`. Lookups
/// mirror [`BufferedSampler`](crate::terrain::BufferedSampler): round the
/// point, apply the output transform, round again, wrap with `|c| % 64`,
/// then `textureLoad` the texel. No sampler or filtering is involved, so
/// the result matches the CPU field for any position whose lattice
/// coordinates fit in `i32`.
pub fn layered_noise_wgsl(
    blueprints: &[NoiseBlueprint],
    name: &str,
    vertical_bias: f32,
    group: u32,
) -> String {
    let lattice = lattice_fn_name(name);
    let mut source = String::new();

    for i in 0..blueprints.len() {
        source.push_str(&format!(
            "@group({}) @binding({}) var {}: texture_3d<f32>;\n",
            group,
            i,
            texture_binding_name(name, i)
        ));
    }

    source.push_str(&format!(
        "\nfn {}(transform: mat4x4<f32>, position: vec3<f32>) -> vec3<i32> {{\n",
        lattice
    ));
    source.push_str("    let q = (transform * vec4<f32>(floor(position + 0.5), 1.0)).xyz;\n");
    source.push_str(&format!(
        "    return abs(vec3<i32>(floor(q + 0.5))) % vec3<i32>({});\n}}\n",
        BUFFER_SIZE
    ));

    source.push_str(&format!("\nfn {}(position: vec4<f32>) -> f32 {{\n", name));
    source.push_str(&format!("    var sum = position.y - {:.12};\n", vertical_bias));
    for (i, blueprint) in blueprints.iter().enumerate() {
        source.push_str(&format!(
            "    sum += {:.12} * textureLoad({}, {}({}, position.xyz), 0).x;\n",
            blueprint.sample_scale,
            texture_binding_name(name, i),
            lattice,
            wgsl_mat4(&blueprint.output_transform)
        ));
    }
    source.push_str("    return sum;\n}\n");

    source
}
