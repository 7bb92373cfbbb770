//! Batch shader generation.
//!
//! The fragment stage picks one of N separately bound textures with an
//! unrolled `if / else if` chain, one branch per texture slot. WGSL has no
//! sampler arrays indexable by a varying, so the chain is generated per slot
//! count.

use crate::error::{RenderError, Result};

/// Vertex attribute locations shared by the generated program and backends.
pub mod attrib {
    pub const POSITION: u32 = 0;
    pub const UV: u32 = 1;
    pub const TEXTURE_INDEX: u32 = 2;
    pub const ALPHA: u32 = 3;
}

/// Bind group 0 layout: projection uniform, sampler, then one texture per slot.
pub mod binding {
    pub const PROJECTION: u32 = 0;
    pub const SAMPLER: u32 = 1;
    pub const FIRST_TEXTURE: u32 = 2;
}

const TEMPLATE: &str = r#"
const SLOT_COUNT: u32 = {{count}}u;

struct Projection {
    matrix: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> projection: Projection;
@group(0) @binding(1) var slot_sampler: sampler;
{{bindings}}
struct VertexIn {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) texture_index: f32,
    @location(3) alpha: f32,
};

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) @interpolate(flat) texture_index: u32,
    @location(2) alpha: f32,
};

@vertex
fn vs_main(in: VertexIn) -> VertexOut {
    let m = projection.matrix;
    var out: VertexOut;
    out.clip = vec4<f32>(
        in.position.x * m[0][0] + m[3][0],
        in.position.y * m[1][1] + m[3][1],
        m[3][2],
        1.0
    );
    out.uv = in.uv;
    out.texture_index = min(u32(in.texture_index + 0.5), SLOT_COUNT - 1u);
    out.alpha = in.alpha;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let src = in.texture_index;
    var color = vec4<f32>(1.0, 0.0, 0.0, 1.0);
    if (src == 0u) {
        color = textureSampleLevel(slot_0, slot_sampler, in.uv, 0.0);
    }{{alternates}}{{unpremultiply}}
    let a = color.a * in.alpha;
    return vec4<f32>(color.rgb * a, a);
}
"#;

const UNPREMULTIPLY: &str = "
    if (color.a > 0.0) {
        color = vec4<f32>(color.rgb / color.a, color.a);
    }";

/// Generated program text for a given slot count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub slot_count: usize,
    pub wgsl: String,
}

/// Expands the batch shader template.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramBuilder;

impl ProgramBuilder {
    /// Program for straight-alpha textures.
    pub fn build(slot_count: usize) -> Result<ProgramSource> {
        Self::build_with(slot_count, false)
    }

    /// With `premultiplied_input`, sampled colors are divided by their alpha
    /// before the node alpha is applied, for sources uploaded premultiplied.
    pub fn build_with(slot_count: usize, premultiplied_input: bool) -> Result<ProgramSource> {
        if slot_count == 0 {
            return Err(RenderError::ShaderCompile {
                slots: 0,
                message: "at least one texture slot is required".into(),
            });
        }

        let mut bindings = String::new();
        for i in 0..slot_count {
            bindings.push_str(&format!(
                "@group(0) @binding({}) var slot_{i}: texture_2d<f32>;\n",
                binding::FIRST_TEXTURE as usize + i
            ));
        }

        let mut alternates = String::new();
        for i in 1..slot_count {
            alternates.push_str(&format!(
                " else if (src == {i}u) {{\n        color = textureSampleLevel(slot_{i}, slot_sampler, in.uv, 0.0);\n    }}"
            ));
        }

        let wgsl = TEMPLATE
            .replace("{{count}}", &slot_count.to_string())
            .replace("{{bindings}}", &bindings)
            .replace("{{alternates}}", &alternates)
            .replace("{{unpremultiply}}", if premultiplied_input { UNPREMULTIPLY } else { "" });

        Ok(ProgramSource { slot_count, wgsl })
    }
}

impl ProgramSource {
    /// Parses and validates the WGSL with naga.
    pub fn validate(&self) -> Result<()> {
        let module = naga::front::wgsl::parse_str(&self.wgsl).map_err(|e| RenderError::ShaderCompile {
            slots: self.slot_count,
            message: e.emit_to_string(&self.wgsl),
        })?;
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .map_err(|e| RenderError::ShaderCompile {
                slots: self.slot_count,
                message: e.emit_to_string(&self.wgsl),
            })?;
        Ok(())
    }
}
