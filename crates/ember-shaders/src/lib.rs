//! Shaders for the Ember renderer.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V at build time
//! using shaderc. Every pipeline reads the global uniform block at set 0,
//! binding 0.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static SIMPLE_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_vert.spv"));
    pub static SIMPLE_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_frag.spv"));
    pub static TEXTURED_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured_shader_frag.spv"));
    pub static POINT_LIGHT_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/point_light_vert.spv"));
    pub static POINT_LIGHT_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/point_light_frag.spv"));
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// A vertex/fragment SPIR-V pair.
#[derive(Debug, Clone, Copy)]
pub struct ShaderPair {
    pub vertex: &'static [u32],
    pub fragment: &'static [u32],
}

static SIMPLE_VERT: OnceLock<Vec<u32>> = OnceLock::new();
static SIMPLE_FRAG: OnceLock<Vec<u32>> = OnceLock::new();
static TEXTURED_FRAG: OnceLock<Vec<u32>> = OnceLock::new();
static POINT_LIGHT_VERT: OnceLock<Vec<u32>> = OnceLock::new();
static POINT_LIGHT_FRAG: OnceLock<Vec<u32>> = OnceLock::new();

/// Lit, vertex-coloured meshes.
pub fn simple_shader() -> ShaderPair {
    ShaderPair {
        vertex: SIMPLE_VERT.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_VERT)),
        fragment: SIMPLE_FRAG.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_FRAG)),
    }
}

/// Lit meshes sampling a texture at set 0, binding 1.
pub fn textured_shader() -> ShaderPair {
    ShaderPair {
        vertex: SIMPLE_VERT.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_VERT)),
        fragment: TEXTURED_FRAG.get_or_init(|| bytes_to_spirv(spirv_bytes::TEXTURED_FRAG)),
    }
}

/// Camera-facing point light billboards, six vertices per light, no vertex input.
pub fn point_light_shader() -> ShaderPair {
    ShaderPair {
        vertex: POINT_LIGHT_VERT.get_or_init(|| bytes_to_spirv(spirv_bytes::POINT_LIGHT_VERT)),
        fragment: POINT_LIGHT_FRAG.get_or_init(|| bytes_to_spirv(spirv_bytes::POINT_LIGHT_FRAG)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn all_shaders_load() {
        for pair in [simple_shader(), textured_shader(), point_light_shader()] {
            assert_eq!(pair.vertex[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert_eq!(pair.fragment[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
        }
    }

    #[test]
    fn textured_shares_vertex_stage() {
        assert_eq!(
            simple_shader().vertex.as_ptr(),
            textured_shader().vertex.as_ptr()
        );
    }
}
