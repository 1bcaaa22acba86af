//! Shaders for the vkstart samples.
//!
//! The WGSL sources under `shaders/` are compiled to SPIR-V at build time
//! with naga and embedded here. Both stages use `main` as entry point so that
//! SPIR-V produced by other compilers can be dropped in as a replacement.

use std::sync::OnceLock;

/// File name of the vertex stage when loaded from a directory.
pub const BASE_VERTEX_FILE: &str = "base.vert.spv";
/// File name of the fragment stage when loaded from a directory.
pub const BASE_FRAGMENT_FILE: &str = "base.frag.spv";

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static BASE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/base.vert.spv"));
    pub static BASE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/base.frag.spv"));
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static BASE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static BASE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Triangle vertex shader.
pub fn base_vertex() -> &'static [u32] {
    BASE_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::BASE_VERT))
}

/// Triangle fragment shader.
pub fn base_fragment() -> &'static [u32] {
    BASE_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::BASE_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_shaders_are_spirv() {
        for shader in [base_vertex(), base_fragment()] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn embedded_bytes_are_word_aligned() {
        assert_eq!(spirv_bytes::BASE_VERT.len() % 4, 0);
        assert_eq!(spirv_bytes::BASE_FRAG.len() % 4, 0);
    }
}
