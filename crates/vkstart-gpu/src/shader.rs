//! Shader module loading.

use crate::error::{GpuError, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Read a SPIR-V binary from disk.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let shader_load = |source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(shader_load)?;
    ash::util::read_spv(&mut file).map_err(shader_load)
}

/// Decode SPIR-V from raw bytes.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut std::io::Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderCompilation(format!("invalid SPIR-V: {e}")))
}

/// Create a shader module.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    label: &str,
) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    // SAFETY: guaranteed by the caller.
    unsafe { device.create_shader_module(&info, None) }
        .map_err(|e| GpuError::ShaderCompilation(format!("{label}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_path() {
        let err = load_spirv(Path::new("does/not/exist.spv")).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { .. }));
        assert!(err.to_string().contains("exist.spv"));
    }

    #[test]
    fn bytes_decode_to_words() {
        let magic = 0x0723_0203u32.to_le_bytes();
        let mut bytes = magic.to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        let words = spirv_from_bytes(&bytes).unwrap();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn truncated_bytes_are_rejected() {
        assert!(spirv_from_bytes(&[1, 2, 3]).is_err());
    }
}
