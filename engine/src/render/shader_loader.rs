//! Shader Loading Utilities
//!
//! Loads and compiles the WGSL culling kernels. Shaders are embedded at
//! compile time by default and can be reloaded from disk while iterating.
//!
//! Dispatch-time constants are spliced into the source as `{{NAME}}`
//! placeholders before compilation (see [`ShaderSource::with_defines`]).

use std::path::Path;

use super::culling_config::CullingConfig;

/// Shader source that can be either embedded at compile time or loaded at runtime.
#[derive(Clone, Debug)]
pub enum ShaderSource {
    /// Embedded shader source (no file I/O at runtime)
    Embedded(&'static str),
    /// Runtime-loaded or preprocessed shader source
    Runtime(String),
}

impl ShaderSource {
    /// Get the shader source as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            ShaderSource::Embedded(s) => s,
            ShaderSource::Runtime(s) => s.as_str(),
        }
    }

    /// Replace every `{{NAME}}` placeholder with its value.
    pub fn with_defines(&self, defines: &[(&str, String)]) -> ShaderSource {
        let mut source = self.as_str().to_owned();
        for (name, value) in defines {
            source = source.replace(&format!("{{{{{name}}}}}"), value);
        }
        ShaderSource::Runtime(source)
    }

    /// True if any `{{...}}` placeholder is left unsubstituted.
    pub fn has_placeholders(&self) -> bool {
        self.as_str().contains("{{")
    }
}

/// Load a shader from the filesystem at runtime.
pub fn load_shader_file(path: impl AsRef<Path>) -> Result<ShaderSource, std::io::Error> {
    let source = std::fs::read_to_string(path)?;
    Ok(ShaderSource::Runtime(source))
}

/// Create a wgpu shader module from the given source.
pub fn create_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &ShaderSource,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
    })
}

/// Placeholder values for the tile culling shader.
pub fn vpl_tile_culling_defines(config: &CullingConfig) -> Vec<(&'static str, String)> {
    vec![("MAX_VPLS_PER_TILE", config.max_vpls_per_tile.to_string())]
}

/// Embedded visibility culling source, ready to compile.
pub fn visibility_culling_source() -> ShaderSource {
    ShaderSource::Embedded(embedded::VISIBILITY_CULLING)
}

/// Embedded tile culling source with K substituted from `config`.
pub fn vpl_tile_culling_source(config: &CullingConfig) -> ShaderSource {
    ShaderSource::Embedded(embedded::VPL_TILE_CULLING).with_defines(&vpl_tile_culling_defines(config))
}

/// Shader paths relative to the project root.
pub mod paths {
    /// Indirect draw visibility culling
    pub const VISIBILITY_CULLING: &str = "shaders/visibility_culling.wgsl";

    /// Per-pixel nearest VPL selection (stage 1 and stage 2 entry points)
    pub const VPL_TILE_CULLING: &str = "shaders/vpl_tile_culling.wgsl";
}

/// Embedded shaders that are compiled into the binary.
pub mod embedded {
    pub const VISIBILITY_CULLING: &str = include_str!("../../../shaders/visibility_culling.wgsl");
    pub const VPL_TILE_CULLING: &str = include_str!("../../../shaders/vpl_tile_culling.wgsl");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_source_embedded() {
        let source = ShaderSource::Embedded("fn main() {}");
        assert_eq!(source.as_str(), "fn main() {}");
    }

    #[test]
    fn test_shader_source_runtime() {
        let source = ShaderSource::Runtime("fn main() {}".to_string());
        assert_eq!(source.as_str(), "fn main() {}");
    }

    #[test]
    fn test_with_defines_substitutes_all() {
        let source = ShaderSource::Embedded("const A: u32 = {{A}}u; const B = {{A}} + {{B}};");
        let out = source.with_defines(&[("A", "4".to_string()), ("B", "7".to_string())]);
        assert_eq!(out.as_str(), "const A: u32 = 4u; const B = 4 + 7;");
        assert!(!out.has_placeholders());
    }

    #[test]
    fn test_tile_source_has_no_placeholders() {
        let config = CullingConfig::default().with_max_vpls_per_tile(7);
        let source = vpl_tile_culling_source(&config);
        assert!(!source.has_placeholders());
        assert!(source.as_str().contains("const MAX_VPLS_PER_TILE: u32 = 7u;"));
    }

    #[test]
    fn test_embedded_entry_points() {
        assert!(embedded::VISIBILITY_CULLING.contains("fn cs_cull_visibility"));
        assert!(embedded::VPL_TILE_CULLING.contains("fn cs_cull_vpls_stage1"));
        assert!(embedded::VPL_TILE_CULLING.contains("fn cs_cull_vpls_stage2"));
    }
}
