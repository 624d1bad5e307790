// Shader compilation and module loading
//
// Shaders ship as GLSL assets and are compiled to SPIR-V at startup with naga.
// The resulting words feed create_shader_module; modules only live long enough
// to build the pipeline.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;
use crate::assets::{AssetKind, AssetStore, Identifier};
use crate::error::RendererError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// Compile a GLSL shader asset to SPIR-V
pub fn compile(store: &AssetStore, id: &Identifier, stage: ShaderStage) -> Result<Vec<u32>> {
    let bytes = store.read_bytes(id, AssetKind::Shader)?;
    let source = String::from_utf8(bytes)
        .with_context(|| format!("Shader {} is not valid UTF-8", id))?;

    let spirv = compile_glsl(&source, stage, &id.to_string())?;
    log::debug!("Compiled {:?} shader {} ({} words)", stage, id, spirv.len());
    Ok(spirv)
}

/// Compile GLSL source text to SPIR-V words
pub fn compile_glsl(
    source: &str,
    stage: ShaderStage,
    label: &str,
) -> Result<Vec<u32>, RendererError> {
    let fail = |message: String| RendererError::ShaderCompilation {
        label: label.to_string(),
        message,
    };

    let options = naga::front::glsl::Options::from(stage.naga_stage());
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, source)
        .map_err(|errors| fail(format!("GLSL parse error:\n{errors}")))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| fail(format!("validation error: {e}")))?;

    // The GLSL is authored for Vulkan clip space already.
    let mut spv_options = naga::back::spv::Options::default();
    spv_options.lang_version = (1, 0);
    spv_options
        .flags
        .remove(naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE);

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage.naga_stage(),
        entry_point: "main".to_string(),
    };

    naga::back::spv::write_vec(&module, &info, &spv_options, Some(&pipeline_options))
        .map_err(|e| fail(format!("SPIR-V generation error: {e}")))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}
