//! The triangle pipeline used by the samples.

use crate::command;
use crate::device::{FrameRecorder, RenderTarget};
use crate::error::{GpuError, Result};
use crate::shader::create_shader_module;
use ash::vk;

/// How color attachments are bound while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// `vkCmdBeginRendering` with explicit layout barriers.
    DynamicRendering,
    /// A single-subpass render pass with one framebuffer per image.
    RenderPass,
}

/// Compiled vertex and fragment stages. Both use `main` as entry point.
#[derive(Debug, Clone)]
pub struct ShaderPair {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Draws one hard-coded triangle over a black clear.
pub struct TrianglePipeline {
    device: ash::Device,
    path: RenderPath,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    clear_color: [f32; 4],
}

impl TrianglePipeline {
    /// Create the pipeline for `color_format`.
    ///
    /// # Safety
    /// The device must be valid and outlive the pipeline. For
    /// [`RenderPath::DynamicRendering`] the dynamic rendering and
    /// synchronization2 features must be enabled.
    pub unsafe fn new(
        device: &ash::Device,
        path: RenderPath,
        color_format: vk::Format,
        shaders: &ShaderPair,
    ) -> Result<Self> {
        let render_pass = match path {
            RenderPath::RenderPass => unsafe { create_render_pass(device, color_format) }?,
            RenderPath::DynamicRendering => vk::RenderPass::null(),
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default();
        // SAFETY: guaranteed by the caller.
        let layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_render_pass(render_pass, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let pipeline =
            match unsafe { create_pipeline(device, render_pass, layout, color_format, shaders) } {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    unsafe {
                        device.destroy_pipeline_layout(layout, None);
                        device.destroy_render_pass(render_pass, None);
                    }
                    return Err(e);
                }
            };

        tracing::debug!("Created triangle pipeline ({path:?}, {color_format:?})");

        Ok(Self {
            device: device.clone(),
            path,
            render_pass,
            layout,
            pipeline,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        })
    }

    pub fn path(&self) -> RenderPath {
        self.path
    }

    /// The render pass framebuffers must be compatible with. Null for
    /// dynamic rendering.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Destroy the pipeline and its render pass.
    ///
    /// # Safety
    /// The device must be idle and every framebuffer using the render pass
    /// destroyed.
    pub unsafe fn destroy(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.render_pass = vk::RenderPass::null();
    }

    fn clear_value(&self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }
    }

    unsafe fn draw(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let (viewport, scissor) = command::full_viewport(extent);
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[scissor]);
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            self.device.cmd_draw(cmd, 3, 1, 0, 0);
        }
    }

    unsafe fn record_dynamic(&self, cmd: vk::CommandBuffer, target: &RenderTarget) {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: target.extent,
        };
        let color_attachment = [vk::RenderingAttachmentInfo::default()
            .image_view(target.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(self.clear_value())];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachment);

        unsafe {
            command::image_barrier(&self.device, cmd, command::to_color_attachment(target.image));
            self.device.cmd_begin_rendering(cmd, &rendering_info);
            self.draw(cmd, target.extent);
            self.device.cmd_end_rendering(cmd);
            command::image_barrier(&self.device, cmd, command::to_present_src(target.image));
        }
    }

    unsafe fn record_render_pass(&self, cmd: vk::CommandBuffer, target: &RenderTarget) {
        let clear_values = [self.clear_value()];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            self.draw(cmd, target.extent);
            self.device.cmd_end_render_pass(cmd);
        }
    }
}

impl FrameRecorder for TrianglePipeline {
    fn record(&mut self, command_buffer: vk::CommandBuffer, target: &RenderTarget) -> Result<()> {
        if self.pipeline == vk::Pipeline::null() {
            return Err(GpuError::InvalidState("pipeline already destroyed".into()));
        }

        // SAFETY: the executor hands over a reset command buffer from a pool
        // on this device, and the target belongs to the live swapchain.
        unsafe {
            command::begin_command_buffer(
                &self.device,
                command_buffer,
                vk::CommandBufferUsageFlags::empty(),
            )?;
            match self.path {
                RenderPath::DynamicRendering => self.record_dynamic(command_buffer, target),
                RenderPath::RenderPass => self.record_render_pass(command_buffer, target),
            }
            command::end_command_buffer(&self.device, command_buffer)
        }
    }
}

/// Single color attachment cleared on load and handed to presentation.
pub fn render_pass_attachment(color_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Orders the clear after the previous use of the image.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

unsafe fn create_render_pass(device: &ash::Device, color_format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [render_pass_attachment(color_format)];
    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];
    let dependencies = [external_dependency()];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    // SAFETY: guaranteed by the caller.
    unsafe { device.create_render_pass(&info, None) }
        .map_err(|e| GpuError::PipelineCreation(format!("render pass: {e}")))
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    color_format: vk::Format,
    shaders: &ShaderPair,
) -> Result<vk::Pipeline> {
    let vert_module = unsafe { create_shader_module(device, &shaders.vertex, "vertex") }?;
    let frag_module = match unsafe { create_shader_module(device, &shaders.fragment, "fragment") }
    {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_module, None) };
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    // Vertices are generated from the vertex index.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);
    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blending =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [color_format];
    let mut rendering_info =
        vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

    let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout);
    pipeline_info = if render_pass == vk::RenderPass::null() {
        pipeline_info.push_next(&mut rendering_info)
    } else {
        pipeline_info.render_pass(render_pass).subpass(0)
    };

    // SAFETY: every referenced state outlives the call.
    let result = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    // Modules are not needed once the pipeline exists.
    unsafe {
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);
    }

    let pipelines = result.map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".into()))
}
