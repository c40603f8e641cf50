//! Render pipeline management system for wgpu
//!
//! Programs are compiled once; the pipelines built from them depend on the
//! render target they draw into and on the active depth bias, so they are
//! created lazily per [`PipelineKey`] and cached.

use std::{collections::HashMap, sync::Arc};
use wgpu::*;

use crate::gfx::rendering::device::{DepthBias, ProgramId, ProgramLayout};
use crate::gfx::scene::vertex::Vertex3D;
use crate::wgpu_utils::{self, DynamicUniformBuffer};

use super::wgpu_device::UniformBlock;

/// A compiled shader module together with its entry points
pub struct Program {
    pub label: String,
    pub module: ShaderModule,
    pub vertex_entry: String,
    pub fragment_entry: Option<String>,
    pub layout: ProgramLayout,
    pub blend: bool,
}

/// Everything besides the program that changes the pipeline object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: ProgramId,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub depth_bias: Option<DepthBias>,
}

/// Fixed-function state of one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub label: String,
    pub primitive_topology: PrimitiveTopology,
    pub cull_mode: Option<Face>,
    pub vertex_buffer: bool,
    pub color_target: Option<ColorTargetState>,
    pub depth_stencil: Option<DepthStencilState>,
}

impl PipelineConfig {
    /// Derives the state for `program` drawing into the target described by `key`
    ///
    /// Scene programs depth test with `LessEqual` and write depth. Overlay quads
    /// draw over whatever is there without touching depth.
    pub fn for_program(label: &str, layout: ProgramLayout, blend: bool, key: &PipelineKey) -> Self {
        let overlay = !layout.uses_vertex_buffer();
        let primitive_topology = if overlay {
            PrimitiveTopology::TriangleStrip
        } else {
            PrimitiveTopology::TriangleList
        };

        let color_target = key.color_format.map(|format| ColorTargetState {
            format,
            blend: Some(if blend {
                BlendState::ALPHA_BLENDING
            } else {
                BlendState::REPLACE
            }),
            write_mask: ColorWrites::ALL,
        });

        let depth_stencil = key.depth_format.map(|format| DepthStencilState {
            format,
            depth_write_enabled: !overlay,
            depth_compare: if overlay {
                CompareFunction::Always
            } else {
                CompareFunction::LessEqual
            },
            stencil: StencilState::default(),
            bias: key
                .depth_bias
                .map(|bias| DepthBiasState {
                    constant: bias.constant,
                    slope_scale: bias.slope_scale,
                    clamp: 0.0,
                })
                .unwrap_or_default(),
        });

        Self {
            label: label.to_owned(),
            primitive_topology,
            cull_mode: None,
            vertex_buffer: !overlay,
            color_target,
            depth_stencil,
        }
    }
}

/// Bind group layouts shared by every program of the same [`ProgramLayout`]
///
/// Group 0 is always the per-draw uniform block. Group 1 holds the sampled
/// textures in unit order, each followed by its sampler where one is used.
pub struct BindingLayouts {
    pub uniforms: BindGroupLayout,
    pub shaded: BindGroupLayout,
    pub depth_overlay: BindGroupLayout,
    pub color_overlay: BindGroupLayout,
}

impl BindingLayouts {
    pub fn new(device: &Device) -> Self {
        use wgpu_utils::{
            depth_texture_2d, entry, sampler, texture_2d, texture_cube, uniform_dynamic,
        };

        let uniforms = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Uniform Block Layout"),
            entries: &[entry(
                0,
                uniform_dynamic(DynamicUniformBuffer::<UniformBlock>::block_size()),
            )],
        });
        let shaded = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Shaded Textures Layout"),
            entries: &[
                entry(0, depth_texture_2d()),
                entry(1, sampler(SamplerBindingType::Comparison)),
                entry(2, texture_cube()),
                entry(3, sampler(SamplerBindingType::Filtering)),
            ],
        });
        let depth_overlay = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Depth Overlay Layout"),
            entries: &[entry(0, depth_texture_2d())],
        });
        let color_overlay = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Color Overlay Layout"),
            entries: &[
                entry(0, texture_2d()),
                entry(1, sampler(SamplerBindingType::Filtering)),
            ],
        });

        Self {
            uniforms,
            shaded,
            depth_overlay,
            color_overlay,
        }
    }

    /// Layout of group 1, if the program samples anything
    pub fn textures(&self, layout: ProgramLayout) -> Option<&BindGroupLayout> {
        match layout {
            ProgramLayout::DepthOnly => None,
            ProgramLayout::Shaded => Some(&self.shaded),
            ProgramLayout::DepthOverlay => Some(&self.depth_overlay),
            ProgramLayout::ColorOverlay => Some(&self.color_overlay),
        }
    }
}

/// Manages render pipelines with caching and lazy creation
pub struct PipelineManager {
    device: Arc<Device>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    pipeline_layouts: HashMap<ProgramLayout, PipelineLayout>,
}

impl PipelineManager {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            pipelines: HashMap::new(),
            pipeline_layouts: HashMap::new(),
        }
    }

    /// Gets or creates the pipeline for `key`
    pub fn get_pipeline(
        &mut self,
        key: PipelineKey,
        program: &Program,
        layouts: &BindingLayouts,
    ) -> &RenderPipeline {
        if !self.pipelines.contains_key(&key) {
            let config =
                PipelineConfig::for_program(&program.label, program.layout, program.blend, &key);
            let device = &self.device;
            let pipeline_layout = self
                .pipeline_layouts
                .entry(program.layout)
                .or_insert_with(|| create_pipeline_layout(device, program.layout, layouts));
            let pipeline = create_pipeline_from_config(device, &config, program, pipeline_layout);
            log::debug!(
                "Created pipeline '{}' for color {:?} depth {:?} bias {:?}",
                config.label,
                key.color_format,
                key.depth_format,
                key.depth_bias
            );
            self.pipelines.insert(key, pipeline);
        }
        &self.pipelines[&key]
    }

    /// Pipeline previously created by [`get_pipeline`](Self::get_pipeline)
    pub fn cached(&self, key: &PipelineKey) -> Option<&RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

fn create_pipeline_layout(
    device: &Device,
    layout: ProgramLayout,
    layouts: &BindingLayouts,
) -> PipelineLayout {
    let mut groups = vec![&layouts.uniforms];
    groups.extend(layouts.textures(layout));
    device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(&format!("{:?} Layout", layout)),
        bind_group_layouts: &groups,
        push_constant_ranges: &[],
    })
}

fn create_pipeline_from_config(
    device: &Device,
    config: &PipelineConfig,
    program: &Program,
    pipeline_layout: &PipelineLayout,
) -> RenderPipeline {
    let color_targets = [config.color_target.clone()];
    let targets: &[Option<ColorTargetState>] = if config.color_target.is_some() {
        &color_targets
    } else {
        &[]
    };
    let fragment = program
        .fragment_entry
        .as_deref()
        .map(|entry_point| FragmentState {
            module: &program.module,
            entry_point: Some(entry_point),
            targets,
            compilation_options: PipelineCompilationOptions::default(),
        });

    let vertex_buffers: &[VertexBufferLayout] = if config.vertex_buffer {
        &[Vertex3D::desc()]
    } else {
        &[]
    };

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(&config.label),
        layout: Some(pipeline_layout),
        vertex: VertexState {
            module: &program.module,
            entry_point: Some(program.vertex_entry.as_str()),
            buffers: vertex_buffers,
            compilation_options: PipelineCompilationOptions::default(),
        },
        fragment,
        primitive: PrimitiveState {
            topology: config.primitive_topology,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: config.cull_mode,
            polygon_mode: PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: config.depth_stencil.clone(),
        multisample: MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::resources::handle::HandlePool;

    fn key(depth_bias: Option<DepthBias>, color: bool) -> PipelineKey {
        let mut pool: HandlePool<_, ()> = HandlePool::new();
        PipelineKey {
            program: pool.insert(()),
            color_format: color.then_some(TextureFormat::Rgba8Unorm),
            depth_format: Some(TextureFormat::Depth32Float),
            depth_bias,
        }
    }

    #[test]
    fn test_depth_pass_carries_bias_and_no_color() {
        let bias = DepthBias {
            constant: 2,
            slope_scale: 2.0,
        };
        let config =
            PipelineConfig::for_program("depth", ProgramLayout::DepthOnly, false, &key(Some(bias), false));

        assert!(config.color_target.is_none());
        let depth = config.depth_stencil.unwrap();
        assert_eq!(depth.bias.constant, 2);
        assert_eq!(depth.bias.slope_scale, 2.0);
        assert!(depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, CompareFunction::LessEqual);
        assert_eq!(config.primitive_topology, PrimitiveTopology::TriangleList);
    }

    #[test]
    fn test_overlay_is_blended_strip_without_depth_writes() {
        let config =
            PipelineConfig::for_program("overlay", ProgramLayout::ColorOverlay, true, &key(None, true));

        assert_eq!(config.primitive_topology, PrimitiveTopology::TriangleStrip);
        assert!(!config.vertex_buffer);
        assert_eq!(
            config.color_target.unwrap().blend,
            Some(BlendState::ALPHA_BLENDING)
        );
        let depth = config.depth_stencil.unwrap();
        assert!(!depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, CompareFunction::Always);
    }

    #[test]
    fn test_keys_differ_by_bias() {
        let a = key(None, true);
        let b = PipelineKey {
            depth_bias: Some(DepthBias {
                constant: 1,
                slope_scale: 1.0,
            }),
            ..a
        };
        assert_ne!(a, b);
    }
}
