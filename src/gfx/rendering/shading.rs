//! Shader programs and the per-mode shading strategy
//!
//! WGSL has no includes, so each program is its shared prelude files
//! concatenated with the file holding its entry points.

use crate::error::RenderResult;
use crate::gfx::scene::RenderMode;

use super::device::{GraphicsDevice, ProgramDesc, ProgramId, ProgramLayout};

const DEPTH_SOURCE: &str = concat!(
    include_str!("shaders/uniforms.wgsl"),
    include_str!("shaders/depth.wgsl"),
);

const PHONG_SOURCE: &str = concat!(
    include_str!("shaders/uniforms.wgsl"),
    include_str!("shaders/lighting.wgsl"),
    include_str!("shaders/phong.wgsl"),
);

const EDGES_SOURCE: &str = concat!(
    include_str!("shaders/uniforms.wgsl"),
    include_str!("shaders/lighting.wgsl"),
    include_str!("shaders/edges.wgsl"),
);

const DEPTH_OVERLAY_SOURCE: &str = concat!(
    include_str!("shaders/uniforms.wgsl"),
    include_str!("shaders/overlay.wgsl"),
    include_str!("shaders/overlay_depth.wgsl"),
);

const COLOR_OVERLAY_SOURCE: &str = concat!(
    include_str!("shaders/uniforms.wgsl"),
    include_str!("shaders/overlay.wgsl"),
    include_str!("shaders/overlay_color.wgsl"),
);

/// Every program the renderer uses, in creation order
pub fn program_descs() -> [ProgramDesc<'static>; 7] {
    let shaded = |label, source, vertex_entry, fragment_entry| ProgramDesc {
        label,
        source,
        vertex_entry,
        fragment_entry: Some(fragment_entry),
        layout: ProgramLayout::Shaded,
        blend: false,
    };
    [
        ProgramDesc {
            label: "depth",
            source: DEPTH_SOURCE,
            vertex_entry: "vs_depth",
            fragment_entry: None,
            layout: ProgramLayout::DepthOnly,
            blend: false,
        },
        shaded("phong", PHONG_SOURCE, "vs_main", "fs_phong"),
        shaded("flat", PHONG_SOURCE, "vs_main", "fs_flat"),
        shaded("wireframe", EDGES_SOURCE, "vs_edges", "fs_wireframe"),
        shaded("hidden line", EDGES_SOURCE, "vs_edges", "fs_hidden_line"),
        ProgramDesc {
            label: "depth overlay",
            source: DEPTH_OVERLAY_SOURCE,
            vertex_entry: "vs_overlay",
            fragment_entry: Some("fs_depth"),
            layout: ProgramLayout::DepthOverlay,
            blend: false,
        },
        ProgramDesc {
            label: "color overlay",
            source: COLOR_OVERLAY_SOURCE,
            vertex_entry: "vs_overlay",
            fragment_entry: Some("fs_color"),
            layout: ProgramLayout::ColorOverlay,
            blend: true,
        },
    ]
}

/// Compiled program handles
#[derive(Debug, Clone, Copy)]
pub struct ShaderPrograms {
    pub depth: ProgramId,
    pub phong: ProgramId,
    pub flat: ProgramId,
    pub wireframe: ProgramId,
    pub hidden_line: ProgramId,
    pub depth_overlay: ProgramId,
    pub color_overlay: ProgramId,
}

impl ShaderPrograms {
    /// Compiles all programs; the first failure aborts with `Compile`
    pub fn compile<D: GraphicsDevice + ?Sized>(device: &mut D) -> RenderResult<Self> {
        let [depth, phong, flat, wireframe, hidden_line, depth_overlay, color_overlay] =
            program_descs();
        let programs = Self {
            depth: device.create_program(&depth)?,
            phong: device.create_program(&phong)?,
            flat: device.create_program(&flat)?,
            wireframe: device.create_program(&wireframe)?,
            hidden_line: device.create_program(&hidden_line)?,
            depth_overlay: device.create_program(&depth_overlay)?,
            color_overlay: device.create_program(&color_overlay)?,
        };
        log::info!("Compiled {} shader programs", program_descs().len());
        Ok(programs)
    }
}

/// Program choice for mesh instances in the color pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingStrategy {
    Phong,
    Flat,
    Wireframe,
    HiddenLine,
}

impl ShadingStrategy {
    pub fn for_mode(mode: RenderMode) -> Self {
        match mode {
            RenderMode::Flat => ShadingStrategy::Flat,
            RenderMode::Phong => ShadingStrategy::Phong,
            RenderMode::Wireframe => ShadingStrategy::Wireframe,
            RenderMode::HiddenLine => ShadingStrategy::HiddenLine,
        }
    }

    pub fn program(self, programs: &ShaderPrograms) -> ProgramId {
        match self {
            ShadingStrategy::Phong => programs.phong,
            ShadingStrategy::Flat => programs.flat,
            ShadingStrategy::Wireframe => programs.wireframe,
            ShadingStrategy::HiddenLine => programs.hidden_line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::gfx::rendering::recording::RecordingDevice;

    #[test]
    fn test_entry_points_exist_in_sources() {
        for desc in program_descs() {
            assert!(
                desc.source.contains(&format!("fn {}(", desc.vertex_entry)),
                "{} lacks {}",
                desc.label,
                desc.vertex_entry
            );
            if let Some(fragment) = desc.fragment_entry {
                assert!(desc.source.contains(&format!("fn {}(", fragment)));
            }
        }
    }

    #[test]
    fn test_program_sources_validate() {
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        for desc in program_descs() {
            let module = naga::front::wgsl::parse_str(desc.source).unwrap_or_else(|e| {
                panic!("{} failed to parse: {}", desc.label, e.emit_to_string(desc.source))
            });
            validator
                .validate(&module)
                .unwrap_or_else(|e| panic!("{} failed to validate: {e:?}", desc.label));
        }
    }

    #[test]
    fn test_every_mode_has_a_distinct_program() {
        let mut device = RecordingDevice::new(8, 8);
        let programs = ShaderPrograms::compile(&mut device).unwrap();
        let modes = [
            RenderMode::Flat,
            RenderMode::Phong,
            RenderMode::Wireframe,
            RenderMode::HiddenLine,
        ];
        let ids: Vec<_> = modes
            .iter()
            .map(|&m| ShadingStrategy::for_mode(m).program(&programs))
            .collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_compile_failure_surfaces() {
        let mut device = RecordingDevice::new(8, 8);
        device.fail_program("hidden line");
        assert!(matches!(
            ShaderPrograms::compile(&mut device),
            Err(RenderError::Compile { label, .. }) if label == "hidden line"
        ));
    }
}
