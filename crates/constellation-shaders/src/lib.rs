//! Shaders for the Constellation graph display.
//!
//! This crate contains GLSL shaders and their compiled SPIR-V bytecode.
//! Shaders are compiled at build time using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static AXES_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/axes_vert.spv"));
    pub static AXES_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/axes_frag.spv"));
    pub static ICON_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/icon_vert.spv"));
    pub static ICON_GEOM: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/icon_geom.spv"));
    pub static ICON_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/icon_frag.spv"));
    pub static LINK_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/link_vert.spv"));
    pub static LINK_LINE_GEOM: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/link_line_geom.spv"));
    pub static LINK_TRIANGLE_GEOM: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/link_triangle_geom.spv"));
    pub static LINK_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/link_frag.spv"));
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

macro_rules! shader {
    ($(#[$doc:meta])* $name:ident, $cell:ident, $bytes:ident) => {
        static $cell: OnceLock<Vec<u32>> = OnceLock::new();

        $(#[$doc])*
        pub fn $name() -> &'static [u32] {
            $cell.get_or_init(|| bytes_to_spirv(spirv_bytes::$bytes))
        }
    };
}

shader!(
    /// Axes indicator vertex shader.
    axes_vertex_shader, AXES_VERT_SPIRV, AXES_VERT
);
shader!(
    /// Axes indicator fragment shader.
    axes_fragment_shader, AXES_FRAG_SPIRV, AXES_FRAG
);
shader!(
    /// Icon vertex shader: fetches and morphs positions.
    icon_vertex_shader, ICON_VERT_SPIRV, ICON_VERT
);
shader!(
    /// Icon geometry shader: expands points to textured quads.
    icon_geometry_shader, ICON_GEOM_SPIRV, ICON_GEOM
);
shader!(
    /// Icon fragment shader: samples the icon atlas.
    icon_fragment_shader, ICON_FRAG_SPIRV, ICON_FRAG
);
shader!(
    /// Link vertex shader, shared by both link styles.
    link_vertex_shader, LINK_VERT_SPIRV, LINK_VERT
);
shader!(
    /// Orthogonal link geometry shader (line strips).
    link_line_geometry_shader, LINK_LINE_GEOM_SPIRV, LINK_LINE_GEOM
);
shader!(
    /// Perspective link geometry shader (ribbons with arrow heads).
    link_triangle_geometry_shader, LINK_TRIANGLE_GEOM_SPIRV, LINK_TRIANGLE_GEOM
);
shader!(
    /// Link fragment shader.
    link_fragment_shader, LINK_FRAG_SPIRV, LINK_FRAG
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shaders_load() {
        let shaders = [
            axes_vertex_shader(),
            axes_fragment_shader(),
            icon_vertex_shader(),
            icon_geometry_shader(),
            icon_fragment_shader(),
            link_vertex_shader(),
            link_line_geometry_shader(),
            link_triangle_geometry_shader(),
            link_fragment_shader(),
        ];
        for shader in shaders {
            assert_eq!(shader[0], 0x0723_0203, "Invalid SPIR-V magic number");
            assert!(shader.len() > 5, "Shader too small");
        }
    }

    #[test]
    fn spirv_words_are_little_endian() {
        let words = bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]);
        assert_eq!(words, vec![0x0723_0203, 1]);
    }
}
