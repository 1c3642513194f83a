//! Shader module cache.
//!
//! All modules are created together the first time any renderable asks for
//! one and destroyed together when the renderer is torn down.

use crate::error::{RenderError, Result};
use ash::vk;
use constellation_gpu::RenderDevice;
use parking_lot::Mutex;
use std::sync::Arc;

/// Every shader the display core uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    AxesVertex,
    AxesFragment,
    IconVertex,
    IconGeometry,
    IconFragment,
    LinkVertex,
    LinkLineGeometry,
    LinkTriangleGeometry,
    LinkFragment,
}

impl ShaderId {
    pub const ALL: [Self; 9] = [
        Self::AxesVertex,
        Self::AxesFragment,
        Self::IconVertex,
        Self::IconGeometry,
        Self::IconFragment,
        Self::LinkVertex,
        Self::LinkLineGeometry,
        Self::LinkTriangleGeometry,
        Self::LinkFragment,
    ];

    /// The SPIR-V words for this shader.
    pub fn code(self) -> &'static [u32] {
        match self {
            Self::AxesVertex => constellation_shaders::axes_vertex_shader(),
            Self::AxesFragment => constellation_shaders::axes_fragment_shader(),
            Self::IconVertex => constellation_shaders::icon_vertex_shader(),
            Self::IconGeometry => constellation_shaders::icon_geometry_shader(),
            Self::IconFragment => constellation_shaders::icon_fragment_shader(),
            Self::LinkVertex => constellation_shaders::link_vertex_shader(),
            Self::LinkLineGeometry => constellation_shaders::link_line_geometry_shader(),
            Self::LinkTriangleGeometry => constellation_shaders::link_triangle_geometry_shader(),
            Self::LinkFragment => constellation_shaders::link_fragment_shader(),
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

enum CacheState {
    Uninitialised,
    Ready(Vec<vk::ShaderModule>),
    TornDown,
}

/// Shader modules shared by every renderable of one renderer.
pub struct ShaderCache {
    device: Arc<dyn RenderDevice>,
    state: Mutex<CacheState>,
}

impl ShaderCache {
    pub fn new(device: Arc<dyn RenderDevice>) -> Self {
        Self {
            device,
            state: Mutex::new(CacheState::Uninitialised),
        }
    }

    /// The module for `id`, creating every module on first use.
    pub fn module(&self, id: ShaderId) -> Result<vk::ShaderModule> {
        let mut state = self.state.lock();
        match &*state {
            CacheState::Ready(modules) => Ok(modules[id.index()]),
            CacheState::TornDown => Err(RenderError::Destroyed),
            CacheState::Uninitialised => {
                let modules = self.create_all()?;
                let module = modules[id.index()];
                *state = CacheState::Ready(modules);
                Ok(module)
            }
        }
    }

    fn create_all(&self) -> Result<Vec<vk::ShaderModule>> {
        let mut modules = Vec::with_capacity(ShaderId::ALL.len());
        for id in ShaderId::ALL {
            match self.device.create_shader_module(id.code()) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    for module in modules {
                        self.device.destroy_shader_module(module);
                    }
                    return Err(e.into());
                }
            }
        }
        tracing::debug!("Created {} shader modules", modules.len());
        Ok(modules)
    }

    pub fn is_initialised(&self) -> bool {
        matches!(*self.state.lock(), CacheState::Ready(_))
    }

    /// Destroy every module. Later calls to [`Self::module`] fail.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), CacheState::TornDown);
        if let CacheState::Ready(modules) = previous {
            for module in modules {
                self.device.destroy_shader_module(module);
            }
            tracing::debug!("Shader modules destroyed");
        }
    }
}

impl Drop for ShaderCache {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_index_all_in_order() {
        for (i, id) in ShaderId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn every_shader_has_code() {
        for id in ShaderId::ALL {
            assert_eq!(id.code()[0], 0x0723_0203, "{id:?}");
        }
    }
}
