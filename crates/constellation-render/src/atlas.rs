//! Icon texture atlas.
//!
//! Icons are registered by name from any thread and packed into a 2D array
//! image on the render thread. Each layer holds an 8x8 grid of
//! [`ICON_SIZE`]-pixel cells; icon `i` lives in layer `i / 64`, cell `i % 64`.

use crate::error::Result;
use ash::vk;
use constellation_gpu::{Owned, RenderDevice, SampledImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Width and height of one icon in pixels.
pub const ICON_SIZE: u32 = 64;
/// Icons per atlas row.
pub const ICONS_PER_ROW: u32 = 8;
/// Icons per atlas layer.
pub const ICONS_PER_LAYER: u32 = ICONS_PER_ROW * ICONS_PER_ROW;
/// Width and height of one atlas layer in pixels.
pub const LAYER_SIZE: u32 = ICON_SIZE * ICONS_PER_ROW;

/// Index of the fully transparent icon, used for empty decorator slots.
pub const TRANSPARENT_ICON_INDEX: u32 = 0;
/// Index of the icon drawn for names the provider cannot render.
pub const UNKNOWN_ICON_INDEX: u32 = 1;

pub const TRANSPARENT_ICON: &str = "transparent";
pub const UNKNOWN_ICON: &str = "unknown";

const ICON_BYTES: usize = (ICON_SIZE * ICON_SIZE * 4) as usize;

/// Source of icon pixels.
pub trait IconProvider: Send + Sync {
    fn has_icon(&self, name: &str) -> bool;

    /// Draw `name` into `pixels`, a zeroed `ICON_SIZE`x`ICON_SIZE` RGBA8 buffer.
    fn render(&self, name: &str, pixels: &mut [u8]);
}

/// Simple white shapes, tinted by vertex colour in the shaders.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinIcons;

impl BuiltinIcons {
    pub const NAMES: [&'static str; 8] = [
        TRANSPARENT_ICON,
        UNKNOWN_ICON,
        "circle",
        "square",
        "diamond",
        "triangle",
        "ring",
        "cross",
    ];

    fn coverage(name: &str, x: f32, y: f32) -> bool {
        // Cell coordinates in [-1, 1], y down
        let r = x.hypot(y);
        match name {
            "circle" => r <= 0.9,
            "square" => x.abs() <= 0.8 && y.abs() <= 0.8,
            "diamond" => x.abs() + y.abs() <= 0.9,
            "triangle" => y <= 0.8 && x.abs() <= (y + 0.9) * 0.5,
            "ring" => (0.65..=0.9).contains(&r),
            "cross" => (x.abs() <= 0.2 && y.abs() <= 0.9) || (y.abs() <= 0.2 && x.abs() <= 0.9),
            UNKNOWN_ICON => {
                let border = x.abs().max(y.abs());
                (0.75..=0.9).contains(&border) || ((x - y).abs() <= 0.12 && border <= 0.9)
            }
            _ => false,
        }
    }
}

impl IconProvider for BuiltinIcons {
    fn has_icon(&self, name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    fn render(&self, name: &str, pixels: &mut [u8]) {
        #[allow(clippy::cast_precision_loss)]
        let half = ICON_SIZE as f32 * 0.5;
        for (i, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let (px, py) = ((i as u32 % ICON_SIZE) as f32, (i as u32 / ICON_SIZE) as f32);
            let x = (px + 0.5 - half) / half;
            let y = (py + 0.5 - half) / half;
            if Self::coverage(name, x, y) {
                pixel.copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }
}

struct Registry {
    indices: HashMap<String, u32>,
    names: Vec<String>,
}

impl Registry {
    fn new() -> Self {
        let mut registry = Self {
            indices: HashMap::new(),
            names: Vec::new(),
        };
        registry.insert(TRANSPARENT_ICON);
        registry.insert(UNKNOWN_ICON);
        registry
    }

    fn insert(&mut self, name: &str) -> u32 {
        let index = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        self.indices.insert(name.to_string(), index);
        self.names.push(name.to_string());
        index
    }
}

#[derive(Default)]
struct DeviceAtlas {
    sampler: Option<Owned<vk::Sampler>>,
    image: Option<Owned<SampledImage>>,
    uploaded: usize,
    generation: u64,
}

/// Named icons packed into one sampled image.
pub struct IconTextureAtlas {
    provider: Box<dyn IconProvider>,
    registry: Mutex<Registry>,
    device: Mutex<DeviceAtlas>,
}

impl IconTextureAtlas {
    pub fn new(provider: Box<dyn IconProvider>) -> Self {
        Self {
            provider,
            registry: Mutex::new(Registry::new()),
            device: Mutex::new(DeviceAtlas::default()),
        }
    }

    /// Index of `name`, registering it if new.
    ///
    /// Names the provider cannot draw map to [`UNKNOWN_ICON_INDEX`]. Indices
    /// never change once assigned.
    pub fn add_icon(&self, name: &str) -> u32 {
        let mut registry = self.registry.lock();
        if let Some(&index) = registry.indices.get(name) {
            return index;
        }
        if !self.provider.has_icon(name) {
            tracing::debug!("No icon named '{}', using the unknown icon", name);
            return UNKNOWN_ICON_INDEX;
        }
        let index = registry.insert(name);
        tracing::trace!("Icon '{}' registered at {}", name, index);
        index
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.registry.lock().indices.get(name).copied()
    }

    pub fn icon_count(&self) -> usize {
        self.registry.lock().names.len()
    }

    /// Whether registered icons are missing from the device image.
    pub fn needs_update(&self) -> bool {
        let uploaded = {
            let device = self.device.lock();
            if device.image.is_none() {
                return true;
            }
            device.uploaded
        };
        uploaded != self.icon_count()
    }

    /// Upload every registered icon, replacing the previous image.
    ///
    /// Must run on the render thread with the device idle. Returns whether
    /// anything changed.
    pub fn display_update(&self, device: &Arc<dyn RenderDevice>) -> Result<bool> {
        if !self.needs_update() {
            return Ok(false);
        }

        let names = self.registry.lock().names.clone();
        let layers = u32::try_from(names.len())
            .unwrap_or(u32::MAX)
            .div_ceil(ICONS_PER_LAYER)
            .max(1);
        let pixels = self.pack(&names, layers);

        let mut gpu = self.device.lock();
        if gpu.sampler.is_none() {
            gpu.sampler = Some(Owned::new(device.clone(), device.create_sampler()?));
        }
        let image = device.create_sampled_image(LAYER_SIZE, LAYER_SIZE, layers, &pixels)?;
        gpu.image = Some(Owned::new(device.clone(), image));
        gpu.uploaded = names.len();
        gpu.generation += 1;

        tracing::debug!(
            "Icon atlas uploaded: {} icons in {} layers (generation {})",
            names.len(),
            layers,
            gpu.generation
        );
        Ok(true)
    }

    fn pack(&self, names: &[String], layers: u32) -> Vec<u8> {
        let layer_bytes = (LAYER_SIZE * LAYER_SIZE * 4) as usize;
        let row_bytes = (ICON_SIZE * 4) as usize;
        let mut pixels = vec![0u8; layer_bytes * layers as usize];
        let mut cell = vec![0u8; ICON_BYTES];

        for (index, name) in names.iter().enumerate() {
            cell.fill(0);
            self.provider.render(name, &mut cell);

            let (origin_x, origin_y, layer) = cell_origin(index);
            for row in 0..ICON_SIZE as usize {
                let dst = layer * layer_bytes
                    + ((origin_y + row) * LAYER_SIZE as usize + origin_x) * 4;
                let src = row * row_bytes;
                pixels[dst..dst + row_bytes].copy_from_slice(&cell[src..src + row_bytes]);
            }
        }
        pixels
    }

    /// Current sampler, or null before the first upload.
    pub fn sampler(&self) -> vk::Sampler {
        self.device
            .lock()
            .sampler
            .as_ref()
            .map_or_else(vk::Sampler::null, Owned::handle)
    }

    /// Current image view, or null before the first upload.
    pub fn image_view(&self) -> vk::ImageView {
        self.device
            .lock()
            .image
            .as_ref()
            .map_or_else(vk::ImageView::null, |image| image.handle().view)
    }

    /// Incremented on every upload, so holders of the old handles can tell.
    pub fn generation(&self) -> u64 {
        self.device.lock().generation
    }

    /// Release the device image and sampler. The device must be idle.
    pub fn destroy(&self) {
        let mut gpu = self.device.lock();
        gpu.image = None;
        gpu.sampler = None;
        gpu.uploaded = 0;
    }
}

/// Pixel origin and layer of icon `index`.
fn cell_origin(index: usize) -> (usize, usize, usize) {
    let per_layer = ICONS_PER_LAYER as usize;
    let per_row = ICONS_PER_ROW as usize;
    let layer = index / per_layer;
    let cell = index % per_layer;
    (
        (cell % per_row) * ICON_SIZE as usize,
        (cell / per_row) * ICON_SIZE as usize,
        layer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas() -> IconTextureAtlas {
        IconTextureAtlas::new(Box::new(BuiltinIcons))
    }

    #[test]
    fn reserved_indices() {
        let atlas = atlas();
        assert_eq!(atlas.add_icon(TRANSPARENT_ICON), TRANSPARENT_ICON_INDEX);
        assert_eq!(atlas.add_icon(UNKNOWN_ICON), UNKNOWN_ICON_INDEX);
        assert_eq!(atlas.icon_count(), 2);
    }

    #[test]
    fn indices_are_stable() {
        let atlas = atlas();
        let circle = atlas.add_icon("circle");
        let square = atlas.add_icon("square");
        assert_ne!(circle, square);
        assert_eq!(atlas.add_icon("circle"), circle);
        assert_eq!(atlas.index_of("square"), Some(square));
    }

    #[test]
    fn unknown_names_fall_back() {
        let atlas = atlas();
        assert_eq!(atlas.add_icon("no such icon"), UNKNOWN_ICON_INDEX);
        assert_eq!(atlas.icon_count(), 2);
    }

    #[test]
    fn new_atlas_needs_upload() {
        assert!(atlas().needs_update());
    }

    #[test]
    fn cell_layout() {
        assert_eq!(cell_origin(0), (0, 0, 0));
        assert_eq!(cell_origin(9), (64, 64, 0));
        assert_eq!(cell_origin(64), (0, 0, 1));
    }

    #[test]
    fn transparent_icon_is_empty() {
        let mut pixels = vec![0u8; ICON_BYTES];
        BuiltinIcons.render(TRANSPARENT_ICON, &mut pixels);
        assert!(pixels.iter().all(|&b| b == 0));

        BuiltinIcons.render("circle", &mut pixels);
        let centre = ((ICON_SIZE / 2) * ICON_SIZE + ICON_SIZE / 2) as usize * 4;
        assert_eq!(pixels[centre + 3], 255);
    }
}
