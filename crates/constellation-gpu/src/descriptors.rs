//! Descriptor set management.

use crate::device::{DescriptorBinding, DescriptorWrite};
use crate::error::Result;
use ash::vk;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    /// Create a new builder.
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add every binding in `bindings`, one descriptor each.
    #[must_use]
    pub fn bindings(self, bindings: &[DescriptorBinding]) -> Self {
        bindings.iter().fold(self, |builder, b| {
            builder.binding(b.binding, b.descriptor_type, 1, b.stages)
        })
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a descriptor pool whose sets can be freed individually.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_descriptor_pool(
    device: &ash::Device,
    max_sets: u32,
    pool_sizes: &[vk::DescriptorPoolSize],
) -> Result<vk::DescriptorPool> {
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(pool_sizes)
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

    let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
    Ok(pool)
}

/// Allocate descriptor sets.
///
/// # Safety
/// The device and pool must be valid.
pub unsafe fn allocate_descriptor_sets(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layouts: &[vk::DescriptorSetLayout],
) -> Result<Vec<vk::DescriptorSet>> {
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(layouts);

    let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
    Ok(sets)
}

/// Apply a batch of descriptor writes to one set.
///
/// # Safety
/// The device, set and every referenced handle must be valid.
pub unsafe fn write_descriptor_set(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    writes: &[DescriptorWrite],
) {
    // Infos must outlive the write structs that point at them
    let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
        .iter()
        .map(|write| match *write {
            DescriptorWrite::UniformBuffer { buffer, range, .. } => {
                [vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range)]
            }
            _ => [vk::DescriptorBufferInfo::default()],
        })
        .collect();
    let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = writes
        .iter()
        .map(|write| match *write {
            DescriptorWrite::CombinedImageSampler { sampler, view, .. } => {
                [vk::DescriptorImageInfo::default()
                    .sampler(sampler)
                    .image_view(view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)]
            }
            _ => [vk::DescriptorImageInfo::default()],
        })
        .collect();
    let texel_views: Vec<[vk::BufferView; 1]> = writes
        .iter()
        .map(|write| match *write {
            DescriptorWrite::TexelBuffer { view, .. } => [view],
            _ => [vk::BufferView::null()],
        })
        .collect();

    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .enumerate()
        .map(|(i, write)| {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(dst_set)
                .dst_binding(write.binding());
            match write {
                DescriptorWrite::UniformBuffer { .. } => base
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos[i]),
                DescriptorWrite::TexelBuffer { .. } => base
                    .descriptor_type(vk::DescriptorType::UNIFORM_TEXEL_BUFFER)
                    .texel_buffer_view(&texel_views[i]),
                DescriptorWrite::CombinedImageSampler { .. } => base
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[i]),
            }
        })
        .collect();

    unsafe { device.update_descriptor_sets(&vk_writes, &[]) };
}
