//! Descriptor pool sized from the renderables' aggregate requirements.

use crate::error::Result;
use ash::vk;
use constellation_gpu::{Owned, RenderDevice};
use std::sync::Arc;

/// Number of core descriptor types tracked (`SAMPLER` through `INPUT_ATTACHMENT`).
pub const DESCRIPTOR_TYPE_COUNT: usize = 11;

/// Descriptor counts per type plus a set count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorPoolRequirements {
    counts: [u32; DESCRIPTOR_TYPE_COUNT],
    sets: u32,
}

fn type_index(descriptor_type: vk::DescriptorType) -> Option<usize> {
    usize::try_from(descriptor_type.as_raw())
        .ok()
        .filter(|&i| i < DESCRIPTOR_TYPE_COUNT)
}

fn type_at(index: usize) -> vk::DescriptorType {
    vk::DescriptorType::from_raw(i32::try_from(index).unwrap_or_default())
}

impl DescriptorPoolRequirements {
    pub const fn new() -> Self {
        Self {
            counts: [0; DESCRIPTOR_TYPE_COUNT],
            sets: 0,
        }
    }

    /// Add `count` descriptors of `descriptor_type`.
    pub fn add(&mut self, descriptor_type: vk::DescriptorType, count: u32) {
        match type_index(descriptor_type) {
            Some(i) => self.counts[i] = self.counts[i].saturating_add(count),
            None => tracing::warn!("Unsupported descriptor type {:?}", descriptor_type),
        }
    }

    pub fn add_sets(&mut self, count: u32) {
        self.sets = self.sets.saturating_add(count);
    }

    pub fn count(&self, descriptor_type: vk::DescriptorType) -> u32 {
        type_index(descriptor_type).map_or(0, |i| self.counts[i])
    }

    pub const fn sets(&self) -> u32 {
        self.sets
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.sets == 0 && self.counts.iter().all(|&c| c == 0)
    }

    /// Global requirements plus per-image requirements for every image.
    pub fn total(global: &Self, per_image: &Self, image_count: u32) -> Self {
        let mut total = *global;
        for (t, p) in total.counts.iter_mut().zip(per_image.counts) {
            *t = t.saturating_add(p.saturating_mul(image_count));
        }
        total.sets = total
            .sets
            .saturating_add(per_image.sets.saturating_mul(image_count));
        total
    }

    /// Whether every count in `self` is at least the matching count in `other`.
    pub fn covers(&self, other: &Self) -> bool {
        self.sets >= other.sets && self.counts.iter().zip(other.counts).all(|(&a, b)| a >= b)
    }

    /// Non-zero pool sizes.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(i, &count)| vk::DescriptorPoolSize {
                ty: type_at(i),
                descriptor_count: count,
            })
            .collect()
    }
}

/// A descriptor pool with known capacity.
pub struct DescriptorPool {
    pool: Owned<vk::DescriptorPool>,
    capacity: DescriptorPoolRequirements,
}

impl DescriptorPool {
    /// Create a pool holding `requirements` plus `per_image` for each of
    /// `image_count` images.
    pub fn new(
        device: &Arc<dyn RenderDevice>,
        image_count: u32,
        requirements: &DescriptorPoolRequirements,
        per_image: &DescriptorPoolRequirements,
    ) -> Result<Self> {
        let mut capacity = DescriptorPoolRequirements::total(requirements, per_image, image_count);

        // Vulkan rejects empty pools
        if capacity.sets == 0 {
            capacity.sets = 1;
        }
        if capacity.counts.iter().all(|&c| c == 0) {
            capacity.add(vk::DescriptorType::UNIFORM_BUFFER, 1);
        }

        let pool = device.create_descriptor_pool(capacity.sets, &capacity.pool_sizes())?;
        tracing::debug!(
            "Descriptor pool created: {} sets, {:?}",
            capacity.sets,
            capacity.pool_sizes()
        );

        Ok(Self {
            pool: Owned::new(device.clone(), pool),
            capacity,
        })
    }

    /// Whether this pool can hold the given requirements without recreation.
    pub fn can_accommodate(
        &self,
        image_count: u32,
        requirements: &DescriptorPoolRequirements,
        per_image: &DescriptorPoolRequirements,
    ) -> bool {
        self.capacity.covers(&DescriptorPoolRequirements::total(
            requirements,
            per_image,
            image_count,
        ))
    }

    pub const fn capacity(&self) -> &DescriptorPoolRequirements {
        &self.capacity
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool.handle()
    }
}

/// Descriptor sets freed back to their pool when dropped.
///
/// Must be dropped before the pool they came from.
pub struct DescriptorSets {
    device: Arc<dyn RenderDevice>,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorSets {
    /// Allocate `count` sets with the same layout.
    pub fn allocate(
        device: &Arc<dyn RenderDevice>,
        pool: &DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> Result<Self> {
        let layouts = vec![layout; count as usize];
        let sets = device.allocate_descriptor_sets(pool.handle(), &layouts)?;
        Ok(Self {
            device: device.clone(),
            pool: pool.handle(),
            sets,
        })
    }

    pub fn get(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = vk::DescriptorSet> + '_ {
        self.sets.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Drop for DescriptorSets {
    fn drop(&mut self) {
        self.device.free_descriptor_sets(self.pool, &self.sets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icons_per_image() -> DescriptorPoolRequirements {
        let mut reqs = DescriptorPoolRequirements::new();
        reqs.add(vk::DescriptorType::UNIFORM_BUFFER, 3);
        reqs.add(vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 2);
        reqs.add(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);
        reqs.add_sets(1);
        reqs
    }

    #[test]
    fn total_multiplies_per_image_by_image_count() {
        let mut global = DescriptorPoolRequirements::new();
        global.add(vk::DescriptorType::UNIFORM_BUFFER, 1);

        let total = DescriptorPoolRequirements::total(&global, &icons_per_image(), 3);
        assert_eq!(total.count(vk::DescriptorType::UNIFORM_BUFFER), 10);
        assert_eq!(total.count(vk::DescriptorType::UNIFORM_TEXEL_BUFFER), 6);
        assert_eq!(total.count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 3);
        assert_eq!(total.sets(), 3);
    }

    #[test]
    fn covers_checks_every_type_and_sets() {
        let small = DescriptorPoolRequirements::total(
            &DescriptorPoolRequirements::new(),
            &icons_per_image(),
            2,
        );
        let large = DescriptorPoolRequirements::total(
            &DescriptorPoolRequirements::new(),
            &icons_per_image(),
            3,
        );
        assert!(large.covers(&small));
        assert!(!small.covers(&large));

        let mut more_sets = small;
        more_sets.add_sets(1);
        assert!(!small.covers(&more_sets));
    }

    #[test]
    fn pool_sizes_skip_zero_counts() {
        let sizes = icons_per_image().pool_sizes();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.iter().any(|s| s.ty == vk::DescriptorType::UNIFORM_TEXEL_BUFFER
            && s.descriptor_count == 2));
    }

    #[test]
    fn reset_clears_everything() {
        let mut reqs = icons_per_image();
        assert!(!reqs.is_empty());
        reqs.reset();
        assert!(reqs.is_empty());
    }
}
