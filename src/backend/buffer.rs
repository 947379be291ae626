// GPU buffer with aligned per-instance slots
//
// One allocation holds `instance_count` slots of `instance_size` bytes,
// each rounded up to the device's minimum offset alignment. The aligned
// stride is what makes the "one buffer, N slots" pattern work for
// per-frame uniform data bound at dynamic offsets.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use super::Device;

/// Round `instance_size` up to a multiple of `min_offset_alignment`.
/// Alignment 0 (or 1) leaves the size unchanged.
pub fn alignment_size(
    instance_size: vk::DeviceSize,
    min_offset_alignment: vk::DeviceSize,
) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// Byte offset of an aligned slot.
pub fn slot_offset(alignment_size: vk::DeviceSize, index: u32) -> vk::DeviceSize {
    alignment_size * vk::DeviceSize::from(index)
}

pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<NonNull<c_void>>,

    buffer_size: vk::DeviceSize,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> Result<Self> {
        let alignment_size = alignment_size(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * vk::DeviceSize::from(instance_count);

        let (buffer, memory) = device
            .create_buffer(buffer_size, usage, memory_properties)
            .context("Failed to create backing allocation for buffer")?;

        Ok(Self {
            device,
            buffer,
            memory,
            mapped: None,
            buffer_size,
            instance_size,
            instance_count,
            alignment_size,
            usage,
            memory_properties,
        })
    }

    /// Map a range of host-visible memory for writes. Maps the whole
    /// backing store by default (`vk::WHOLE_SIZE`).
    pub fn map(&mut self) -> Result<()> {
        let ptr = unsafe {
            self.device.device.map_memory(
                self.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )
        }
        .context("Failed to map buffer memory")?;
        self.mapped = NonNull::new(ptr);
        Ok(())
    }

    /// Idempotent; also invoked on drop so a mapping can never leak.
    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.device.device.unmap_memory(self.memory) };
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Copy `data` into the mapped region at `offset`. Requires a prior
    /// `map`; writing to an unmapped buffer is a contract violation.
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) {
        let mapped = self
            .mapped
            .expect("Cannot write to unmapped buffer");
        assert!(
            offset + data.len() as vk::DeviceSize <= self.buffer_size,
            "Write of {} bytes at offset {} exceeds buffer size {}",
            data.len(),
            offset,
            self.buffer_size
        );
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
    }

    /// Flush a mapped range to make host writes visible to the device.
    /// Needed for non-coherent memory; harmless otherwise.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> Result<()> {
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(offset)
            .size(size);
        unsafe { self.device.device.flush_mapped_memory_ranges(&[range]) }
            .context("Failed to flush mapped memory range")
    }

    /// Invalidate a mapped range to make device writes visible to the host.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> Result<()> {
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(offset)
            .size(size);
        unsafe { self.device.device.invalidate_mapped_memory_ranges(&[range]) }
            .context("Failed to invalidate mapped memory range")
    }

    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    /// Write one instance's worth of data into the aligned slot `index`.
    pub fn write_to_index(&mut self, data: &[u8], index: u32) {
        assert!(
            data.len() as vk::DeviceSize <= self.instance_size,
            "Instance write of {} bytes exceeds instance size {}",
            data.len(),
            self.instance_size
        );
        self.write_to_buffer(data, slot_offset(self.alignment_size, index));
    }

    pub fn flush_index(&self, index: u32) -> Result<()> {
        self.flush(self.alignment_size, slot_offset(self.alignment_size, index))
    }

    pub fn invalidate_index(&self, index: u32) -> Result<()> {
        self.invalidate(self.alignment_size, slot_offset(self.alignment_size, index))
    }

    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, slot_offset(self.alignment_size, index))
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_properties
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_multiple() {
        assert_eq!(alignment_size(64, 256), 256);
        assert_eq!(alignment_size(256, 256), 256);
        assert_eq!(alignment_size(257, 256), 512);
        assert_eq!(alignment_size(1, 64), 64);
    }

    #[test]
    fn alignment_is_identity_without_constraint() {
        assert_eq!(alignment_size(100, 0), 100);
        assert_eq!(alignment_size(100, 1), 100);
    }

    #[test]
    fn alignment_never_shrinks() {
        for size in [1u64, 3, 64, 65, 200, 256, 1000] {
            for align in [0u64, 1, 16, 64, 256] {
                assert!(alignment_size(size, align) >= size);
            }
        }
    }

    #[test]
    fn aligned_slot_layout() {
        // instance_size=64, count=4, min alignment=256:
        // stride 256, total 1024, slot 2 starts at 512
        let stride = alignment_size(64, 256);
        assert_eq!(stride, 256);
        assert_eq!(stride * 4, 1024);
        assert_eq!(slot_offset(stride, 2), 512);
    }

    #[test]
    fn slot_offsets_step_by_stride() {
        let stride = alignment_size(48, 64);
        assert_eq!(stride, 64);
        assert_eq!(slot_offset(stride, 0), 0);
        assert_eq!(slot_offset(stride, 1), 64);
        assert_eq!(slot_offset(stride, 3), 192);
    }
}
