// Synchronization primitives
//
// One FrameSync per frame in flight: semaphores for GPU-GPU ordering
// (acquire -> render -> present) and a fence for CPU reuse of the slot.

use anyhow::Result;
use ash::vk;

use super::Device;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first frame's wait falls through
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
