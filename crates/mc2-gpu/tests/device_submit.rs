//! Blocking submission and fence behavior on a real device.
//!
//! These tests need a Vulkan driver; they print a note and pass when none
//! is available.

use std::sync::Arc;

use ash::vk;
use mc2_gpu::{
    Fence, GpuDevice, GpuError, GpuInstance, InstanceConfig, ResidentBuffer, StagingBuffer,
};

fn headless_device() -> Option<GpuDevice> {
    let config = InstanceConfig::new("mc2-gpu-tests").with_validation(false);
    let instance = match GpuInstance::new(&config, None) {
        Ok(instance) => Arc::new(instance),
        Err(e) => {
            eprintln!("skipping: no Vulkan instance ({e})");
            return None;
        }
    };
    match GpuDevice::headless(instance) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping: no usable GPU ({e})");
            None
        }
    }
}

#[test]
fn fence_created_signaled_until_reset() {
    let Some(device) = headless_device() else {
        return;
    };

    let fence = Fence::new(&device, true).unwrap();
    assert!(fence.is_signaled().unwrap());
    fence.wait().unwrap();

    fence.reset().unwrap();
    assert!(!fence.is_signaled().unwrap());

    let unsignaled = Fence::new(&device, false).unwrap();
    assert!(!unsignaled.is_signaled().unwrap());
}

#[test]
fn failed_recording_does_not_block_next_upload() {
    let Some(device) = headless_device() else {
        return;
    };

    let err = device
        .immediate_submit(|_, _| Err(GpuError::InvalidState("recording aborted".to_string())))
        .unwrap_err();
    assert!(matches!(err, GpuError::InvalidState(_)));

    // Runs twice so the buffer has to come back from a reset, not a fresh pool.
    for _ in 0..2 {
        let data: Vec<u8> = (0..64u8).collect();
        let resident = ResidentBuffer::upload(
            &device,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &data,
            "after failure",
        )
        .unwrap();

        let readback = StagingBuffer::new(
            &device,
            resident.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            "readback",
        )
        .unwrap();
        readback.copy_from(&resident).unwrap();
        assert_eq!(readback.read().unwrap(), data);
    }
}

#[test]
fn empty_recording_submits() {
    let Some(device) = headless_device() else {
        return;
    };

    device.immediate_submit(|_, _| Ok(())).unwrap();
    device.immediate_submit(|_, _| Ok(())).unwrap();
}
