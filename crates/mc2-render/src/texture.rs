//! Sampled RGBA textures.

use ash::vk;
use mc2_gpu::{GpuDevice, GpuError, GpuImage, Result, ShaderReadOnly, StagingBuffer};

/// Color format every texture is uploaded as.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Wrap decoded pixels, checking the buffer holds exactly `width * height` texels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidState(format!(
                "Texture has zero extent {width}x{height}"
            )));
        }
        let expected = u64::from(width) * u64::from(height) * 4;
        if pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "Texture {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Two-color checkerboard with square cells of `cell` texels.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);
        let pixels = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .flat_map(|(x, y)| if (x / cell + y / cell) % 2 == 0 { a } else { b })
            .collect();
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// `None` disables anisotropic filtering.
    pub max_anisotropy: Option<f32>,
}

impl SamplerSettings {
    /// Nearest filtering with repeat addressing, anisotropy up to `limit`.
    pub fn nearest_repeat(limit: f32) -> Self {
        Self {
            filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: (limit >= 1.0).then_some(limit),
        }
    }
}

/// An owned sampler.
pub struct Sampler {
    handle: vk::Sampler,
    device: GpuDevice,
}

impl Sampler {
    pub fn new(device: &GpuDevice, settings: SamplerSettings) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(settings.filter)
            .min_filter(settings.filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(settings.address_mode)
            .address_mode_v(settings.address_mode)
            .address_mode_w(settings.address_mode)
            .anisotropy_enable(settings.max_anisotropy.is_some())
            .max_anisotropy(settings.max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0);

        let handle = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.handle, None);
        }
    }
}

/// An uploaded image plus the sampler it is read through.
pub struct Texture {
    image: GpuImage<ShaderReadOnly>,
    sampler: Sampler,
}

impl Texture {
    /// Upload `data` and create its sampler.
    pub fn upload(device: &GpuDevice, data: &TextureData) -> Result<Self> {
        let source = StagingBuffer::from_bytes(
            device,
            vk::BufferUsageFlags::TRANSFER_SRC,
            data.pixels(),
            "texture pixels",
        )?;

        let image = GpuImage::new(
            device,
            TEXTURE_FORMAT,
            data.extent(),
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageAspectFlags::COLOR,
            "texture",
        )?
        .fill(&source)?;

        let caps = device.capabilities();
        let limit = if caps.supports_sampler_anisotropy {
            caps.max_sampler_anisotropy
        } else {
            0.0
        };
        let sampler = Sampler::new(device, SamplerSettings::nearest_repeat(limit))?;

        tracing::debug!("Uploaded texture {}x{}", data.width(), data.height());

        Ok(Self { image, sampler })
    }

    pub fn image(&self) -> &GpuImage<ShaderReadOnly> {
        &self.image
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_count_must_match_extent() {
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());
        assert!(TextureData::new(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let white = [255, 255, 255, 255];
        let black = [0, 0, 0, 255];
        let board = TextureData::checkerboard(4, 2, white, black);
        assert_eq!(board.pixels().len(), 4 * 4 * 4);

        let texel = |x: usize, y: usize| &board.pixels()[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), white);
        assert_eq!(texel(1, 1), white);
        assert_eq!(texel(2, 0), black);
        assert_eq!(texel(0, 2), black);
        assert_eq!(texel(3, 3), white);
    }

    #[test]
    fn anisotropy_follows_device_limit() {
        let settings = SamplerSettings::nearest_repeat(16.0);
        assert_eq!(settings.max_anisotropy, Some(16.0));
        assert_eq!(settings.address_mode, vk::SamplerAddressMode::REPEAT);
        assert_eq!(settings.filter, vk::Filter::NEAREST);

        assert_eq!(SamplerSettings::nearest_repeat(0.0).max_anisotropy, None);
    }
}
