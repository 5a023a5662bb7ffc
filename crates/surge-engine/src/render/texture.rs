use anyhow::{Context, Result};
use glam::Vec2;

/// Layer of a [`TextureArray`].
///
/// Stands in for a bindless texture handle: records carry the layer index and the
/// shader selects it from the array bound for the whole batch.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct TextureRef(pub u32);

impl TextureRef {
    #[inline]
    pub const fn layer(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TextureArrayDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
    pub filter: wgpu::FilterMode,
}

impl Default for TextureArrayDesc<'_> {
    fn default() -> Self {
        Self {
            label: "textures",
            width: 256,
            height: 256,
            layers: 1,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            filter: wgpu::FilterMode::Linear,
        }
    }
}

/// Same-sized 2D images stored as the layers of one texture, plus sampler and
/// bind group (`@binding(0)` texture array, `@binding(1)` sampler).
pub struct TextureArray {
    texture: wgpu::Texture,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
    layers: u32,
    texel_size: u32,
}

impl TextureArray {
    pub fn new(device: &wgpu::Device, desc: &TextureArrayDesc<'_>) -> Result<Self> {
        anyhow::ensure!(
            desc.width > 0 && desc.height > 0 && desc.layers > 0,
            "texture array `{}` has an empty extent",
            desc.label
        );

        let limits = device.limits();
        anyhow::ensure!(
            desc.layers <= limits.max_texture_array_layers,
            "texture array `{}`: {} layers exceed the device limit of {}",
            desc.label,
            desc.layers,
            limits.max_texture_array_layers
        );
        anyhow::ensure!(
            desc.width.max(desc.height) <= limits.max_texture_dimension_2d,
            "texture array `{}`: {}x{} exceeds the device limit of {}",
            desc.label,
            desc.width,
            desc.height,
            limits.max_texture_dimension_2d
        );

        let texel_size = desc
            .format
            .block_copy_size(None)
            .with_context(|| format!("texture array `{}`: unsupported format", desc.label))?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surge texture array bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.label),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        log::debug!(
            "created texture array `{}`: {}x{} x {} layers",
            desc.label,
            desc.width,
            desc.height,
            desc.layers
        );

        Ok(Self {
            texture,
            layout,
            bind_group,
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            texel_size,
        })
    }

    /// Uploads a full layer of tightly packed texels.
    pub fn write_layer(&self, queue: &wgpu::Queue, layer: TextureRef, texels: &[u8]) -> Result<()> {
        self.write_region(queue, layer, 0, 0, self.width, self.height, texels)
    }

    /// Uploads a `w`x`h` block of tightly packed texels at `(x, y)` of `layer`.
    #[allow(clippy::too_many_arguments)]
    pub fn write_region(
        &self,
        queue: &wgpu::Queue,
        layer: TextureRef,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        texels: &[u8],
    ) -> Result<()> {
        anyhow::ensure!(self.contains(layer), "layer {} out of range", layer.0);
        anyhow::ensure!(
            x + w <= self.width && y + h <= self.height,
            "block {w}x{h} at ({x}, {y}) exceeds {}x{}",
            self.width,
            self.height
        );
        let expected = (w * h * self.texel_size) as usize;
        anyhow::ensure!(
            texels.len() == expected,
            "expected {expected} bytes of texel data, got {}",
            texels.len()
        );
        if w == 0 || h == 0 {
            return Ok(());
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: layer.0 },
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * self.texel_size),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    #[inline]
    pub fn contains(&self, layer: TextureRef) -> bool {
        layer.0 < self.layers
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Layer size in pixels.
    pub fn dims(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }
}
