//! wgpu renderer that draws a single RGBA texture over the whole window.

use anyhow::{anyhow, Context};
use wgpu::*;
use winit::window::Window;

use crate::image::Resolution;

const BACKGROUND: Color = Color::BLACK;

struct Texture {
    inner: wgpu::Texture,
    size: Extent3d,
    label: String,
    format: TextureFormat,
}

impl Texture {
    fn empty(device: &Device, label: &str) -> Self {
        let format = TextureFormat::Rgba8UnormSrgb;
        let size = Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        Self {
            label: label.to_string(),
            inner: create_texture(device, label, size, format),
            size,
            format,
        }
    }

    /// Uploads `data` to the texture, reallocating it if `size` has changed.
    ///
    /// Returns whether the texture was reallocated.
    fn update(&mut self, device: &Device, queue: &Queue, size: Extent3d, data: &[u8]) -> bool {
        let mut reallocated = false;

        if self.size != size {
            log::trace!(
                "reallocating texture '{}' ({}x{} -> {}x{})",
                self.label,
                self.size.width,
                self.size.height,
                size.width,
                size.height
            );
            reallocated = true;
            self.inner = create_texture(device, &self.label, size, self.format);
            self.size = size;
        }

        queue.write_texture(
            ImageCopyTexture {
                texture: &self.inner,
                mip_level: 0,
                origin: Origin3d::default(),
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );

        reallocated
    }
}

fn create_texture(device: &Device, label: &str, size: Extent3d, format: TextureFormat) -> wgpu::Texture {
    device.create_texture(&TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_bind_group(device: &Device, layout: &BindGroupLayout, texture: &Texture) -> BindGroup {
    let sampler = device.create_sampler(&SamplerDescriptor::default());
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("textured_quad"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(
                    &texture.inner.create_view(&Default::default()),
                ),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&sampler),
            },
        ],
    })
}

/// Renders the window contents.
///
/// Field order matters: the surface must be destroyed before the window it was created for.
pub struct Renderer {
    surface: Surface,
    surface_format: TextureFormat,
    adapter: Adapter,
    device: Device,
    queue: Queue,
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    bind_group: BindGroup,
    texture: Texture,
    resolution: Resolution,
    window: Window,
}

impl Renderer {
    pub async fn new(window: Window, resolution: Resolution) -> anyhow::Result<Self> {
        // The OpenGL backend panics spuriously, so don't enable it.
        let backends = Backends::PRIMARY;
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        // Safety: `Renderer` owns the window and drops it after the surface.
        let surface = unsafe { instance.create_surface(&window) }
            .context("failed to create window surface")?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        let info = adapter.get_info();
        log::info!("using graphics adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: None,
                    features: Features::empty(),
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        let formats = surface.get_capabilities(&adapter).formats;
        let surface_format = formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| formats.first().copied())
            .ok_or_else(|| anyhow!("adapter cannot render to window surface"))?;

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("fullscreen texture shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: false },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("textured_quad"),
            layout: Some(&device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            vertex: VertexState {
                module: &shader,
                entry_point: "vert",
                buffers: &[],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: "frag",
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    write_mask: ColorWrites::ALL,
                    blend: None,
                })],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
        });

        let texture = Texture::empty(&device, "canvas");
        let bind_group = create_bind_group(&device, &bind_group_layout, &texture);

        let this = Self {
            surface,
            surface_format,
            adapter,
            device,
            queue,
            pipeline,
            bind_group_layout,
            bind_group,
            texture,
            resolution,
            window,
        };
        this.configure_surface();
        Ok(this)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Replaces the displayed image with `data`, an RGBA8 image of size `res`.
    pub fn update_texture(&mut self, res: Resolution, data: &[u8]) -> anyhow::Result<()> {
        if res.num_pixels() * 4 != data.len() as u64 {
            anyhow::bail!(
                "image data has {} bytes, expected {} for {res}",
                data.len(),
                res.num_pixels() * 4
            );
        }

        let size = Extent3d {
            width: res.width(),
            height: res.height(),
            depth_or_array_layers: 1,
        };
        if self.texture.update(&self.device, &self.queue, size, data) {
            // The bind group references the old texture.
            self.bind_group = create_bind_group(&self.device, &self.bind_group_layout, &self.texture);
        }
        Ok(())
    }

    pub fn redraw(&mut self) -> anyhow::Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.configure_surface();
                self.surface
                    .get_current_texture()
                    .context("failed to acquire next frame after reconfiguring the surface")?
            }
            Err(e) => return Err(e).context("failed to acquire frame"),
        };
        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(BACKGROUND),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        self.queue.submit([encoder.finish()]);
        frame.present();
        Ok(())
    }

    fn configure_surface(&self) {
        let size = self.window.inner_size();
        log::debug!(
            "configuring window surface at {}x{} (format: {:?})",
            size.width,
            size.height,
            self.surface_format,
        );
        if size.width != self.resolution.width() || size.height != self.resolution.height() {
            // The window is not resizable, but window managers may still pick another size.
            log::warn!(
                "window dimensions {}x{} do not match configured size {}",
                size.width,
                size.height,
                self.resolution,
            );
        }
        let alpha_mode = self
            .surface
            .get_capabilities(&self.adapter)
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(CompositeAlphaMode::Auto);
        self.surface.configure(
            &self.device,
            &SurfaceConfiguration {
                usage: TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width: size.width.max(1),
                height: size.height.max(1),
                present_mode: PresentMode::Fifo,
                alpha_mode,
                view_formats: Vec::new(),
            },
        );
    }
}
