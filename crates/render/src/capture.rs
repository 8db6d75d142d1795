//! Six-face cube capture: one offscreen target per face, all writing into a
//! shared environment cube texture.

use crate::context::{
    ContextError, CubeTextureDesc, CubeTextureId, FaceAttachment, FramebufferId,
    FramebufferStatus, GraphicsContext, IncompleteReason, RenderTarget, SamplerDesc, SamplerId,
    TextureFormat, Viewport,
};
use crate::face::CubeFace;
use envprobe_common::PerspectiveCamera;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Size of the environment cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Edge length of every face in texels. Must be a power of two.
    pub resolution: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self { resolution: 256 }
    }
}

impl EnvironmentConfig {
    pub fn mip_levels(&self) -> u32 {
        mip_level_count(self.resolution)
    }

    pub fn is_valid(&self) -> bool {
        self.resolution.is_power_of_two()
    }
}

/// `ceil(log2(resolution)) + 1`; 1 for resolutions of 0 or 1.
pub fn mip_level_count(resolution: u32) -> u32 {
    if resolution <= 1 {
        return 1;
    }
    u32::BITS - (resolution - 1).leading_zeros() + 1
}

/// Capture pipeline could not be built. Always fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureSetupError {
    #[error("environment resolution {0} is not a power of two")]
    InvalidResolution(u32),
    #[error("failed to allocate {what}: {source}")]
    Allocation {
        what: &'static str,
        #[source]
        source: ContextError,
    },
    #[error("capture target {face} is incomplete: {reason}")]
    IncompleteTarget {
        face: CubeFace,
        #[source]
        reason: IncompleteReason,
    },
}

/// Offscreen target for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureTarget {
    pub face: CubeFace,
    pub framebuffer: FramebufferId,
    pub camera: PerspectiveCamera,
}

/// Owns the environment cube, its depth companion, the sampler used to read
/// it and the six face targets.
///
/// Built once per scene and released once through [`SixFaceCubeCapture::release`],
/// which consumes the value.
#[derive(Debug)]
pub struct SixFaceCubeCapture {
    config: EnvironmentConfig,
    color: CubeTextureId,
    depth: CubeTextureId,
    sampler: SamplerId,
    targets: [CaptureTarget; 6],
}

/// Handles allocated so far; released if setup fails halfway.
#[derive(Default)]
struct Partial {
    cubes: Vec<CubeTextureId>,
    framebuffers: Vec<FramebufferId>,
}

impl Partial {
    fn release<C: GraphicsContext>(self, ctx: &mut C) {
        for fb in self.framebuffers {
            ctx.delete_framebuffer(fb);
        }
        for cube in self.cubes {
            ctx.delete_cube_texture(cube);
        }
    }
}

impl SixFaceCubeCapture {
    pub fn new<C: GraphicsContext>(
        ctx: &mut C,
        config: EnvironmentConfig,
    ) -> Result<Self, CaptureSetupError> {
        if !config.is_valid() {
            return Err(CaptureSetupError::InvalidResolution(config.resolution));
        }
        let mut partial = Partial::default();
        match Self::build(ctx, config, &mut partial) {
            Ok(capture) => {
                tracing::info!(
                    resolution = config.resolution,
                    mips = config.mip_levels(),
                    "environment capture ready"
                );
                Ok(capture)
            }
            Err(err) => {
                tracing::error!(%err, "environment capture setup failed");
                partial.release(ctx);
                Err(err)
            }
        }
    }

    fn build<C: GraphicsContext>(
        ctx: &mut C,
        config: EnvironmentConfig,
        partial: &mut Partial,
    ) -> Result<Self, CaptureSetupError> {
        let color = ctx
            .create_cube_texture(&CubeTextureDesc {
                label: "environment",
                size: config.resolution,
                mip_levels: config.mip_levels(),
                format: TextureFormat::Rgba8Unorm,
            })
            .map_err(|source| CaptureSetupError::Allocation {
                what: "environment cube",
                source,
            })?;
        partial.cubes.push(color);

        let depth = ctx
            .create_cube_texture(&CubeTextureDesc {
                label: "environment-depth",
                size: config.resolution,
                mip_levels: 1,
                format: TextureFormat::Depth16Unorm,
            })
            .map_err(|source| CaptureSetupError::Allocation {
                what: "environment depth cube",
                source,
            })?;
        partial.cubes.push(depth);

        let mut framebuffers = [FramebufferId(0); 6];
        for face in CubeFace::ALL {
            let fb = ctx
                .create_face_framebuffer(
                    FaceAttachment {
                        texture: color,
                        face,
                        mip_level: 0,
                    },
                    FaceAttachment {
                        texture: depth,
                        face,
                        mip_level: 0,
                    },
                )
                .map_err(|source| CaptureSetupError::Allocation {
                    what: "capture framebuffer",
                    source,
                })?;
            partial.framebuffers.push(fb);
            if let FramebufferStatus::Incomplete(reason) = ctx.framebuffer_status(fb) {
                return Err(CaptureSetupError::IncompleteTarget { face, reason });
            }
            framebuffers[face.index()] = fb;
        }

        let sampler = ctx
            .create_sampler(&SamplerDesc::trilinear_repeat())
            .map_err(|source| CaptureSetupError::Allocation {
                what: "environment sampler",
                source,
            })?;

        let targets = CubeFace::ALL.map(|face| CaptureTarget {
            face,
            framebuffer: framebuffers[face.index()],
            camera: face.capture_camera(),
        });

        Ok(Self {
            config,
            color,
            depth,
            sampler,
            targets,
        })
    }

    /// Render the world into all six faces from `position`, then rebuild the
    /// mip chain once.
    ///
    /// `render` receives each face's view-projection matrix with the face's
    /// framebuffer already bound and the viewport set to the full face.
    pub fn capture<C, F>(&mut self, ctx: &mut C, position: Vec3, mut render: F)
    where
        C: GraphicsContext,
        F: FnMut(&mut C, Mat4),
    {
        let size = self.config.resolution;
        for target in &mut self.targets {
            target.camera.position = position;
            ctx.bind_framebuffer(RenderTarget::Framebuffer(target.framebuffer));
            ctx.set_viewport(Viewport::new(size, size));
            tracing::trace!(face = %target.face, ?position, "capturing face");
            render(ctx, target.camera.view_projection());
        }
        ctx.generate_mipmaps(self.color);
    }

    pub fn config(&self) -> EnvironmentConfig {
        self.config
    }

    pub fn cubemap(&self) -> CubeTextureId {
        self.color
    }

    pub fn depth_cubemap(&self) -> CubeTextureId {
        self.depth
    }

    pub fn sampler(&self) -> SamplerId {
        self.sampler
    }

    pub fn targets(&self) -> &[CaptureTarget; 6] {
        &self.targets
    }

    pub fn target(&self, face: CubeFace) -> &CaptureTarget {
        &self.targets[face.index()]
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        for target in &self.targets {
            ctx.delete_framebuffer(target.framebuffer);
        }
        ctx.delete_cube_texture(self.color);
        ctx.delete_cube_texture(self.depth);
        ctx.delete_sampler(self.sampler);
        tracing::debug!("environment capture released");
    }
}
