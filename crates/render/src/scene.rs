//! The world as drawn by every pass: ground, hero, obstacles, finish marker.

use crate::context::{
    BindingError, ContextError, GraphicsContext, MeshId, ProgramId, TextureBinding, TextureId,
    UniformValue,
};
use crate::programs::{TEXTURED, TEXTURED_PROGRAM};
use envprobe_assets::{AssetError, AssetTable};
use glam::{Mat4, Vec3, Vec4};

/// Background color of every pass.
pub const CLEAR_COLOR: [f32; 4] = [0.88, 0.65, 0.15, 1.0];

/// Scene upload failed.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Placement of the static actors.
///
/// Built once per pipeline from the race configuration. The renderer owns
/// this copy; later edits to the configuration do not reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLayout {
    pub ground: Mat4,
    pub ground_tint: Vec4,
    /// Obstacle centers, fixed for the lifetime of the scene.
    pub obstacles: Vec<Vec3>,
    pub obstacle_scale: Vec3,
    pub finish: Vec3,
    pub finish_scale: Vec3,
}

impl SceneLayout {
    pub fn new(obstacles: &[Vec3], finish: Vec3) -> Self {
        Self {
            ground: Mat4::from_scale(Vec3::new(3000.0, 1.0, 3000.9))
                * Mat4::from_translation(Vec3::X),
            ground_tint: Vec4::new(0.96, 0.91, 0.64, 1.0),
            obstacles: obstacles.to_vec(),
            obstacle_scale: Vec3::new(0.05, 0.03, 0.04),
            finish,
            finish_scale: Vec3::new(0.25, 0.5, 0.1),
        }
    }
}

/// Names of the assets one scene actor is drawn with.
const ACTORS: [&str; 4] = ["ground", "hero", "obstacle", "finish"];

/// A mesh plus the texture it is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    pub mesh: MeshId,
    pub texture: TextureId,
}

/// GPU handles for the scene, resolved from the asset table once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneAssets {
    pub program: ProgramId,
    pub ground: Drawable,
    pub hero: Drawable,
    pub obstacle: Drawable,
    pub finish: Drawable,
}

impl SceneAssets {
    pub fn upload<C: GraphicsContext>(ctx: &mut C, assets: &AssetTable) -> Result<Self, SceneError> {
        let mut meshes = Vec::with_capacity(ACTORS.len());
        let mut textures = Vec::with_capacity(ACTORS.len());
        let result = Self::upload_all(ctx, assets, &mut meshes, &mut textures);
        if result.is_err() {
            for mesh in meshes {
                ctx.delete_mesh(mesh);
            }
            for texture in textures {
                ctx.delete_texture(texture);
            }
        }
        result
    }

    fn upload_all<C: GraphicsContext>(
        ctx: &mut C,
        assets: &AssetTable,
        meshes: &mut Vec<MeshId>,
        textures: &mut Vec<TextureId>,
    ) -> Result<Self, SceneError> {
        for name in ACTORS {
            meshes.push(ctx.create_mesh(name, assets.mesh(name)?)?);
            textures.push(ctx.create_texture_2d(name, assets.image(name)?)?);
        }
        let program = ctx.create_program(&TEXTURED_PROGRAM, assets.shader(TEXTURED)?)?;
        tracing::debug!(actors = ACTORS.len(), "scene assets uploaded");

        let drawable = |i: usize| Drawable {
            mesh: meshes[i],
            texture: textures[i],
        };
        Ok(Self {
            program,
            ground: drawable(0),
            hero: drawable(1),
            obstacle: drawable(2),
            finish: drawable(3),
        })
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        for drawable in [self.ground, self.hero, self.obstacle, self.finish] {
            ctx.delete_mesh(drawable.mesh);
            ctx.delete_texture(drawable.texture);
        }
        ctx.delete_program(self.program);
    }
}

/// Draws the world for a given view-projection matrix.
///
/// Every call issues the same sequence of draws and uniform names; only the
/// matrices change. Called once per capture face and once for the main view.
#[derive(Debug)]
pub struct SceneRenderer {
    layout: SceneLayout,
    assets: SceneAssets,
}

impl SceneRenderer {
    pub fn new(layout: SceneLayout, assets: SceneAssets) -> Self {
        Self { layout, assets }
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    pub fn assets(&self) -> &SceneAssets {
        &self.assets
    }

    /// Number of draws issued per call.
    pub fn draw_count(&self) -> usize {
        3 + self.layout.obstacles.len()
    }

    pub fn render<C: GraphicsContext>(&self, ctx: &mut C, view_projection: Mat4, hero: Mat4) {
        ctx.clear(CLEAR_COLOR, 1.0);
        ctx.use_program(self.assets.program);
        ctx.bind_sampler(0, None);

        let layout = &self.layout;
        draw_textured(
            ctx,
            "ground",
            self.assets.ground,
            view_projection * layout.ground,
            layout.ground_tint,
        );
        draw_textured(ctx, "hero", self.assets.hero, view_projection * hero, Vec4::ONE);
        for position in &layout.obstacles {
            let model = Mat4::from_translation(*position) * Mat4::from_scale(layout.obstacle_scale);
            draw_textured(
                ctx,
                "obstacle",
                self.assets.obstacle,
                view_projection * model,
                Vec4::ONE,
            );
        }
        let finish = Mat4::from_translation(layout.finish) * Mat4::from_scale(layout.finish_scale);
        draw_textured(
            ctx,
            "finish",
            self.assets.finish,
            view_projection * finish,
            Vec4::ONE,
        );
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        self.assets.release(ctx);
    }
}

fn draw_textured<C: GraphicsContext>(
    ctx: &mut C,
    label: &'static str,
    drawable: Drawable,
    mvp: Mat4,
    tint: Vec4,
) {
    if let Err(err) = try_draw_textured(ctx, drawable, mvp, tint) {
        tracing::warn!(draw = label, %err, "skipping draw");
    }
}

fn try_draw_textured<C: GraphicsContext>(
    ctx: &mut C,
    drawable: Drawable,
    mvp: Mat4,
    tint: Vec4,
) -> Result<(), BindingError> {
    ctx.set_uniform("MVP", UniformValue::Mat4(mvp))?;
    ctx.set_uniform("tint", UniformValue::Vec4(tint))?;
    ctx.bind_texture(0, TextureBinding::Texture2d(drawable.texture));
    ctx.set_uniform("texture_sampler", UniformValue::Sampler(0))?;
    ctx.draw(drawable.mesh)
}
