use image::RgbaImage;

use crate::{
    config::DEFAULT_WORKING_SIZE,
    error::{WallprinterError, WallprinterResult},
    geometry::PlacementArea,
    guide::{GuideMode, render_guide},
    letterbox::{DEFAULT_PAD_COLOR, pad_to_square},
    model::{
        AspectRatio, EditRequest, GenerateRequest, ImageModel, InlineImage, artwork_prompt,
        placement_prompt, scene_edit_prompt,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub struct PlaceOpts {
    pub guide_mode: GuideMode,
    pub working_size: u32,
    pub extra_prompt: Option<String>,
}

impl Default for PlaceOpts {
    fn default() -> Self {
        Self {
            guide_mode: GuideMode::Paste,
            working_size: DEFAULT_WORKING_SIZE,
            extra_prompt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Placement {
    /// Composite at the scene's original dimensions.
    pub image: RgbaImage,
    /// The guide that was sent, at the scene's original dimensions.
    pub guide: RgbaImage,
    pub model_text: Option<String>,
}

/// Guide, pad, ask the model, crop back.
#[tracing::instrument(
    skip_all,
    fields(scene_w = scene.width(), scene_h = scene.height(), points = area.len())
)]
pub fn place_artwork<M: ImageModel + ?Sized>(
    model: &M,
    scene: &RgbaImage,
    artwork: &RgbaImage,
    area: &PlacementArea,
    opts: &PlaceOpts,
) -> WallprinterResult<Placement> {
    if area.area() <= f64::EPSILON {
        return Err(WallprinterError::validation("placement area has no surface"));
    }

    let guide = render_guide(scene, Some(artwork), area, opts.guide_mode)?;
    let (scene_sq, lb) = pad_to_square(scene, opts.working_size, DEFAULT_PAD_COLOR)?;
    let (guide_sq, _) = pad_to_square(&guide, opts.working_size, DEFAULT_PAD_COLOR)?;

    let req = EditRequest {
        prompt: placement_prompt(opts.extra_prompt.as_deref()),
        images: vec![InlineImage::png(&scene_sq)?, InlineImage::png(&guide_sq)?],
    };
    let generated = model.edit(&req)?;
    let result = generated.decode()?;
    tracing::debug!(
        result_w = result.width(),
        result_h = result.height(),
        "model returned composite"
    );

    Ok(Placement {
        image: lb.crop(&result)?,
        guide,
        model_text: generated.text,
    })
}

/// Free-text edit of the scene itself, keeping its dimensions.
#[tracing::instrument(
    skip(model, scene),
    fields(scene_w = scene.width(), scene_h = scene.height())
)]
pub fn edit_scene<M: ImageModel + ?Sized>(
    model: &M,
    scene: &RgbaImage,
    instruction: &str,
    working_size: u32,
) -> WallprinterResult<RgbaImage> {
    if instruction.trim().is_empty() {
        return Err(WallprinterError::validation("edit instruction must not be empty"));
    }
    let (scene_sq, lb) = pad_to_square(scene, working_size, DEFAULT_PAD_COLOR)?;
    let req = EditRequest {
        prompt: scene_edit_prompt(instruction),
        images: vec![InlineImage::png(&scene_sq)?],
    };
    let result = model.edit(&req)?.decode()?;
    lb.crop(&result)
}

#[tracing::instrument(skip(model))]
pub fn generate_artwork<M: ImageModel + ?Sized>(
    model: &M,
    description: &str,
    aspect_ratio: AspectRatio,
) -> WallprinterResult<RgbaImage> {
    if description.trim().is_empty() {
        return Err(WallprinterError::validation("artwork description must not be empty"));
    }
    let req = GenerateRequest {
        prompt: artwork_prompt(description),
        aspect_ratio,
    };
    model.generate(&req)?.decode()
}
