//! The top-level view state: everything the user has picked, drawn and produced so far.
//!
//! A [`Session`] owns the model and stock clients and drives them. Every remote operation follows
//! the same discipline: clear the previous error, mark the session busy, and on failure record the
//! error's message in [`Session::error`] while leaving the rest of the state as it was.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::{
    error::{WallprinterError, WallprinterResult},
    geometry::{PlacementArea, PolygonEditor},
    imageio,
    model::{AspectRatio, ImageModel},
    place::{self, PlaceOpts},
    stock::{StockPage, StockQuery, StockSource},
};

#[derive(Clone, Debug, PartialEq)]
pub enum ArtworkSource {
    Upload,
    Generated { prompt: String },
    Stock { id: String, author: String },
}

#[derive(Clone, Debug)]
pub struct Artwork {
    pub image: RgbaImage,
    pub source: ArtworkSource,
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub name: String,
    pub image: RgbaImage,
}

#[derive(Clone, Debug)]
pub struct SavedImage {
    /// Assigned from a counter that only grows, so ids also give creation order.
    pub id: u64,
    pub image: RgbaImage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Modal {
    #[default]
    None,
    ArtworkPicker,
    ArtworkGenerator,
    StockSearch,
    SceneEditor,
    Gallery,
}

pub struct Session<M, S> {
    model: M,
    stock: S,
    working_size: u32,
    artwork: Option<Artwork>,
    scene: Option<Scene>,
    editor: PolygonEditor,
    result: Option<RgbaImage>,
    last_guide: Option<RgbaImage>,
    gallery: Vec<SavedImage>,
    next_saved_id: u64,
    modal: Modal,
    stock_query: Option<StockQuery>,
    stock_results: Option<StockPage>,
    error: Option<String>,
    busy: bool,
}

impl<M: ImageModel, S: StockSource> Session<M, S> {
    pub fn new(model: M, stock: S, working_size: u32) -> Self {
        Self {
            model,
            stock,
            working_size,
            artwork: None,
            scene: None,
            editor: PolygonEditor::default(),
            result: None,
            last_guide: None,
            gallery: Vec::new(),
            next_saved_id: 1,
            modal: Modal::None,
            stock_query: None,
            stock_results: None,
            error: None,
            busy: false,
        }
    }

    pub fn artwork(&self) -> Option<&Artwork> {
        self.artwork.as_ref()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn area(&self) -> &PlacementArea {
        self.editor.area()
    }

    pub fn editor(&mut self) -> &mut PolygonEditor {
        &mut self.editor
    }

    pub fn result(&self) -> Option<&RgbaImage> {
        self.result.as_ref()
    }

    pub fn last_guide(&self) -> Option<&RgbaImage> {
        self.last_guide.as_ref()
    }

    pub fn gallery(&self) -> &[SavedImage] {
        &self.gallery
    }

    pub fn modal(&self) -> Modal {
        self.modal
    }

    pub fn stock_results(&self) -> Option<&StockPage> {
        self.stock_results.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn open_modal(&mut self, modal: Modal) {
        self.modal = modal;
    }

    pub fn close_modal(&mut self) {
        self.modal = Modal::None;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Runs a remote operation with the busy/error bookkeeping.
    fn track<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> WallprinterResult<T>,
    ) -> WallprinterResult<T> {
        self.error = None;
        self.busy = true;
        let out = f(self);
        self.busy = false;
        if let Err(err) = &out {
            tracing::warn!(op, error = %err, "session operation failed");
            self.error = Some(err.to_string());
        }
        out
    }

    pub fn upload_artwork(&mut self, bytes: &[u8]) -> WallprinterResult<()> {
        self.track("upload_artwork", |s| {
            let image = imageio::decode_rgba(bytes)?;
            s.set_artwork(Artwork {
                image,
                source: ArtworkSource::Upload,
            });
            Ok(())
        })
    }

    pub fn generate_artwork(&mut self, prompt: &str, aspect: AspectRatio) -> WallprinterResult<()> {
        self.track("generate_artwork", |s| {
            let image = place::generate_artwork(&s.model, prompt, aspect)?;
            s.set_artwork(Artwork {
                image,
                source: ArtworkSource::Generated {
                    prompt: prompt.trim().to_string(),
                },
            });
            Ok(())
        })
    }

    pub fn search_stock(&mut self, query: StockQuery) -> WallprinterResult<&StockPage> {
        self.track("search_stock", |s| {
            let page = s.stock.search(&query)?;
            s.stock_query = Some(query);
            s.stock_results = Some(page);
            Ok(())
        })?;
        self.stock_results
            .as_ref()
            .ok_or_else(|| WallprinterError::validation("no stock results"))
    }

    /// Appends the next page of results to the current ones.
    pub fn next_stock_page(&mut self) -> WallprinterResult<bool> {
        self.track("next_stock_page", |s| {
            let query = s
                .stock_query
                .clone()
                .ok_or_else(|| WallprinterError::validation("no stock search in progress"))?;
            if !s.stock_results.as_ref().is_some_and(StockPage::has_more) {
                return Ok(false);
            }
            let next = query.next_page();
            let page = s.stock.search(&next)?;
            s.stock_query = Some(next);
            if let Some(current) = s.stock_results.as_mut() {
                current.page = page.page;
                current.total = page.total;
                current.total_pages = page.total_pages;
                current.photos.extend(page.photos);
            }
            Ok(true)
        })
    }

    pub fn choose_stock(&mut self, index: usize) -> WallprinterResult<()> {
        self.track("choose_stock", |s| {
            let photo = s
                .stock_results
                .as_ref()
                .and_then(|p| p.photos.get(index))
                .cloned()
                .ok_or_else(|| {
                    WallprinterError::validation(format!("no stock result at index {index}"))
                })?;
            let bytes = s.stock.download(&photo)?;
            let image = imageio::decode_rgba(&bytes)?;
            s.set_artwork(Artwork {
                image,
                source: ArtworkSource::Stock {
                    id: photo.id,
                    author: photo.author_name,
                },
            });
            Ok(())
        })
    }

    fn set_artwork(&mut self, artwork: Artwork) {
        tracing::info!(
            w = artwork.image.width(),
            h = artwork.image.height(),
            source = ?artwork.source,
            "artwork selected"
        );
        self.artwork = Some(artwork);
        self.modal = Modal::None;
    }

    /// A new scene resets the placement area and drops the previous result.
    pub fn upload_scene(&mut self, name: &str, bytes: &[u8]) -> WallprinterResult<()> {
        self.track("upload_scene", |s| {
            let image = imageio::decode_rgba(bytes)?;
            s.scene = Some(Scene {
                name: name.to_string(),
                image,
            });
            s.editor.set_area(PlacementArea::default());
            s.result = None;
            s.last_guide = None;
            Ok(())
        })
    }

    /// Replaces the scene with a model edit of itself. The placement area is kept.
    pub fn edit_scene(&mut self, instruction: &str) -> WallprinterResult<()> {
        self.track("edit_scene", |s| {
            let scene = s
                .scene
                .as_ref()
                .ok_or_else(|| WallprinterError::validation("upload a scene before editing it"))?;
            let edited = place::edit_scene(&s.model, &scene.image, instruction, s.working_size)?;
            if let Some(scene) = s.scene.as_mut() {
                scene.image = edited;
            }
            s.result = None;
            s.last_guide = None;
            if s.modal == Modal::SceneEditor {
                s.modal = Modal::None;
            }
            Ok(())
        })
    }

    pub fn reset_area(&mut self) {
        self.editor.set_area(PlacementArea::default());
    }

    pub fn place(&mut self, opts: &PlaceOpts) -> WallprinterResult<&RgbaImage> {
        self.track("place", |s| {
            let scene = s
                .scene
                .as_ref()
                .ok_or_else(|| WallprinterError::validation("upload a scene first"))?;
            let artwork = s
                .artwork
                .as_ref()
                .ok_or_else(|| WallprinterError::validation("choose an artwork first"))?;
            let placed = place::place_artwork(
                &s.model,
                &scene.image,
                &artwork.image,
                s.editor.area(),
                opts,
            )?;
            s.result = Some(placed.image);
            s.last_guide = Some(placed.guide);
            Ok(())
        })?;
        self.result
            .as_ref()
            .ok_or_else(|| WallprinterError::validation("no result"))
    }

    /// Pushes the current result into the gallery and returns its id.
    pub fn save_result(&mut self) -> WallprinterResult<u64> {
        let image = self
            .result
            .clone()
            .ok_or_else(|| WallprinterError::validation("nothing to save yet"))?;
        let id = self.next_saved_id;
        self.next_saved_id += 1;
        self.gallery.push(SavedImage { id, image });
        Ok(id)
    }

    pub fn remove_saved(&mut self, id: u64) -> bool {
        let before = self.gallery.len();
        self.gallery.retain(|s| s.id != id);
        self.gallery.len() != before
    }

    /// Writes every saved image as `wallprinter-<id>.png` and returns the paths.
    pub fn export_gallery(&self, dir: &Path) -> WallprinterResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.gallery.len());
        for saved in &self.gallery {
            let path = dir.join(format!("wallprinter-{}.png", saved.id));
            imageio::save_png(&path, &saved.image)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Back to a blank session. The gallery survives.
    pub fn reset(&mut self) {
        self.artwork = None;
        self.scene = None;
        self.editor = PolygonEditor::default();
        self.result = None;
        self.last_guide = None;
        self.modal = Modal::None;
        self.stock_query = None;
        self.stock_results = None;
        self.error = None;
        self.busy = false;
    }
}
