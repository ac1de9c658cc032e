use std::cell::{Cell, RefCell};

use image::{Rgba, RgbaImage};
use wallprinter::{
    ArtworkSource, AspectRatio, EditRequest, GenerateRequest, GeneratedImage, ImageModel, Modal,
    PlaceOpts, PlacementArea, Session, StockPage, StockPhoto, StockQuery, StockSource,
    WallprinterError, WallprinterResult, imageio,
};

fn png(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    imageio::encode_png(&RgbaImage::from_pixel(w, h, Rgba(px))).unwrap()
}

/// Answers edits with a flat image and can be told to fail.
#[derive(Default)]
struct FakeModel {
    fail_with: RefCell<Option<String>>,
    edits: Cell<usize>,
    last_prompt: RefCell<String>,
}

impl FakeModel {
    fn check(&self) -> WallprinterResult<()> {
        match self.fail_with.borrow().as_ref() {
            Some(msg) => Err(WallprinterError::api(msg.clone())),
            None => Ok(()),
        }
    }
}

impl ImageModel for FakeModel {
    fn edit(&self, req: &EditRequest) -> WallprinterResult<GeneratedImage> {
        self.check()?;
        self.edits.set(self.edits.get() + 1);
        *self.last_prompt.borrow_mut() = req.prompt.clone();
        Ok(GeneratedImage {
            bytes: png(96, 96, [7, 8, 9, 255]),
            mime_type: "image/png".to_string(),
            text: None,
        })
    }

    fn generate(&self, _req: &GenerateRequest) -> WallprinterResult<GeneratedImage> {
        self.check()?;
        Ok(GeneratedImage {
            bytes: png(12, 12, [200, 100, 0, 255]),
            mime_type: "image/png".to_string(),
            text: None,
        })
    }
}

struct FakeStock;

fn photo(id: &str) -> StockPhoto {
    StockPhoto {
        id: id.to_string(),
        description: None,
        width: 10,
        height: 10,
        thumb_url: format!("thumb/{id}"),
        full_url: format!("full/{id}"),
        author_name: "Ada".to_string(),
        author_url: None,
        download_location: None,
    }
}

impl StockSource for FakeStock {
    fn search(&self, query: &StockQuery) -> WallprinterResult<StockPage> {
        query.validate()?;
        Ok(StockPage {
            total: 4,
            total_pages: 2,
            page: query.page,
            photos: vec![
                photo(&format!("p{}a", query.page)),
                photo(&format!("p{}b", query.page)),
            ],
        })
    }

    fn download(&self, photo: &StockPhoto) -> WallprinterResult<Vec<u8>> {
        if photo.id.ends_with('b') {
            return Err(WallprinterError::api("download failed (404)"));
        }
        Ok(png(6, 4, [1, 1, 1, 255]))
    }
}

fn session(model: &FakeModel) -> Session<&FakeModel, FakeStock> {
    Session::new(model, FakeStock, 64)
}

fn opts() -> PlaceOpts {
    PlaceOpts {
        working_size: 64,
        ..PlaceOpts::default()
    }
}

#[test]
fn place_requires_scene_and_artwork() {
    let model = FakeModel::default();
    let mut s = session(&model);

    let err = s.place(&opts()).unwrap_err();
    assert!(err.to_string().contains("scene"));
    assert!(s.error().unwrap().contains("scene"));

    s.upload_scene("wall.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    assert!(s.error().is_none());
    assert!(s.place(&opts()).unwrap_err().to_string().contains("artwork"));
    assert_eq!(model.edits.get(), 0);
}

#[test]
fn full_flow_place_save_export() {
    let model = FakeModel::default();
    let mut s = session(&model);

    s.upload_scene("wall.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    s.open_modal(Modal::ArtworkPicker);
    s.upload_artwork(&png(5, 5, [255, 0, 0, 255])).unwrap();
    assert_eq!(s.modal(), Modal::None);
    assert_eq!(s.artwork().unwrap().source, ArtworkSource::Upload);

    let result = s.place(&opts()).unwrap();
    assert_eq!(result.dimensions(), (40, 20));
    assert!(!s.is_busy());
    assert_eq!(s.last_guide().unwrap().dimensions(), (40, 20));
    assert!(model.last_prompt.borrow().contains("photorealistic"));

    let a = s.save_result().unwrap();
    let b = s.save_result().unwrap();
    assert_ne!(a, b);
    assert_eq!(s.gallery().len(), 2);
    assert!(s.remove_saved(a));
    assert!(!s.remove_saved(a));

    let dir = std::path::PathBuf::from("target")
        .join("session_flow")
        .join("export");
    let written = s.export_gallery(&dir).unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with(format!("wallprinter-{b}.png")));
    assert!(written[0].exists());
}

#[test]
fn new_scene_resets_area_and_result() {
    let model = FakeModel::default();
    let mut s = session(&model);
    s.upload_scene("a.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    s.upload_artwork(&png(5, 5, [255, 0, 0, 255])).unwrap();

    s.editor().set_area(PlacementArea::parse("0,0 50,0 50,50").unwrap());
    s.place(&opts()).unwrap();
    assert!(s.result().is_some());

    s.upload_scene("b.png", &png(30, 30, [10, 10, 10, 255])).unwrap();
    assert!(s.result().is_none());
    assert_eq!(s.area(), &PlacementArea::default());
    assert_eq!(s.scene().unwrap().name, "b.png");
}

#[test]
fn edit_scene_keeps_area_and_closes_editor() {
    let model = FakeModel::default();
    let mut s = session(&model);
    assert!(s.edit_scene("brighter").is_err());

    s.upload_scene("a.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    let area = PlacementArea::parse("10,10 60,10 60,60").unwrap();
    s.editor().set_area(area.clone());
    s.open_modal(Modal::SceneEditor);

    s.edit_scene("make the wall white").unwrap();
    assert_eq!(s.modal(), Modal::None);
    assert_eq!(s.area(), &area);
    let scene = s.scene().unwrap();
    assert_eq!(scene.image.dimensions(), (40, 20));
    assert_eq!(scene.image.get_pixel(20, 10), &Rgba([7, 8, 9, 255]));
}

#[test]
fn model_failure_is_recorded_and_state_kept() {
    let model = FakeModel::default();
    let mut s = session(&model);
    s.upload_scene("a.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    s.upload_artwork(&png(5, 5, [255, 0, 0, 255])).unwrap();
    s.place(&opts()).unwrap();
    let before = s.result().cloned().unwrap();

    *model.fail_with.borrow_mut() = Some("quota exceeded".to_string());
    assert!(s.place(&opts()).is_err());
    assert!(s.error().unwrap().contains("quota exceeded"));
    assert!(!s.is_busy());
    assert_eq!(s.result().unwrap(), &before);

    assert!(s.generate_artwork("sunset", AspectRatio::Square).is_err());
    assert_eq!(s.artwork().unwrap().source, ArtworkSource::Upload);

    *model.fail_with.borrow_mut() = None;
    s.generate_artwork("sunset", AspectRatio::Square).unwrap();
    assert!(s.error().is_none());
    assert_eq!(
        s.artwork().unwrap().source,
        ArtworkSource::Generated {
            prompt: "sunset".to_string()
        }
    );
}

#[test]
fn stock_search_paging_and_choice() {
    let model = FakeModel::default();
    let mut s = session(&model);

    assert!(s.next_stock_page().is_err());
    assert!(s.error().unwrap().contains("no stock search"));
    assert!(!s.is_busy());
    assert!(s.search_stock(StockQuery::new("")).is_err());

    s.open_modal(Modal::StockSearch);
    let page = s.search_stock(StockQuery::new("abstract")).unwrap();
    assert_eq!(page.photos.len(), 2);

    assert!(s.next_stock_page().unwrap());
    assert_eq!(s.stock_results().unwrap().photos.len(), 4);
    assert!(!s.next_stock_page().unwrap());
    assert!(s.error().is_none());

    let err = s.choose_stock(1).unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(s.modal(), Modal::StockSearch);
    assert!(s.choose_stock(99).is_err());

    s.choose_stock(2).unwrap();
    assert_eq!(s.modal(), Modal::None);
    let art = s.artwork().unwrap();
    assert_eq!(art.image.dimensions(), (6, 4));
    assert_eq!(
        art.source,
        ArtworkSource::Stock {
            id: "p2a".to_string(),
            author: "Ada".to_string()
        }
    );
}

#[test]
fn reset_keeps_gallery() {
    let model = FakeModel::default();
    let mut s = session(&model);
    s.upload_scene("a.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    s.upload_artwork(&png(5, 5, [255, 0, 0, 255])).unwrap();
    s.place(&opts()).unwrap();
    s.save_result().unwrap();

    s.reset();
    assert!(s.scene().is_none());
    assert!(s.artwork().is_none());
    assert!(s.result().is_none());
    assert_eq!(s.gallery().len(), 1);
    assert!(s.save_result().is_err());
}

#[test]
fn bad_uploads_leave_state_alone() {
    let model = FakeModel::default();
    let mut s = session(&model);
    s.upload_scene("a.png", &png(40, 20, [90, 90, 90, 255])).unwrap();
    assert!(s.upload_scene("junk.bin", b"not an image").is_err());
    assert_eq!(s.scene().unwrap().name, "a.png");
    assert!(s.error().is_some());
    s.clear_error();
    assert!(s.error().is_none());
}
