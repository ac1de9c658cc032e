#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod guide;
pub mod imageio;
pub mod letterbox;
pub mod model;
pub mod place;
pub mod raster;
pub mod session;
pub mod stock;

pub use config::Config;
pub use error::{WallprinterError, WallprinterResult};
pub use geometry::{Hit, PixelBounds, PlacementArea, Point, PolygonEditor};
pub use guide::{GuideMode, parse_hex_color, render_guide};
pub use letterbox::{Letterbox, pad_to_square};
pub use model::{
    AspectRatio, EditRequest, GeminiClient, GenerateRequest, GeneratedImage, ImageModel,
    InlineImage,
};
pub use place::{PlaceOpts, Placement, edit_scene, generate_artwork, place_artwork};
pub use session::{Artwork, ArtworkSource, Modal, SavedImage, Scene, Session};
pub use stock::{Orientation, StockPage, StockPhoto, StockQuery, StockSource, UnsplashClient};
