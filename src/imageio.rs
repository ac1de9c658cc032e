use std::{io::Cursor, path::Path};

use anyhow::Context as _;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{WallprinterError, WallprinterResult};

pub fn decode(bytes: &[u8]) -> WallprinterResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(WallprinterError::image("empty image payload"));
    }
    let img = image::load_from_memory(bytes).context("decode image from memory")?;
    if img.width() == 0 || img.height() == 0 {
        return Err(WallprinterError::image("decoded image has zero size"));
    }
    Ok(img)
}

pub fn decode_rgba(bytes: &[u8]) -> WallprinterResult<RgbaImage> {
    Ok(decode(bytes)?.to_rgba8())
}

pub fn encode_png(img: &RgbaImage) -> WallprinterResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "application/octet-stream",
    }
}

pub fn to_data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_mime(bytes), BASE64.encode(bytes))
}

/// Returns `(mime, bytes)`.
pub fn from_data_url(url: &str) -> WallprinterResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| WallprinterError::validation("data url must start with 'data:'"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| WallprinterError::validation("data url is missing ','"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| WallprinterError::validation("only base64 data urls are supported"))?;
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("decode data url payload")?;
    Ok((mime.to_string(), bytes))
}

/// Accepts a filesystem path or a `data:` URL.
pub fn load_source(source: &str) -> WallprinterResult<Vec<u8>> {
    if source.starts_with("data:") {
        return Ok(from_data_url(source)?.1);
    }
    load_file(Path::new(source))
}

pub fn load_file(path: &Path) -> WallprinterResult<Vec<u8>> {
    Ok(std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?)
}

fn ensure_parent_dir(path: &Path) -> WallprinterResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

pub fn save_png(path: &Path, img: &RgbaImage) -> WallprinterResult<()> {
    ensure_parent_dir(path)?;
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

pub fn save_bytes(path: &Path, bytes: &[u8]) -> WallprinterResult<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}
