use std::{fmt, time::Duration};

use anyhow::Context as _;
use reqwest::{
    blocking::Client as HttpClient,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    config::Config,
    error::{WallprinterError, WallprinterResult},
    model::{response_json_or_error, truncate},
};

pub const MAX_PER_PAGE: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Squarish,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Squarish => "squarish",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StockQuery {
    pub query: String,
    pub page: u32,
    pub per_page: u32,
    pub orientation: Option<Orientation>,
}

impl StockQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            per_page: 12,
            orientation: None,
        }
    }

    pub fn validate(&self) -> WallprinterResult<()> {
        if self.query.trim().is_empty() {
            return Err(WallprinterError::validation("search query must not be empty"));
        }
        if self.page == 0 {
            return Err(WallprinterError::validation("page numbers start at 1"));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(WallprinterError::validation(format!(
                "per_page must be within 1..={MAX_PER_PAGE}"
            )));
        }
        Ok(())
    }

    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StockPhoto {
    pub id: String,
    pub description: Option<String>,
    pub width: u32,
    pub height: u32,
    pub thumb_url: String,
    pub full_url: String,
    pub author_name: String,
    pub author_url: Option<String>,
    pub download_location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StockPage {
    pub total: u64,
    pub total_pages: u32,
    pub page: u32,
    pub photos: Vec<StockPhoto>,
}

impl StockPage {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

pub trait StockSource {
    fn search(&self, query: &StockQuery) -> WallprinterResult<StockPage>;
    fn download(&self, photo: &StockPhoto) -> WallprinterResult<Vec<u8>>;
}

impl<S: StockSource + ?Sized> StockSource for &S {
    fn search(&self, query: &StockQuery) -> WallprinterResult<StockPage> {
        (**self).search(query)
    }

    fn download(&self, photo: &StockPhoto) -> WallprinterResult<Vec<u8>> {
        (**self).download(photo)
    }
}

/// `None` stands for "no stock provider configured".
impl<S: StockSource> StockSource for Option<S> {
    fn search(&self, query: &StockQuery) -> WallprinterResult<StockPage> {
        match self {
            Some(s) => s.search(query),
            None => Err(WallprinterError::validation("stock photo search is not configured")),
        }
    }

    fn download(&self, photo: &StockPhoto) -> WallprinterResult<Vec<u8>> {
        match self {
            Some(s) => s.download(photo),
            None => Err(WallprinterError::validation("stock photo search is not configured")),
        }
    }
}

// Wire shapes of the Unsplash search response.
#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    results: Vec<WirePhoto>,
}

#[derive(serde::Deserialize)]
struct WirePhoto {
    id: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    description: Option<String>,
    alt_description: Option<String>,
    urls: WireUrls,
    #[serde(default)]
    links: WireLinks,
    user: WireUser,
}

#[derive(serde::Deserialize)]
struct WireUrls {
    full: String,
    small: String,
}

#[derive(Default, serde::Deserialize)]
struct WireLinks {
    download_location: Option<String>,
    html: Option<String>,
}

#[derive(serde::Deserialize)]
struct WireUser {
    name: String,
    #[serde(default)]
    links: WireLinks,
}

impl From<WirePhoto> for StockPhoto {
    fn from(w: WirePhoto) -> Self {
        let description = w
            .description
            .or(w.alt_description)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Self {
            id: w.id,
            description,
            width: w.width,
            height: w.height,
            thumb_url: w.urls.small,
            full_url: w.urls.full,
            author_name: w.user.name,
            author_url: w.user.links.html,
            download_location: w.links.download_location,
        }
    }
}

pub fn parse_search(body: serde_json::Value, page: u32) -> WallprinterResult<StockPage> {
    let resp: SearchResponse = serde_json::from_value(body)
        .map_err(|e| WallprinterError::serde(format!("stock search response: {e}")))?;
    Ok(StockPage {
        total: resp.total,
        total_pages: resp.total_pages,
        page,
        photos: resp.results.into_iter().map(StockPhoto::from).collect(),
    })
}

pub struct UnsplashClient {
    api_base: String,
    http: HttpClient,
}

impl fmt::Debug for UnsplashClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsplashClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl UnsplashClient {
    pub fn from_config(cfg: &Config) -> WallprinterResult<Self> {
        let key = cfg
            .unsplash_access_key
            .as_deref()
            .ok_or_else(|| WallprinterError::validation("UNSPLASH_ACCESS_KEY not set"))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Client-ID {key}")).map_err(|_| {
            WallprinterError::validation("UNSPLASH_ACCESS_KEY is not a valid header value")
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("accept-version", HeaderValue::from_static("v1"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
            .build()
            .context("build http client")?;
        Ok(Self {
            api_base: cfg.unsplash_api_base.trim().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/search/photos", self.api_base)
    }

    /// Pings the download-tracking endpoint. Failures are logged, never returned.
    fn track_download(&self, photo: &StockPhoto) {
        let Some(url) = photo.download_location.as_deref() else {
            return;
        };
        match self.http.get(url).send() {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!(
                id = %photo.id,
                status = resp.status().as_u16(),
                "download tracking rejected"
            ),
            Err(err) => tracing::warn!(id = %photo.id, error = %err, "download tracking failed"),
        }
    }
}

impl StockSource for UnsplashClient {
    #[tracing::instrument(skip_all, fields(query = %query.query, page = query.page))]
    fn search(&self, query: &StockQuery) -> WallprinterResult<StockPage> {
        query.validate()?;
        let mut params = vec![
            ("query", query.query.trim().to_string()),
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if let Some(o) = query.orientation {
            params.push(("orientation", o.as_str().to_string()));
        }

        let resp = self
            .http
            .get(self.search_url())
            .query(&params)
            .send()
            .context("stock search request failed")?;
        let body = response_json_or_error("stock search", resp)?;
        let page = parse_search(body, query.page)?;
        tracing::debug!(results = page.photos.len(), total = page.total, "stock search done");
        Ok(page)
    }

    #[tracing::instrument(skip_all, fields(id = %photo.id))]
    fn download(&self, photo: &StockPhoto) -> WallprinterResult<Vec<u8>> {
        self.track_download(photo);
        let resp = self
            .http
            .get(&photo.full_url)
            .send()
            .context("stock photo download failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(WallprinterError::api(format!(
                "stock photo download failed ({}): {}",
                status.as_u16(),
                truncate(&body, 256)
            )));
        }
        let bytes = resp.bytes().context("read stock photo body")?;
        Ok(bytes.to_vec())
    }
}
