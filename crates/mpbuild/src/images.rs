//! Checks that every board's listed images exist in the media repository and
//! are reasonably small.

use std::fmt::Write as _;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::error::{Error, Result};

pub const MEDIA_BASE_URL: &str = "https://raw.githubusercontent.com/micropython/micropython-media/main/boards";
pub const MAX_IMAGE_BYTES: u64 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHead {
    pub status: u16,
    pub content_length: Option<u64>,
}

/// Issues a `HEAD` request for an image URL.
pub trait ImageProbe {
    fn head(&self, url: &str) -> Result<ImageHead>;
}

pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl ImageProbe for HttpProbe {
    fn head(&self, url: &str) -> Result<ImageHead> {
        let res = self
            .client
            .head(url)
            .send()
            .map_err(|e| Error::msg(format!("HEAD {url} failed: {e}")))?;
        // The body of a HEAD response is empty, so read the header itself.
        let content_length = res
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        Ok(ImageHead {
            status: res.status().as_u16(),
            content_length,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRef {
    pub port: String,
    pub board: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIssue {
    pub port: String,
    pub board: String,
    pub url: String,
    /// Reported size for oversized images.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReport {
    pub boards_checked: usize,
    pub no_images: Vec<BoardRef>,
    pub not_found: Vec<ImageIssue>,
    pub too_large: Vec<ImageIssue>,
}

impl ImageReport {
    pub fn is_clean(&self) -> bool {
        self.no_images.is_empty() && self.not_found.is_empty() && self.too_large.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Checked {} boards", self.boards_checked);

        let _ = writeln!(out, "\nNo images (none listed in board.json): {}", self.no_images.len());
        for b in &self.no_images {
            let _ = writeln!(out, "  {}/{}", b.port, b.board);
        }
        let _ = writeln!(out, "\nNot found (missing from micropython-media): {}", self.not_found.len());
        for i in &self.not_found {
            let _ = writeln!(out, "  {}/{}  {}", i.port, i.board, i.url);
        }
        let _ = writeln!(out, "\nToo large (> {MAX_IMAGE_BYTES} bytes): {}", self.too_large.len());
        for i in &self.too_large {
            let size = i.size.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "  {}/{}  {}  {size}", i.port, i.board, i.url);
        }
        out
    }
}

pub fn image_url(board: &str, image: &str) -> String {
    format!("{MEDIA_BASE_URL}/{board}/{image}")
}

/// Probe every image of every physical board. Port-level targets carry no
/// images and are skipped.
pub fn check_images(catalog: &Catalog, probe: &dyn ImageProbe) -> ImageReport {
    let mut report = ImageReport::default();

    for board in catalog.boards().filter(|b| b.physical_board) {
        report.boards_checked += 1;
        if board.images.is_empty() {
            report.no_images.push(BoardRef {
                port: board.port.clone(),
                board: board.name.clone(),
            });
            continue;
        }

        for image in &board.images {
            let url = image_url(&board.name, image);
            let issue = |size| ImageIssue {
                port: board.port.clone(),
                board: board.name.clone(),
                url: url.clone(),
                size,
            };
            match probe.head(&url) {
                Ok(head) if head.status == 200 => {
                    tracing::debug!(%url, size = ?head.content_length, "image found");
                    if let Some(size) = head.content_length
                        && size > MAX_IMAGE_BYTES
                    {
                        report.too_large.push(issue(Some(size)));
                    }
                }
                Ok(head) => {
                    tracing::debug!(%url, status = head.status, "image not found");
                    report.not_found.push(issue(None));
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "image check failed");
                    report.not_found.push(issue(None));
                }
            }
        }
    }
    report
}
