// src/services/media.rs

//! Image download and size-variant derivation.
//!
//! Files land in the media temp directory, from where the upload pool
//! pushes them to object storage.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use reqwest::Client;
use url::Url;

use crate::error::Result;
use crate::models::MediaConfig;
use crate::utils::http;

/// Extensions kept as-is; anything else is stored as `.jpg`.
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "png", "gif", "webp"];

/// How a variant is scaled before the optional crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Width(u32),
    Height(u32),
}

/// A named derived image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub prefix: &'static str,
    pub fit: Fit,

    /// Centered crop `(width, height)` applied after scaling
    pub crop: Option<(u32, u32)>,
}

pub const VARIANTS: [Variant; 5] = [
    Variant {
        prefix: "s_",
        fit: Fit::Height(111),
        crop: Some((111, 74)),
    },
    Variant {
        prefix: "ssq_",
        fit: Fit::Height(158),
        crop: Some((158, 158)),
    },
    Variant {
        prefix: "m_",
        fit: Fit::Width(506),
        crop: None,
    },
    Variant {
        prefix: "msq_",
        fit: Fit::Height(506),
        crop: Some((506, 506)),
    },
    Variant {
        prefix: "l_",
        fit: Fit::Width(800),
        crop: None,
    },
];

/// Result of ingesting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    /// Generated file name of the original
    pub file_name: String,
    pub width: u32,
    pub height: u32,

    /// Original plus every derived variant, inside the temp directory
    pub files: Vec<PathBuf>,
}

/// Globally unique file name with a normalized extension.
pub fn unique_file_name(image_url: &str) -> String {
    format!("{}.{}", uuid::Uuid::new_v4(), normalized_extension(image_url))
}

fn normalized_extension(image_url: &str) -> &'static str {
    let path = Url::parse(image_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| image_url.to_string());
    let ext = Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpeg" => "jpg",
        other => ALLOWED_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == other)
            .copied()
            .unwrap_or("jpg"),
    }
}

/// Scale and crop an image for one variant.
pub fn derive_variant(image: &DynamicImage, variant: &Variant) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (width, height) = (width.max(1), height.max(1));

    let (target_w, target_h) = match variant.fit {
        Fit::Width(w) => (w, scale(height, w, width)),
        Fit::Height(h) => (scale(width, h, height), h),
    };
    let resized = image.resize_exact(target_w, target_h, FilterType::Lanczos3);

    match variant.crop {
        Some((crop_w, crop_h)) => {
            let crop_w = crop_w.min(target_w);
            let crop_h = crop_h.min(target_h);
            let x = (target_w - crop_w) / 2;
            let y = (target_h - crop_h) / 2;
            resized.crop_imm(x, y, crop_w, crop_h)
        }
        None => resized,
    }
}

fn scale(side: u32, target: u32, reference: u32) -> u32 {
    ((u64::from(side) * u64::from(target)) / u64::from(reference)).max(1) as u32
}

/// Downloads images and writes their variants to the temp directory.
pub struct MediaProcessor {
    client: Client,
    temp_dir: PathBuf,
}

impl MediaProcessor {
    pub fn new(client: Client, config: &MediaConfig) -> Self {
        Self {
            client,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Create the temp directory; failure here is fatal for an upload run.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    /// Download `image_url`, decode it and derive every variant.
    pub async fn ingest(&self, image_url: &str) -> Result<MediaAsset> {
        let bytes = http::fetch_bytes(&self.client, image_url).await?;
        let file_name = unique_file_name(image_url);
        let original = self.temp_dir.join(&file_name);
        tokio::fs::write(&original, &bytes).await?;

        let temp_dir = self.temp_dir.clone();
        let name = file_name.clone();
        let derived = tokio::task::spawn_blocking(move || write_variants(&bytes, &temp_dir, &name))
            .await?;

        match derived {
            Ok((width, height, mut files)) => {
                files.insert(0, original);
                Ok(MediaAsset {
                    file_name,
                    width,
                    height,
                    files,
                })
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&original).await {
                    log::debug!("Could not remove {}: {}", original.display(), remove_err);
                }
                Err(e)
            }
        }
    }
}

/// Decode the original and save each variant next to it.
fn write_variants(bytes: &[u8], dir: &Path, file_name: &str) -> Result<(u32, u32, Vec<PathBuf>)> {
    let image = image::load_from_memory(bytes)?;
    let (width, height) = image.dimensions();
    let is_jpeg = file_name.ends_with(".jpg");

    let mut files = Vec::with_capacity(VARIANTS.len());
    for variant in &VARIANTS {
        let derived = derive_variant(&image, variant);
        let derived = if is_jpeg {
            DynamicImage::ImageRgb8(derived.to_rgb8())
        } else {
            derived
        };

        let path = dir.join(format!("{}{}", variant.prefix, file_name));
        if let Err(e) = derived.save(&path) {
            for written in &files {
                let _ = std::fs::remove_file(written);
            }
            return Err(e.into());
        }
        files.push(path);
    }
    Ok((width, height, files))
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
    }

    #[test]
    fn test_normalized_extension() {
        assert_eq!(normalized_extension("https://cdn.example/a/b.PNG?x=1"), "png");
        assert_eq!(normalized_extension("https://cdn.example/a/b.jpeg"), "jpg");
        assert_eq!(normalized_extension("https://cdn.example/a/b.webp"), "webp");
        assert_eq!(normalized_extension("https://cdn.example/a/b.svg"), "jpg");
        assert_eq!(normalized_extension("https://cdn.example/image"), "jpg");
    }

    #[test]
    fn test_unique_file_name() {
        let a = unique_file_name("https://cdn.example/pic.gif");
        let b = unique_file_name("https://cdn.example/pic.gif");
        assert_ne!(a, b);
        assert!(a.ends_with(".gif"));
    }

    #[test]
    fn variants_have_expected_sizes() {
        let image = sample(1200, 800);
        let sizes: Vec<_> = VARIANTS
            .iter()
            .map(|v| (v.prefix, derive_variant(&image, v).dimensions()))
            .collect();

        assert_eq!(
            sizes,
            [
                ("s_", (111, 74)),
                ("ssq_", (158, 158)),
                ("m_", (506, 337)),
                ("msq_", (506, 506)),
                ("l_", (800, 533)),
            ]
        );
    }

    #[test]
    fn crop_never_exceeds_scaled_image() {
        let tall = sample(100, 1000);
        let small = derive_variant(&tall, &VARIANTS[0]);
        assert_eq!(small.dimensions(), (11, 74));
    }

    #[test]
    fn write_variants_saves_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let mut png = Vec::new();
        sample(640, 480)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let (width, height, files) = write_variants(&png, dir.path(), "pic.jpg").unwrap();
        assert_eq!((width, height), (640, 480));
        assert_eq!(files.len(), VARIANTS.len());
        assert!(files.iter().all(|f| f.exists()));
        assert!(dir.path().join("msq_pic.jpg").exists());
    }
}
