use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use pressreview::error::Result;
use pressreview::models::{HarvestedItem, Headline, MediaConfig};
use pressreview::pipeline::{Enrichment, Persister};
use pressreview::services::{LinkResolver, MediaProcessor, ResolvedLinks};
use pressreview::storage::{DocumentStore, LocalStore};
use pressreview::utils::content_hash;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 30])));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

async fn image_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/lead.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(1200, 800), "image/png"))
        .mount(&server)
        .await;
    server
}

fn processor(temp_dir: &Path) -> MediaProcessor {
    let config = MediaConfig {
        temp_dir: temp_dir.to_path_buf(),
        ..MediaConfig::default()
    };
    MediaProcessor::new(reqwest::Client::new(), &config)
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn item(link: &str) -> HarvestedItem {
    HarvestedItem {
        title: "Storm warning issued".into(),
        link: link.into(),
        channel: "daily".into(),
        section: "latest".into(),
        position: 1,
    }
}

struct ImageResolver {
    image_url: String,
}

#[async_trait]
impl LinkResolver for ImageResolver {
    async fn resolve(&self, _url: &str) -> Result<ResolvedLinks> {
        Ok(ResolvedLinks {
            image_url: Some(self.image_url.clone()),
            ..ResolvedLinks::default()
        })
    }
}

/// Inserts the record while enrichment is in flight, as a concurrent
/// upsert of the same link would.
struct RacingResolver<'a> {
    store: &'a LocalStore,
    image_url: String,
}

#[async_trait]
impl LinkResolver for RacingResolver<'_> {
    async fn resolve(&self, url: &str) -> Result<ResolvedLinks> {
        let winner = Headline::from_harvest(content_hash(url), &item(url), Utc::now());
        self.store.upsert_headline(&winner).await?;
        Ok(ResolvedLinks {
            image_url: Some(self.image_url.clone()),
            ..ResolvedLinks::default()
        })
    }
}

#[tokio::test]
async fn ingest_writes_original_and_every_variant() {
    let server = image_server().await;
    let temp = tempfile::tempdir().unwrap();
    let media = processor(temp.path());
    media.prepare().await.unwrap();

    let asset = media
        .ingest(&format!("{}/img/lead.png", server.uri()))
        .await
        .unwrap();

    assert!(asset.file_name.ends_with(".png"));
    assert_eq!((asset.width, asset.height), (1200, 800));
    assert_eq!(asset.files.len(), 6);
    assert_eq!(asset.files[0], temp.path().join(&asset.file_name));
    assert_eq!(file_count(temp.path()), 6);

    let expected = [
        ("s_", (111, 74)),
        ("ssq_", (158, 158)),
        ("m_", (506, 337)),
        ("msq_", (506, 506)),
        ("l_", (800, 533)),
    ];
    for (prefix, size) in expected {
        let variant = image::open(temp.path().join(format!("{prefix}{}", asset.file_name))).unwrap();
        assert_eq!(variant.dimensions(), size, "{prefix}");
    }
}

#[tokio::test]
async fn undecodable_image_leaves_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/broken.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("not an image", "image/jpeg"))
        .mount(&server)
        .await;
    let temp = tempfile::tempdir().unwrap();
    let media = processor(temp.path());
    media.prepare().await.unwrap();

    let result = media.ingest(&format!("{}/img/broken.jpg", server.uri())).await;
    assert!(result.is_err());
    assert_eq!(file_count(temp.path()), 0);
}

#[tokio::test]
async fn first_seen_item_records_image_metadata() {
    let server = image_server().await;
    let temp = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(store_dir.path()).await.unwrap();

    let media = processor(temp.path());
    media.prepare().await.unwrap();
    let resolver = ImageResolver {
        image_url: format!("{}/img/lead.png", server.uri()),
    };
    let enrichment = Enrichment {
        resolver: Some(&resolver),
        media: Some(&media),
    };

    let link = "https://daily.example/storm";
    let report = Persister::new(&store, enrichment, 4, 4)
        .persist(&[item(link)], Utc::now())
        .await
        .unwrap();
    assert_eq!((report.created, report.images), (1, 1));

    let stored = store.find_headline(&content_hash(link)).await.unwrap().unwrap();
    let file_name = stored.image_uuid.unwrap();
    assert!(temp.path().join(&file_name).exists());
    assert_eq!((stored.image_width, stored.image_height), (Some(1200), Some(800)));
    assert_eq!(
        stored.original_image_url,
        Some(format!("{}/img/lead.png", server.uri()))
    );
    assert_eq!(file_count(temp.path()), 6);
}

#[tokio::test]
async fn losing_a_race_discards_derived_files() {
    let server = image_server().await;
    let temp = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(store_dir.path()).await.unwrap();

    let media = processor(temp.path());
    media.prepare().await.unwrap();
    let resolver = RacingResolver {
        store: &store,
        image_url: format!("{}/img/lead.png", server.uri()),
    };
    let enrichment = Enrichment {
        resolver: Some(&resolver),
        media: Some(&media),
    };

    let link = "https://daily.example/storm";
    let report = Persister::new(&store, enrichment, 4, 4)
        .persist(&[item(link)], Utc::now())
        .await
        .unwrap();
    assert_eq!((report.created, report.updated), (0, 1));

    let stored = store.find_headline(&content_hash(link)).await.unwrap().unwrap();
    assert!(stored.image_uuid.is_none());
    assert_eq!(file_count(temp.path()), 0);
    assert_eq!(store.headline_count().await, 1);
}
