//! Item fetcher: resolves one catalog identifier into an [`ItemMetadata`].
//!
//! Every remote artifact goes through the [`ArtifactCache`], so a fully
//! cached identifier is resolved without any network traffic. Only uncached
//! metadata requests wait on the shared politeness [`Throttle`].
//!
//! Failures degrade rather than abort:
//!
//! | Step | Failure | Outcome |
//! |------|---------|---------|
//! | metadata | network / malformed JSON | dropped (`MetadataUnavailable`) |
//! | title | absent | dropped (`MissingTitle`) |
//! | year | absent / non-numeric | `1900`, logged |
//! | date | absent | parsed from the year |
//! | full text | no OCR file / fetch fails | dropped (`MissingFullText`) after the image step |
//! | image | no URL / fetch fails | `image_url` unset or kept, logged |

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::{ArtifactCache, ArtifactKind};
use crate::config::HarvestConfig;
use crate::error::{ArtifactError, FetchError};
use crate::http::{self, Throttle};
use crate::models::{DropReason, DroppedItem, Fetched, ItemMetadata};
use crate::normalize::normalize_fulltext;

/// Year used when an item carries no usable year.
pub const DEFAULT_YEAR: i32 = 1900;

// ============ Item detail response ============

/// Typed view of the item detail document.
#[derive(Debug, Deserialize, Default)]
pub struct ItemDetails {
    #[serde(default)]
    pub metadata: DetailMetadata,
    #[serde(default)]
    pub misc: Option<DetailMisc>,
    /// File manifest in document order.
    #[serde(default, deserialize_with = "ordered_files")]
    pub files: Vec<(String, FileEntry)>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DetailMetadata {
    #[serde(default, deserialize_with = "string_list")]
    pub title: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub year: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub date: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DetailMisc {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FileEntry {
    #[serde(default)]
    pub format: Option<String>,
}

impl ItemDetails {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata
            .title
            .first()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn image_url(&self) -> Option<&str> {
        self.misc
            .as_ref()
            .and_then(|m| m.image.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Name of the first manifest entry with the given format.
    pub fn first_file_with_format(&self, format: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(_, f)| f.format.as_deref() == Some(format))
            .map(|(name, _)| name.trim_start_matches('/'))
    }
}

/// Metadata values arrive as a string, a number, or a list of either.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Scalar>),
        One(Scalar),
    }

    let to_string = |s: Scalar| match s {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
    };

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![to_string(s)],
        Some(OneOrMany::Many(v)) => v.into_iter().map(to_string).collect(),
    })
}

/// Deserialize the `files` object keeping its key order.
fn ordered_files<'de, D>(deserializer: D) -> Result<Vec<(String, FileEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FilesVisitor;

    impl<'de> Visitor<'de> for FilesVisitor {
        type Value = Vec<(String, FileEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of file name to file entry")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut files = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, entry)) = map.next_entry::<String, FileEntry>()? {
                files.push((name, entry));
            }
            Ok(files)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(FilesVisitor)
}

// ============ Year and date resolution ============

/// First year value as an integer, or [`DEFAULT_YEAR`].
pub fn resolve_year(id: &str, values: &[String]) -> i32 {
    match values.first() {
        None => {
            warn!(id, "missing year metadata; defaulting to {}", DEFAULT_YEAR);
            DEFAULT_YEAR
        }
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(id, year = %raw, "unparsable year; defaulting to {}", DEFAULT_YEAR);
            DEFAULT_YEAR
        }),
    }
}

/// Parse `YYYY-MM-DD`, then `YYYY-MM` (first of month), then `YYYY`
/// (January 1). The first format that parses wins.
pub fn parse_date_ladder(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", raw), "%Y-%m-%d"))
        .ok()
}

/// Resolve an item date from its raw date field, falling back to the year.
pub fn resolve_date(id: &str, raw_date: Option<&str>, year: i32) -> NaiveDate {
    let year_str = year.to_string();
    let raw = raw_date.unwrap_or(&year_str);

    parse_date_ladder(raw).unwrap_or_else(|| {
        warn!(id, date = raw, "unparsable date; using start of {}", year);
        NaiveDate::from_ymd_opt(year, 1, 1)
            .or_else(|| NaiveDate::from_ymd_opt(DEFAULT_YEAR, 1, 1))
            .unwrap_or_default()
    })
}

// ============ Fetcher ============

pub struct ItemFetcher {
    client: reqwest::Client,
    cache: Arc<ArtifactCache>,
    throttle: Throttle,
    base_url: reqwest::Url,
    fulltext_format: String,
    max_retries: u32,
}

impl ItemFetcher {
    pub fn new(
        client: reqwest::Client,
        cache: Arc<ArtifactCache>,
        throttle: Throttle,
        config: &HarvestConfig,
    ) -> anyhow::Result<Self> {
        let base_url = reqwest::Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("invalid harvest.base_url {:?}: {}", config.base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("harvest.base_url {:?} cannot be a base URL", config.base_url);
        }
        Ok(Self {
            client,
            cache,
            throttle,
            base_url,
            fulltext_format: config.fulltext_format.clone(),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn details_url(&self, id: &str) -> reqwest::Url {
        let mut url = self.endpoint(&["details", id]);
        url.set_query(Some("output=json"));
        url
    }

    pub fn download_url(&self, id: &str, file_name: &str) -> reqwest::Url {
        self.endpoint(&["download", id, file_name])
    }

    /// Resolve `id` into a complete item or a dropped item.
    ///
    /// Only an identifier the cache refuses (e.g. containing a path
    /// separator) is an error; everything else degrades.
    pub async fn fetch(&self, collection: &str, id: &str) -> Result<Fetched, FetchError> {
        let dropped = |reason: DropReason| {
            Ok(Fetched::Dropped(DroppedItem {
                id: id.to_string(),
                reason,
            }))
        };

        let details = match self.fetch_details(id).await? {
            Ok(d) => d,
            Err(why) => return dropped(DropReason::MetadataUnavailable(why)),
        };

        let Some(title) = details.title().map(str::to_string) else {
            warn!(id, "metadata has no title; dropping item");
            return dropped(DropReason::MissingTitle);
        };

        let year = resolve_year(id, &details.metadata.year);
        let date = resolve_date(id, details.metadata.date.first().map(String::as_str), year);

        let full_text = match details.first_file_with_format(&self.fulltext_format) {
            Some(name) => self.fetch_fulltext(id, name).await?,
            None => {
                debug!(id, format = %self.fulltext_format, "no full-text file in manifest");
                None
            }
        };

        let image_url = details.image_url().map(str::to_string);
        match &image_url {
            Some(url) => self.fetch_image(id, url).await?,
            None => warn!(id, "no thumbnail image for item"),
        }

        let item = ItemMetadata {
            id: id.to_string(),
            collection: collection.to_string(),
            title,
            image_url,
            date,
            year,
            full_text,
        };

        if item.is_indexable() {
            Ok(Fetched::Item(item))
        } else {
            dropped(DropReason::MissingFullText)
        }
    }

    /// Outer error: cache refused the key. Inner error: the item degrades.
    async fn fetch_details(&self, id: &str) -> Result<Result<ItemDetails, String>, FetchError> {
        let url = self.details_url(id);
        let (client, throttle, retries) = (&self.client, &self.throttle, self.max_retries);
        let lookup = self
            .cache
            .get_or_fetch(ArtifactKind::Metadata, id, || async move {
                throttle.acquire().await;
                http::get_bytes(client, url.as_str(), retries).await
            })
            .await;

        let bytes = match lookup {
            Ok(l) => l.into_bytes(),
            Err(ArtifactError::Cache(e)) => return Err(e.into()),
            Err(ArtifactError::Http(e)) => {
                warn!(id, error = %e, "could not fetch metadata");
                return Ok(Err(e.to_string()));
            }
        };

        Ok(ItemDetails::parse(&bytes).map_err(|e| {
            warn!(id, error = %e, "malformed metadata");
            format!("malformed metadata: {}", e)
        }))
    }

    async fn fetch_fulltext(&self, id: &str, file_name: &str) -> Result<Option<String>, FetchError> {
        let url = self.download_url(id, file_name);
        let (client, retries) = (&self.client, self.max_retries);
        let lookup = self
            .cache
            .get_or_fetch(ArtifactKind::FullText, id, || async move {
                http::get_bytes(client, url.as_str(), retries).await
            })
            .await;

        match lookup {
            Ok(l) => {
                let text = normalize_fulltext(id, &l.into_bytes());
                if text.trim().is_empty() {
                    warn!(id, "full text is empty");
                    return Ok(None);
                }
                Ok(Some(text))
            }
            Err(ArtifactError::Cache(e)) => Err(e.into()),
            Err(ArtifactError::Http(e)) => {
                warn!(id, error = %e, "could not fetch full text");
                Ok(None)
            }
        }
    }

    async fn fetch_image(&self, id: &str, image_url: &str) -> Result<(), FetchError> {
        let (client, retries) = (&self.client, self.max_retries);
        let lookup = self
            .cache
            .get_or_fetch(ArtifactKind::Image, id, || async move {
                http::get_bytes(client, image_url, retries).await
            })
            .await;

        match lookup {
            Ok(_) => Ok(()),
            Err(ArtifactError::Cache(e)) => Err(e.into()),
            Err(ArtifactError::Http(e)) => {
                warn!(id, error = %e, "could not fetch thumbnail");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArtifactStore, MemoryArtifactStore};

    const DETAILS: &str = r#"{
        "metadata": {
            "identifier": ["lambda_1923_05_02"],
            "title": ["Lambda, May 2 1923"],
            "year": ["1923"],
            "date": ["1923-05-02"]
        },
        "misc": {"image": "https://archive.example/services/img/lambda_1923_05_02"},
        "files": {
            "/lambda_1923_05_02.pdf": {"format": "Text PDF"},
            "/lambda_1923_05_02_djvu.txt": {"format": "DjVuTXT"},
            "/lambda_1923_05_02_other_djvu.txt": {"format": "DjVuTXT"}
        }
    }"#;

    #[test]
    fn test_parse_details() {
        let d = ItemDetails::parse(DETAILS.as_bytes()).unwrap();
        assert_eq!(d.title(), Some("Lambda, May 2 1923"));
        assert_eq!(d.metadata.year, vec!["1923"]);
        assert_eq!(
            d.image_url(),
            Some("https://archive.example/services/img/lambda_1923_05_02")
        );
        assert_eq!(d.files.len(), 3);
    }

    #[test]
    fn test_first_matching_file_wins() {
        let d = ItemDetails::parse(DETAILS.as_bytes()).unwrap();
        assert_eq!(
            d.first_file_with_format("DjVuTXT"),
            Some("lambda_1923_05_02_djvu.txt")
        );
        assert_eq!(d.first_file_with_format("Abbyy GZ"), None);
    }

    #[test]
    fn test_parse_sparse_details() {
        let d = ItemDetails::parse(br#"{"metadata": {"title": "Solo", "year": 1931}}"#).unwrap();
        assert_eq!(d.title(), Some("Solo"));
        assert_eq!(d.metadata.year, vec!["1931"]);
        assert!(d.image_url().is_none());
        assert!(d.files.is_empty());
    }

    #[test]
    fn test_blank_title_is_missing() {
        let d = ItemDetails::parse(br#"{"metadata": {"title": ["  "]}}"#).unwrap();
        assert_eq!(d.title(), None);
    }

    #[test]
    fn test_date_ladder_full_date() {
        assert_eq!(
            resolve_date("x", Some("1923-05-02"), 1923),
            NaiveDate::from_ymd_opt(1923, 5, 2).unwrap()
        );
    }

    #[test]
    fn test_date_ladder_year_month() {
        assert_eq!(
            resolve_date("x", Some("1923-05"), 1923),
            NaiveDate::from_ymd_opt(1923, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_date_ladder_year_only() {
        assert_eq!(
            resolve_date("x", None, 1923),
            NaiveDate::from_ymd_opt(1923, 1, 1).unwrap()
        );
        assert_eq!(
            resolve_date("x", Some("1923"), 1923),
            NaiveDate::from_ymd_opt(1923, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_no_year_no_date_defaults_to_1900() {
        let year = resolve_year("x", &[]);
        assert_eq!(year, 1900);
        assert_eq!(
            resolve_date("x", None, year),
            NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_unparsable_inputs_degrade() {
        assert_eq!(resolve_year("x", &["circa 1920".to_string()]), 1900);
        assert_eq!(
            resolve_date("x", Some("spring 1921"), 1921),
            NaiveDate::from_ymd_opt(1921, 1, 1).unwrap()
        );
    }

    fn offline_fetcher(store: Arc<MemoryArtifactStore>) -> ItemFetcher {
        // Nothing listens on the discard port; any request would fail fast.
        let config = HarvestConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            ..HarvestConfig::default()
        };
        ItemFetcher::new(
            reqwest::Client::new(),
            Arc::new(ArtifactCache::new(store)),
            Throttle::from_millis(0),
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fully_cached_item_resolves_offline() {
        let store = Arc::new(MemoryArtifactStore::new());
        let id = "lambda_1923_05_02";
        store
            .put(ArtifactKind::Metadata, id, DETAILS.as_bytes())
            .await
            .unwrap();
        store
            .put(ArtifactKind::FullText, id, b"The stu-\ndent council met.")
            .await
            .unwrap();
        store.put(ArtifactKind::Image, id, b"GIF89a").await.unwrap();

        let fetcher = offline_fetcher(store);
        let Fetched::Item(item) = fetcher.fetch("lambda", id).await.unwrap() else {
            panic!("expected a complete item");
        };

        assert_eq!(item.collection, "lambda");
        assert_eq!(item.year, 1923);
        assert_eq!(item.date, NaiveDate::from_ymd_opt(1923, 5, 2).unwrap());
        assert_eq!(item.full_text.as_deref(), Some("The student council met."));
    }

    #[tokio::test]
    async fn test_unreachable_metadata_drops_item() {
        let fetcher = offline_fetcher(Arc::new(MemoryArtifactStore::new()));
        let out = fetcher.fetch("lambda", "nothing_here").await.unwrap();
        assert!(matches!(
            out,
            Fetched::Dropped(DroppedItem {
                reason: DropReason::MetadataUnavailable(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_no_ocr_file_drops_item() {
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .put(
                ArtifactKind::Metadata,
                "noocr",
                br#"{"metadata":{"title":["No OCR"],"year":["1950"]},"files":{"a.pdf":{"format":"Text PDF"}}}"#,
            )
            .await
            .unwrap();

        let out = offline_fetcher(store).fetch("c", "noocr").await.unwrap();
        assert_eq!(
            out,
            Fetched::Dropped(DroppedItem {
                id: "noocr".into(),
                reason: DropReason::MissingFullText,
            })
        );
    }

    #[tokio::test]
    async fn test_missing_title_drops_item() {
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .put(ArtifactKind::Metadata, "untitled", br#"{"metadata":{"year":["1950"]}}"#)
            .await
            .unwrap();

        let out = offline_fetcher(store).fetch("c", "untitled").await.unwrap();
        assert!(matches!(
            out,
            Fetched::Dropped(DroppedItem {
                reason: DropReason::MissingTitle,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_path_like_identifier_is_an_error() {
        let fetcher = offline_fetcher(Arc::new(MemoryArtifactStore::new()));
        assert!(fetcher.fetch("c", "../etc").await.is_err());
    }

    #[test]
    fn test_urls() {
        let fetcher = offline_fetcher(Arc::new(MemoryArtifactStore::new()));
        assert_eq!(
            fetcher.details_url("abc").as_str(),
            "http://127.0.0.1:9/details/abc?output=json"
        );
        assert_eq!(
            fetcher.download_url("abc", "abc djvu.txt").as_str(),
            "http://127.0.0.1:9/download/abc/abc%20djvu.txt"
        );
    }
}
