//! YTS catalog client.
//!
//! Fetching is async (`reqwest`); parsing is plain functions over the page
//! text so `scraper::Html` (not `Send`) never lives across an await.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use maxx_proto::catalog::{CatalogEntry, CatalogProvider, QualityOption, SearchFilters};
use maxx_proto::config::CatalogConfig;
use maxx_proto::error::{ActionError, CatalogError};
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("streammaxx/", env!("CARGO_PKG_VERSION"));

/// Rating shown when a card has none.
const UNKNOWN_RATING: &str = "N/A";

/// Shared HTTP client with the configured timeouts.
pub fn build_client(config: &CatalogConfig) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

pub struct YtsCatalog {
    client: Client,
    base: Url,
}

impl YtsCatalog {
    pub fn new(client: Client, config: &CatalogConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid catalog base_url {:?}", config.base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("catalog base_url {:?} cannot carry a path", config.base_url);
        }
        Ok(Self { client, base })
    }

    /// `{base}/browse-movies/{query}/{quality}/{genre}/{rating}/{order}/{year}/{language}`
    pub fn search_url(&self, query: &str, filters: &SearchFilters) -> Result<Url, CatalogError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Network(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend([
                "browse-movies",
                query,
                filters.quality.as_str(),
                filters.genre.as_str(),
                filters.rating.as_str(),
                filters.order.as_str(),
                filters.year.as_str(),
                filters.language.as_str(),
            ]);
        Ok(url)
    }

    async fn fetch_html(&self, url: Url) -> Result<String, CatalogError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Network(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))
    }
}

impl CatalogProvider for YtsCatalog {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let url = self.search_url(query, filters)?;
        let html = self.fetch_html(url).await?;
        parse_browse_page(&html, &self.base)
    }

    async fn list_qualities(&self, detail_ref: &str) -> Result<Vec<QualityOption>, CatalogError> {
        let url = resolve(&self.base, detail_ref)
            .ok_or_else(|| CatalogError::Network(format!("bad detail link {:?}", detail_ref)))?;
        let html = self.fetch_html(url).await?;
        parse_movie_page(&html, &self.base)
    }
}

fn selector(css: &str) -> Result<Selector, CatalogError> {
    Selector::parse(css).map_err(|e| CatalogError::Parse(format!("selector {}: {:?}", css, e)))
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    base.join(href.trim()).ok()
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse a browse-movies result page.
///
/// Missing result container is a parse error.  A container with no cards
/// is an empty result.
pub fn parse_browse_page(html: &str, base: &Url) -> Result<Vec<CatalogEntry>, CatalogError> {
    let document = Html::parse_document(html);

    let container_sel = selector("div.browse-content")?;
    let card_sel = selector("div.browse-movie-wrap")?;
    let title_sel = selector("a.browse-movie-title")?;
    let year_sel = selector(".browse-movie-year")?;
    let caption_sel = selector("figcaption h4")?;
    let img_sel = selector("figure img")?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or_else(|| CatalogError::Parse("no browse-content container".into()))?;

    let mut entries = Vec::new();
    for card in container.select(&card_sel) {
        let Some(title_el) = card.select(&title_sel).next() else {
            debug!("skipping card without title link");
            continue;
        };
        let Some(href) = title_el.value().attr("href") else {
            continue;
        };

        let year = card
            .select(&year_sel)
            .next()
            .map(text_of)
            .and_then(|y| y.parse::<u32>().ok())
            .unwrap_or(0);

        let mut captions = card.select(&caption_sel).map(text_of);
        let rating = captions
            .next()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| UNKNOWN_RATING.to_string());
        let genres: Vec<String> = captions.filter(|g| !g.is_empty()).collect();

        let banner_ref = card
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve(base, src))
            .map(|u| u.to_string())
            .unwrap_or_default();

        let detail_ref = resolve(base, href)
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string());

        entries.push(CatalogEntry {
            title: text_of(title_el),
            detail_ref,
            year,
            rating,
            genres,
            banner_ref,
        });
    }

    Ok(entries)
}

/// Parse a movie detail page into its torrent links, in page order.
pub fn parse_movie_page(html: &str, base: &Url) -> Result<Vec<QualityOption>, CatalogError> {
    let document = Html::parse_document(html);

    let info_sel = selector("#movie-info")?;
    let link_sel = selector(r#"p a[href*="/torrent/download/"]"#)?;

    let info = document
        .select(&info_sel)
        .next()
        .ok_or_else(|| CatalogError::Parse("no movie-info block".into()))?;

    let mut options: Vec<QualityOption> = Vec::new();
    for a in info.select(&link_sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let link = resolve(base, href)
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string());
        if options.iter().any(|o| o.link == link) {
            continue;
        }
        options.push(QualityOption::new(text_of(a), link));
    }

    Ok(options)
}

/// File name for a downloaded torrent: the link's last path segment.
fn torrent_file_name(link: &Url, label: &str) -> String {
    let stem = link
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or(label);
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if safe.ends_with(".torrent") {
        safe
    } else {
        format!("{}.torrent", safe)
    }
}

/// Download the `.torrent` behind a quality option into `dir`.
pub async fn download_torrent(
    client: &Client,
    option: &QualityOption,
    dir: &Path,
) -> Result<PathBuf, ActionError> {
    let url = Url::parse(&option.link)
        .map_err(|e| ActionError::Download(format!("bad link {:?}: {}", option.link, e)))?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ActionError::Download(format!("create {}: {}", dir.display(), e)))?;
    let path = dir.join(torrent_file_name(&url, &option.label));

    info!("Downloading {} to {}", url, path.display());
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ActionError::Download(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ActionError::Download(format!(
            "{} returned status {}",
            url,
            response.status()
        )));
    }

    let written = match write_body(response, &path).await {
        Ok(written) => written,
        Err(e) => {
            match tokio::fs::remove_file(&path).await {
                Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                    warn!("Could not remove partial {}: {}", path.display(), rm)
                }
                _ => debug!("Removed partial {}", path.display()),
            }
            return Err(e);
        }
    };

    if written == 0 {
        warn!("Downloaded torrent {} is empty", path.display());
    }
    Ok(path)
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<usize, ActionError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ActionError::Download(format!("create {}: {}", path.display(), e)))?;
    let mut stream = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ActionError::Download(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ActionError::Download(e.to_string()))?;
        written += chunk.len();
    }
    file.flush()
        .await
        .map_err(|e| ActionError::Download(e.to_string()))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSE: &str = r#"
<html><body>
<div class="browse-content"><div class="container"><section><div class="row">
  <div class="browse-movie-wrap col-xs-10">
    <a href="https://yts.example/movies/the-matrix-1999" class="browse-movie-link">
      <figure>
        <img class="img-responsive" src="/assets/images/movies/the_matrix/medium-cover.jpg">
        <figcaption>
          <h4 class="rating">8.7 / 10</h4>
          <h4>Action</h4>
          <h4>Sci-Fi</h4>
        </figcaption>
      </figure>
    </a>
    <div class="browse-movie-bottom">
      <a href="https://yts.example/movies/the-matrix-1999" class="browse-movie-title">The Matrix</a>
      <div class="browse-movie-year">1999</div>
    </div>
  </div>
  <div class="browse-movie-wrap col-xs-10">
    <a href="/movies/untitled" class="browse-movie-link"><figure></figure></a>
    <div class="browse-movie-bottom">
      <a href="/movies/untitled" class="browse-movie-title">Untitled</a>
      <div class="browse-movie-year">TBA</div>
    </div>
  </div>
  <div class="browse-movie-wrap col-xs-10">
    <div class="browse-movie-bottom">no link here</div>
  </div>
</div></section></div></div>
</body></html>
"#;

    const MOVIE: &str = r#"
<html><body>
<div id="movie-info">
  <h1>The Matrix</h1>
  <p class="hidden-xs hidden-sm"><em>Available in: </em>
    <a href="https://yts.example/torrent/download/AAA" title="720p">720p.BluRay</a>
    <a href="https://yts.example/torrent/download/BBB" title="1080p">1080p.BluRay</a>
    <a href="/torrent/download/CCC" title="2160p">2160p.BluRay</a>
    <a href="https://yts.example/torrent/download/AAA" title="720p">720p.BluRay</a>
    <a href="https://yts.example/movies/other">not a torrent</a>
  </p>
</div>
</body></html>
"#;

    fn base() -> Url {
        Url::parse("https://yts.example").unwrap()
    }

    fn catalog() -> YtsCatalog {
        let config = CatalogConfig {
            base_url: "https://yts.example".into(),
            ..CatalogConfig::default()
        };
        YtsCatalog::new(Client::new(), &config).unwrap()
    }

    #[test]
    fn test_parse_browse_cards() {
        let entries = parse_browse_page(BROWSE, &base()).unwrap();
        assert_eq!(entries.len(), 2);

        let matrix = &entries[0];
        assert_eq!(matrix.title, "The Matrix");
        assert_eq!(matrix.detail_ref, "https://yts.example/movies/the-matrix-1999");
        assert_eq!(matrix.year, 1999);
        assert_eq!(matrix.rating, "8.7 / 10");
        assert_eq!(matrix.genres, vec!["Action", "Sci-Fi"]);
        assert_eq!(
            matrix.banner_ref,
            "https://yts.example/assets/images/movies/the_matrix/medium-cover.jpg"
        );
    }

    #[test]
    fn test_parse_browse_fallbacks() {
        let entries = parse_browse_page(BROWSE, &base()).unwrap();
        let untitled = &entries[1];
        assert_eq!(untitled.year, 0);
        assert_eq!(untitled.rating, "N/A");
        assert!(untitled.genres.is_empty());
        assert!(untitled.banner_ref.is_empty());
        assert_eq!(untitled.detail_ref, "https://yts.example/movies/untitled");
    }

    #[test]
    fn test_empty_grid_is_empty_result() {
        let html = r#"<div class="browse-content"><section><div class="row"></div></section></div>"#;
        assert_eq!(parse_browse_page(html, &base()).unwrap(), Vec::new());
    }

    #[test]
    fn test_missing_container_is_parse_error() {
        let err = parse_browse_page("<html><body><h1>Cloudflare</h1></body></html>", &base());
        assert!(matches!(err, Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_parse_movie_links_in_order() {
        let options = parse_movie_page(MOVIE, &base()).unwrap();
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["720p.BluRay", "1080p.BluRay", "2160p.BluRay"]);
        assert_eq!(options[2].link, "https://yts.example/torrent/download/CCC");
    }

    #[test]
    fn test_movie_page_without_info_is_parse_error() {
        assert!(matches!(
            parse_movie_page("<html></html>", &base()),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_search_url_encodes_segments() {
        let url = catalog()
            .search_url("the matrix", &SearchFilters::default())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://yts.example/browse-movies/the%20matrix/all/all/0/latest/0/en"
        );
    }

    #[test]
    fn test_search_url_keeps_base_path() {
        let config = CatalogConfig {
            base_url: "https://mirror.example/yts/".into(),
            ..CatalogConfig::default()
        };
        let catalog = YtsCatalog::new(Client::new(), &config).unwrap();
        let url = catalog.search_url("0", &SearchFilters::default()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mirror.example/yts/browse-movies/0/all/all/0/latest/0/en"
        );
    }

    #[test]
    fn test_torrent_file_name() {
        let url = Url::parse("https://yts.example/torrent/download/ABC123").unwrap();
        assert_eq!(torrent_file_name(&url, "720p"), "ABC123.torrent");
        let url = Url::parse("https://yts.example/").unwrap();
        assert_eq!(torrent_file_name(&url, "1080p.BluRay"), "1080p.BluRay.torrent");
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            stream.write_all(response).await.unwrap();
        });
        format!("http://{}/torrent/download/ABC123", addr)
    }

    #[tokio::test]
    async fn test_download_writes_torrent() {
        let link = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nd8:announce").await;
        let dir = tempfile::tempdir().unwrap();

        let path = download_torrent(&Client::new(), &QualityOption::new("720p", link), dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("ABC123.torrent"));
        assert_eq!(std::fs::read(&path).unwrap(), b"d8:announce");
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_file() {
        let link = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\nd8:announce").await;
        let dir = tempfile::tempdir().unwrap();

        let err = download_torrent(&Client::new(), &QualityOption::new("720p", link), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Download(_)));
        assert!(!dir.path().join("ABC123.torrent").exists());
    }

    /// Hits the live site.  Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_search() {
        let config = CatalogConfig::default();
        let client = build_client(&config).unwrap();
        let catalog = YtsCatalog::new(client, &config).unwrap();
        let entries = catalog
            .search("matrix", &SearchFilters::default())
            .await
            .unwrap();
        println!("{} entries", entries.len());
        for e in entries.iter().take(3) {
            println!("{} ({}) {} {:?}", e.title, e.year, e.rating, e.genres);
        }
        if let Some(first) = entries.first() {
            let options = catalog.list_qualities(&first.detail_ref).await.unwrap();
            println!("{:?}", options);
        }
    }
}
