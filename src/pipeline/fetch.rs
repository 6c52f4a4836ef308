//! Document fetching with a name-keyed local store.
//!
//! ## Cache semantics
//!
//! The store is keyed by the deterministic local name
//! `mesa_{table}_{unitId}.{ext}`. If a file with that name exists it is
//! returned as-is without network access, whatever its content. Bodies are
//! checked for the `%PDF` magic *before* they are persisted, and every write
//! goes to a temp file in the same directory followed by a rename, so two
//! workers writing the same name never interleave and a crash never leaves a
//! half-written document under the final name.
//!
//! ## Why block_on inside the worker?
//!
//! Each unit runs on a `spawn_blocking` thread. The async `reqwest` client is
//! driven from there through the runtime [`Handle`], which keeps one HTTP
//! stack for the whole crate and never parks a runtime worker thread.

use crate::config::{ExtractionConfig, MAX_FETCH_RETRIES};
use crate::error::{ActaError, StageError};
use crate::model::UnitDescriptor;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Retrieves a document by reference into local storage.
pub trait DocumentFetcher: Send + Sync {
    /// Return a local path holding the document for `reference`, stored as
    /// `local_name`. Performs no network I/O if `local_name` already exists.
    fn fetch(&self, reference: &str, local_name: &str) -> Result<PathBuf, StageError>;
}

// ── Local store ──────────────────────────────────────────────────────────

/// A directory of fetched documents, one file per local name.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, local_name: &str) -> PathBuf {
        self.dir.join(local_name)
    }

    pub fn contains(&self, local_name: &str) -> bool {
        self.path_for(local_name).is_file()
    }

    /// Return the stored path for `local_name`, calling `fetch` only when
    /// the name is absent.
    pub fn get_or_insert_with<F>(&self, local_name: &str, fetch: F) -> Result<PathBuf, StageError>
    where
        F: FnOnce() -> Result<Vec<u8>, StageError>,
    {
        let path = self.path_for(local_name);
        if path.is_file() {
            debug!("Store hit: {}", path.display());
            return Ok(path);
        }
        let bytes = fetch()?;
        self.put(local_name, &bytes)
    }

    /// Atomically write `bytes` under `local_name`.
    pub fn put(&self, local_name: &str, bytes: &[u8]) -> Result<PathBuf, StageError> {
        let dest = self.path_for(local_name);
        let store_err = |detail: String| StageError::Store {
            path: dest.clone(),
            detail,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| store_err(e.to_string()))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| store_err(e.to_string()))?;
        tmp.write_all(bytes).map_err(|e| store_err(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| store_err(e.to_string()))?;
        tmp.persist(&dest)
            .map_err(|e| store_err(e.error.to_string()))?;

        Ok(dest)
    }
}

/// Offline fetching: serve stored documents only, never touch the network.
impl DocumentFetcher for DocumentStore {
    fn fetch(&self, _reference: &str, local_name: &str) -> Result<PathBuf, StageError> {
        let path = self.path_for(local_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StageError::Store {
                path,
                detail: "not in local store (offline mode)".into(),
            })
        }
    }
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Deterministic store name for a unit's document:
/// `mesa_{table}_{unitId}.{ext}` with the extension taken from the reference.
pub fn local_name(unit: &UnitDescriptor, reference: &str) -> String {
    let id = RE_UNSAFE_CHARS.replace_all(&unit.unit_id, "_");
    format!(
        "mesa_{}_{}.{}",
        unit.table_number,
        id,
        reference_extension(reference)
    )
}

/// Lower-cased extension of the reference's last path segment, `pdf` when
/// there is none usable.
fn reference_extension(reference: &str) -> String {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "pdf".to_string())
}

// ── HTTP fetcher ─────────────────────────────────────────────────────────

/// Fetches documents over HTTP into a [`DocumentStore`].
pub struct HttpFetcher {
    store: DocumentStore,
    client: reqwest::Client,
    runtime: Handle,
    base_url: Option<reqwest::Url>,
    timeout_secs: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl HttpFetcher {
    /// Build a fetcher from the run configuration.
    ///
    /// Must be called from within a Tokio runtime; downloads are driven on
    /// that runtime from the calling worker thread.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ActaError> {
        let runtime = Handle::try_current()
            .map_err(|e| ActaError::Internal(format!("HttpFetcher needs a Tokio runtime: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| ActaError::Internal(format!("HTTP client: {e}")))?;

        let base_url = match config.document_base_url.as_deref() {
            Some(raw) => Some(reqwest::Url::parse(raw).map_err(|e| {
                ActaError::InvalidConfig(format!("document base URL '{raw}': {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            store: DocumentStore::new(&config.store_dir),
            client,
            runtime,
            base_url,
            timeout_secs: config.download_timeout_secs,
            max_retries: config.max_fetch_retries.min(MAX_FETCH_RETRIES),
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Turn a reference into an absolute URL.
    fn resolve_url(&self, reference: &str) -> Result<reqwest::Url, StageError> {
        resolve_reference(reference, self.base_url.as_ref())
    }

    /// Download with bounded retry on transient failures.
    fn download(&self, url: &reqwest::Url) -> Result<Vec<u8>, StageError> {
        let mut attempt = 0;
        loop {
            match self.download_once(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                    warn!(
                        "Download retry {}/{} for {} after {}ms: {}",
                        attempt, self.max_retries, url, backoff, e
                    );
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn download_once(&self, url: &reqwest::Url) -> Result<Vec<u8>, StageError> {
        info!("Downloading acta: {}", url);
        let url_str = url.to_string();
        let timeout_secs = self.timeout_secs;
        let map_reqwest = |e: reqwest::Error| {
            if e.is_timeout() {
                StageError::DownloadTimeout {
                    url: url_str.clone(),
                    secs: timeout_secs,
                }
            } else {
                StageError::DownloadFailed {
                    url: url_str.clone(),
                    reason: e.to_string(),
                }
            }
        };

        let bytes = self.runtime.block_on(async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(map_reqwest)?;
            let status = response.status();
            if !status.is_success() {
                return Err(StageError::HttpStatus {
                    url: url_str.clone(),
                    status: status.as_u16(),
                });
            }
            response.bytes().await.map_err(map_reqwest)
        })?;

        check_pdf_magic(&url_str, &bytes)?;
        Ok(bytes.to_vec())
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch(&self, reference: &str, local_name: &str) -> Result<PathBuf, StageError> {
        if self.store.contains(local_name) {
            return Ok(self.store.path_for(local_name));
        }
        let url = self.resolve_url(reference)?;
        self.store
            .get_or_insert_with(local_name, || self.download(&url))
    }
}

/// Longest single wait between download attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`, capped
/// at [`MAX_BACKOFF_MS`].
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Resolve a reference to an absolute HTTP(S) URL, joining relative
/// references onto `base` when one is configured.
pub fn resolve_reference(
    reference: &str,
    base: Option<&reqwest::Url>,
) -> Result<reqwest::Url, StageError> {
    let invalid = |reason: String| StageError::InvalidReference {
        reference: reference.to_string(),
        reason,
    };
    let trimmed = reference.trim();

    let url = match (reqwest::Url::parse(trimmed), base) {
        (Ok(url), _) => url,
        (Err(_), Some(base)) => base.join(trimmed).map_err(|e| invalid(e.to_string()))?,
        (Err(e), None) => return Err(invalid(format!("{e}; no base URL configured"))),
    };

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn check_pdf_magic(url: &str, bytes: &[u8]) -> Result<(), StageError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(StageError::NotADocument {
            url: url.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unit(id: &str) -> UnitDescriptor {
        UnitDescriptor {
            department: "D".into(),
            municipality: "M".into(),
            zone: "Z".into(),
            center: "C".into(),
            table_number: 42,
            unit_id: id.into(),
            document: None,
            tags: vec![],
        }
    }

    #[test]
    fn local_name_is_deterministic() {
        let u = unit("0401-AB");
        assert_eq!(
            local_name(&u, "https://cdn.example/x/acta.PDF?token=1"),
            "mesa_42_0401-AB.pdf"
        );
        assert_eq!(local_name(&u, "acta123.pdf"), "mesa_42_0401-AB.pdf");
        assert_eq!(local_name(&u, "https://cdn.example/download"), "mesa_42_0401-AB.pdf");
    }

    #[test]
    fn local_name_sanitises_unit_id() {
        let u = unit("../etc/pass wd");
        assert_eq!(local_name(&u, "a.pdf"), "mesa_42____etc_pass_wd.pdf");
    }

    #[test]
    fn store_calls_fetch_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("actas"));
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"%PDF-1.7 body".to_vec())
        };

        let first = store.get_or_insert_with("mesa_1_a.pdf", fetch).unwrap();
        let second = store
            .get_or_insert_with("mesa_1_a.pdf", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"%PDF-1.7 body");
    }

    #[test]
    fn store_keeps_nothing_on_failed_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let err = store
            .get_or_insert_with("mesa_2_b.pdf", || {
                Err(StageError::DownloadFailed {
                    url: "u".into(),
                    reason: "reset".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, StageError::DownloadFailed { .. }));
        assert!(!store.contains("mesa_2_b.pdf"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn concurrent_writers_never_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let bodies: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

        std::thread::scope(|s| {
            for body in &bodies {
                let store = &store;
                s.spawn(move || store.put("mesa_3_c.pdf", body).unwrap());
            }
        });

        let stored = std::fs::read(store.path_for("mesa_3_c.pdf")).unwrap();
        assert!(bodies.contains(&stored), "stored file is a mix of writers");
        // Only the final file remains; temp files were renamed away.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn resolves_absolute_and_relative_references() {
        let base = reqwest::Url::parse("https://actas.example/docs/").unwrap();
        let abs = resolve_reference("https://cdn.example/a.pdf", Some(&base)).unwrap();
        assert_eq!(abs.as_str(), "https://cdn.example/a.pdf");
        let rel = resolve_reference("acta123.pdf", Some(&base)).unwrap();
        assert_eq!(rel.as_str(), "https://actas.example/docs/acta123.pdf");
    }

    #[test]
    fn relative_reference_without_base_is_invalid() {
        let err = resolve_reference("acta123.pdf", None).unwrap_err();
        assert!(matches!(err, StageError::InvalidReference { .. }));
        let err = resolve_reference("ftp://host/a.pdf", None).unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn rejects_non_pdf_bodies() {
        assert!(check_pdf_magic("u", b"%PDF-1.4").is_ok());
        let err = check_pdf_magic("u", b"<html>").unwrap_err();
        assert_eq!(
            err,
            StageError::NotADocument {
                url: "u".into(),
                magic: b"<htm".to_vec()
            }
        );
        assert!(check_pdf_magic("u", b"").is_err());
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1_000);
        assert_eq!(backoff_ms(500, 3), 2_000);
        assert_eq!(backoff_ms(500, 65), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, u32::MAX), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(0, 80), 0);
    }

    #[test]
    fn offline_store_serves_only_stored_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let err = store.fetch("https://h/a.pdf", "mesa_5_e.pdf").unwrap_err();
        assert!(matches!(err, StageError::Store { .. }));
        store.put("mesa_5_e.pdf", b"%PDF-1.7").unwrap();
        assert_eq!(
            store.fetch("https://h/a.pdf", "mesa_5_e.pdf").unwrap(),
            store.path_for("mesa_5_e.pdf")
        );
    }

    #[tokio::test]
    async fn http_fetcher_serves_cached_file_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::builder()
            .store_dir(dir.path())
            .max_fetch_retries(0)
            .build()
            .unwrap();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let cached = fetcher.store().put("mesa_9_z.pdf", b"%PDF-cached").unwrap();

        // Unresolvable host: any network attempt would fail.
        let path = fetcher
            .fetch("https://unreachable.invalid/a.pdf", "mesa_9_z.pdf")
            .unwrap();
        assert_eq!(path, cached);
        let again = fetcher
            .fetch("https://unreachable.invalid/a.pdf", "mesa_9_z.pdf")
            .unwrap();
        assert_eq!(again, cached);
    }

    /// Fetcher bound to its own runtime; `fetch` is then called from the
    /// plain test thread, as a blocking worker would.
    fn http_fetcher(store: &Path, retries: u32) -> (tokio::runtime::Runtime, HttpFetcher) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = ExtractionConfig::builder()
            .store_dir(store)
            .download_timeout_secs(5)
            .max_fetch_retries(retries)
            .retry_backoff_ms(0)
            .build()
            .unwrap();
        let fetcher = {
            let _guard = rt.enter();
            HttpFetcher::new(&config).unwrap()
        };
        (rt, fetcher)
    }

    #[test]
    fn transient_statuses_are_retried_then_persisted() {
        let server = StubServer::scripted(vec![
            (503, "busy"),
            (503, "busy"),
            (200, "%PDF-1.7 acta"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let (_rt, fetcher) = http_fetcher(dir.path(), 2);

        let path = fetcher.fetch(&server.url("/acta.pdf"), "mesa_1_a.pdf").unwrap();
        assert_eq!(server.hits(), 3);
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 acta");

        let again = fetcher.fetch(&server.url("/acta.pdf"), "mesa_1_a.pdf").unwrap();
        assert_eq!(again, path);
        assert_eq!(server.hits(), 3, "stored document was downloaded again");
    }

    #[test]
    fn client_error_status_fails_without_retry() {
        let server = StubServer::scripted(vec![(404, "missing"), (200, "%PDF-1.7")]);
        let dir = tempfile::tempdir().unwrap();
        let (_rt, fetcher) = http_fetcher(dir.path(), 2);

        let err = fetcher.fetch(&server.url("/gone.pdf"), "mesa_2_b.pdf").unwrap_err();
        assert!(matches!(err, StageError::HttpStatus { status: 404, .. }), "got: {err}");
        assert_eq!(server.hits(), 1);
        assert!(!fetcher.store().contains("mesa_2_b.pdf"));
    }

    #[test]
    fn html_body_is_never_persisted() {
        let server = StubServer::scripted(vec![(200, "<html>login</html>")]);
        let dir = tempfile::tempdir().unwrap();
        let (_rt, fetcher) = http_fetcher(dir.path(), 2);

        let err = fetcher.fetch(&server.url("/acta.pdf"), "mesa_3_c.pdf").unwrap_err();
        assert!(matches!(err, StageError::NotADocument { .. }), "got: {err}");
        assert_eq!(server.hits(), 1);
        assert!(!fetcher.store().contains("mesa_3_c.pdf"));
        let leftovers = std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn oversized_retry_budget_is_capped() {
        let server = StubServer::scripted(vec![(503, "busy")]);
        let dir = tempfile::tempdir().unwrap();
        let (_rt, fetcher) = http_fetcher(dir.path(), 80);

        let err = fetcher.fetch(&server.url("/acta.pdf"), "mesa_4_d.pdf").unwrap_err();
        assert!(matches!(err, StageError::HttpStatus { status: 503, .. }), "got: {err}");
        assert_eq!(server.hits(), MAX_FETCH_RETRIES as usize + 1);
    }
}
