//! Locating (and if needed downloading) the engine, its runtime and its data.
//!
//! Every resolver answers with a local path. Remote artifacts are cached
//! under the resource directory and only fetched when missing.

mod artifact;
mod java;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

pub use artifact::{DatabaseResolver, JarResolver, ReferenceGenomeResolver};
pub use java::JavaResolver;

use crate::config::AnnotatorProperties;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("no Java runtime found (searched {searched})")]
    RuntimeNotFound { searched: String },

    #[error("`{url}` cannot be used as a resource base url")]
    InvalidUrl { url: String },

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to download {url}: HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn resolve(&self) -> Result<PathBuf, ResolutionError>;
}

/// Paths the engine is launched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedResources {
    pub java: PathBuf,
    pub jar: PathBuf,
    pub data_dir: PathBuf,
    pub reference_genome: Option<PathBuf>,
}

/// Resolve everything the engine needs. The reference genome is only
/// fetched when asked for; annotation itself does not use it.
pub async fn resolve_all(
    props: &AnnotatorProperties,
    with_reference_genome: bool,
) -> Result<ResolvedResources, ResolutionError> {
    let client = reqwest::Client::new();

    let java = resolve_logged(&JavaResolver::new(props.java_home.clone())).await?;
    let jar = resolve_logged(&JarResolver::new(
        client.clone(),
        &props.resource_dir,
        &props.resource_url,
        &props.version,
    )?)
    .await?;
    let data_dir = resolve_logged(&DatabaseResolver::new(
        client.clone(),
        &props.resource_dir,
        &props.resource_url,
        &props.database_version,
    )?)
    .await?;
    let reference_genome = if with_reference_genome {
        Some(
            resolve_logged(&ReferenceGenomeResolver::new(
                client,
                &props.resource_dir,
                &props.resource_url,
                &props.reference_genome_version,
            )?)
            .await?,
        )
    } else {
        None
    };

    Ok(ResolvedResources {
        java,
        jar,
        data_dir,
        reference_genome,
    })
}

async fn resolve_logged<R: Resolver>(resolver: &R) -> Result<PathBuf, ResolutionError> {
    let path = resolver.resolve().await?;
    info!("Resolved {} to {}", resolver.name(), path.display());
    Ok(path)
}

/// `base` with `segments` appended as path segments.
pub(crate) fn artifact_url(base: &Url, segments: &[&str]) -> Result<Url, ResolutionError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ResolutionError::InvalidUrl {
            url: base.to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Return `local` if it is already cached, otherwise download `remote` into it.
///
/// The body is written next to the target and renamed into place, so an
/// interrupted download never looks like a cache hit.
pub(crate) async fn fetch_cached(
    client: &reqwest::Client,
    remote: &Url,
    local: &Path,
) -> Result<PathBuf, ResolutionError> {
    if let Ok(meta) = fs::metadata(local).await {
        if meta.is_file() && meta.len() > 0 {
            debug!("cache hit for {}", local.display());
            return Ok(local.to_path_buf());
        }
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ResolutionError::Io { path, source }
    };

    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    info!("Downloading {} to {}", remote, local.display());
    let download_err = |source| ResolutionError::Download {
        url: remote.to_string(),
        source,
    };
    let mut response = client.get(remote.clone()).send().await.map_err(download_err)?;
    if !response.status().is_success() {
        return Err(ResolutionError::Status {
            url: remote.to_string(),
            status: response.status(),
        });
    }

    // genomes and databases run to gigabytes, so the body goes straight to disk
    let partial = local.with_extension("part");
    let mut file = fs::File::create(&partial).await.map_err(io_err(&partial))?;
    let mut written: u64 = 0;
    let streamed = async {
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            file.write_all(&chunk).await.map_err(io_err(&partial))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err(&partial))
    }
    .await;
    drop(file);
    if let Err(err) = streamed {
        if let Err(cleanup) = fs::remove_file(&partial).await {
            warn!("could not remove {}: {cleanup}", partial.display());
        }
        return Err(err);
    }
    fs::rename(&partial, local).await.map_err(io_err(local))?;

    info!("Downloaded {} bytes to {}", written, local.display());
    Ok(local.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_url_appends_segments() {
        let base = Url::parse("https://artifacts.example.org/simple/org/icgc/dcc").unwrap();
        let url = artifact_url(&base, &["snpeff", "3.6c", "snpeff-3.6c.jar"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://artifacts.example.org/simple/org/icgc/dcc/snpeff/3.6c/snpeff-3.6c.jar"
        );

        let trailing = Url::parse("https://artifacts.example.org/dcc/").unwrap();
        assert_eq!(
            artifact_url(&trailing, &["a"]).unwrap().as_str(),
            "https://artifacts.example.org/dcc/a"
        );
    }

    #[test]
    fn opaque_urls_are_rejected() {
        let base = Url::parse("mailto:someone@example.org").unwrap();
        assert!(matches!(
            artifact_url(&base, &["x"]),
            Err(ResolutionError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn cached_file_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("snpEff.jar");
        std::fs::write(&local, b"jar").unwrap();

        // unroutable: any network access would fail the test
        let remote = Url::parse("http://127.0.0.1:9/snpEff.jar").unwrap();
        let path = fetch_cached(&reqwest::Client::new(), &remote, &local).await.unwrap();
        assert_eq!(path, local);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nested").join("genome.fasta");
        let remote = Url::parse("http://127.0.0.1:9/genome.fasta").unwrap();

        let err = fetch_cached(&reqwest::Client::new(), &remote, &local).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Download { .. }));
        assert!(!local.exists());
        assert!(local.parent().unwrap().is_dir());
    }

    /// Serves `body` with `status` to the first connection, then stops.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> Url {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{addr}/dcc/genome.fasta")).unwrap()
    }

    #[tokio::test]
    async fn large_download_is_streamed_into_place() {
        let body: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let remote = serve_once("200 OK", body.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("reference-genome").join("genome.fasta");

        let path = fetch_cached(&reqwest::Client::new(), &remote, &local).await.unwrap();
        assert_eq!(path, local);
        assert_eq!(std::fs::read(&local).unwrap(), body);
        assert!(!local.with_extension("part").exists());
    }

    #[tokio::test]
    async fn http_error_status_leaves_no_file() {
        let remote = serve_once("404 Not Found", b"missing".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("snpEff.jar");

        let err = fetch_cached(&reqwest::Client::new(), &remote, &local).await.unwrap_err();
        assert!(
            matches!(err, ResolutionError::Status { status, .. } if status == reqwest::StatusCode::NOT_FOUND)
        );
        assert!(!local.exists());
        assert!(!local.with_extension("part").exists());
    }
}
