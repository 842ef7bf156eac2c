use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::{ResolutionError, Resolver, artifact_url, fetch_cached};

pub const JAR_FILE: &str = "snpEff.jar";
pub const PREDICTOR_FILE: &str = "snpEffectPredictor.bin";
pub const GENOME_FILE: &str = "genome.fasta";

/// The engine jar: `<dir>/snpeff/<version>/snpEff.jar`.
pub struct JarResolver {
    client: reqwest::Client,
    local: PathBuf,
    remote: Url,
}

impl JarResolver {
    pub fn new(
        client: reqwest::Client,
        resource_dir: &Path,
        resource_url: &Url,
        version: &str,
    ) -> Result<Self, ResolutionError> {
        let artifact = format!("snpeff-{version}.jar");
        Ok(Self {
            client,
            local: resource_dir.join("snpeff").join(version).join(JAR_FILE),
            remote: artifact_url(resource_url, &["snpeff", version, &artifact])?,
        })
    }
}

#[async_trait]
impl Resolver for JarResolver {
    fn name(&self) -> &str {
        "engine jar"
    }

    async fn resolve(&self) -> Result<PathBuf, ResolutionError> {
        fetch_cached(&self.client, &self.remote, &self.local).await
    }
}

/// The prediction database. Resolves to the data directory the engine is
/// pointed at, not to the database file itself.
pub struct DatabaseResolver {
    client: reqwest::Client,
    data_dir: PathBuf,
    local: PathBuf,
    remote: Url,
}

impl DatabaseResolver {
    pub fn new(
        client: reqwest::Client,
        resource_dir: &Path,
        resource_url: &Url,
        database_version: &str,
    ) -> Result<Self, ResolutionError> {
        let data_dir = resource_dir.join("snpeff").join("data");
        Ok(Self {
            client,
            local: data_dir.join(database_version).join(PREDICTOR_FILE),
            remote: artifact_url(
                resource_url,
                &["snpeff-data", database_version, PREDICTOR_FILE],
            )?,
            data_dir,
        })
    }
}

#[async_trait]
impl Resolver for DatabaseResolver {
    fn name(&self) -> &str {
        "prediction database"
    }

    async fn resolve(&self) -> Result<PathBuf, ResolutionError> {
        fetch_cached(&self.client, &self.remote, &self.local).await?;
        Ok(self.data_dir.clone())
    }
}

pub struct ReferenceGenomeResolver {
    client: reqwest::Client,
    local: PathBuf,
    remote: Url,
}

impl ReferenceGenomeResolver {
    pub fn new(
        client: reqwest::Client,
        resource_dir: &Path,
        resource_url: &Url,
        genome_version: &str,
    ) -> Result<Self, ResolutionError> {
        Ok(Self {
            client,
            local: resource_dir
                .join("reference-genome")
                .join(genome_version)
                .join(GENOME_FILE),
            remote: artifact_url(resource_url, &["reference-genome", genome_version, GENOME_FILE])?,
        })
    }
}

#[async_trait]
impl Resolver for ReferenceGenomeResolver {
    fn name(&self) -> &str {
        "reference genome"
    }

    async fn resolve(&self) -> Result<PathBuf, ResolutionError> {
        fetch_cached(&self.client, &self.remote, &self.local).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://artifacts.example.org/dcc").unwrap()
    }

    #[test]
    fn layouts() {
        let dir = Path::new("/res");
        let client = reqwest::Client::new();

        let jar = JarResolver::new(client.clone(), dir, &base(), "3.6c").unwrap();
        assert_eq!(jar.local, Path::new("/res/snpeff/3.6c/snpEff.jar"));
        assert_eq!(
            jar.remote.as_str(),
            "https://artifacts.example.org/dcc/snpeff/3.6c/snpeff-3.6c.jar"
        );

        let db = DatabaseResolver::new(client.clone(), dir, &base(), "3.6c-GRCh37.75").unwrap();
        assert_eq!(db.data_dir, Path::new("/res/snpeff/data"));
        assert_eq!(
            db.local,
            Path::new("/res/snpeff/data/3.6c-GRCh37.75/snpEffectPredictor.bin")
        );
        assert_eq!(
            db.remote.as_str(),
            "https://artifacts.example.org/dcc/snpeff-data/3.6c-GRCh37.75/snpEffectPredictor.bin"
        );

        let genome = ReferenceGenomeResolver::new(client, dir, &base(), "GRCh37.75.v1").unwrap();
        assert_eq!(
            genome.local,
            Path::new("/res/reference-genome/GRCh37.75.v1/genome.fasta")
        );
    }

    #[tokio::test]
    async fn cached_database_resolves_to_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("snpeff/data/3.6c-GRCh37.75");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join(PREDICTOR_FILE), b"bin").unwrap();

        let unreachable = Url::parse("http://127.0.0.1:9/dcc").unwrap();
        let db = DatabaseResolver::new(
            reqwest::Client::new(),
            dir.path(),
            &unreachable,
            "3.6c-GRCh37.75",
        )
        .unwrap();
        assert_eq!(db.resolve().await.unwrap(), dir.path().join("snpeff/data"));
    }
}
