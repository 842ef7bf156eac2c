use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{ResolutionError, Resolver};

/// `$JAVA_HOME/bin/java` when configured, otherwise the first `java` on `PATH`.
pub struct JavaResolver {
    java_home: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl JavaResolver {
    pub fn new(java_home: Option<PathBuf>) -> Self {
        Self::with_search_path(java_home, env::var_os("PATH"))
    }

    pub fn with_search_path(java_home: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            java_home,
            search_path,
        }
    }

    fn executable() -> String {
        format!("java{}", env::consts::EXE_SUFFIX)
    }
}

#[async_trait]
impl Resolver for JavaResolver {
    fn name(&self) -> &str {
        "java runtime"
    }

    async fn resolve(&self) -> Result<PathBuf, ResolutionError> {
        let exe = Self::executable();
        let mut searched = Vec::new();

        if let Some(home) = &self.java_home {
            let candidate = home.join("bin").join(&exe);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate.display().to_string());
        }

        if let Some(path) = &self.search_path {
            if let Some(found) = env::split_paths(path)
                .map(|dir| dir.join(&exe))
                .find(|candidate| candidate.is_file())
            {
                return Ok(found);
            }
            searched.push("PATH".to_string());
        }

        Err(ResolutionError::RuntimeNotFound {
            searched: if searched.is_empty() {
                "nothing".to_string()
            } else {
                searched.join(", ")
            },
        })
    }
}
