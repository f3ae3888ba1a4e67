//! Source-control snapshot written to `<tier>/meta`

use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::filesystem::FileSystem;
use crate::subprocess::GitRunner;

pub const META_DIR: &str = "meta";

/// Written in place of a value git could not produce
pub const FALLBACK: &str = "ERROR\n";

const DESCRIBE_FALLBACKS: &[&[&str]] = &[&[], &["--tags"], &["--all"]];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMetadata {
    pub commit: String,
    pub tree_hash: String,
    pub description: String,
}

impl TierMetadata {
    pub async fn capture(git: &dyn GitRunner, repo: &Path) -> Self {
        let commit = match git.rev_parse(repo, "HEAD").await {
            Ok(sha) => sha,
            Err(e) => {
                warn!("git rev-parse HEAD failed in {}: {e}", repo.display());
                FALLBACK.to_string()
            }
        };
        let tree_hash = match git.rev_parse(repo, "HEAD:").await {
            Ok(sha) => sha,
            Err(e) => {
                warn!("git rev-parse HEAD: failed in {}: {e}", repo.display());
                FALLBACK.to_string()
            }
        };

        let mut description = FALLBACK.to_string();
        for options in DESCRIBE_FALLBACKS {
            match git.describe(repo, options).await {
                Ok(found) => {
                    description = found;
                    break;
                }
                Err(e) => debug!("git describe --dirty {:?} failed: {e}", options),
            }
        }

        Self {
            commit,
            tree_hash,
            description,
        }
    }

    /// Write `commit`, `tree_hash`, and `description` under `tier_path/meta`
    pub fn write(&self, fs: &dyn FileSystem, tier_path: &Path) -> Result<()> {
        let meta = tier_path.join(META_DIR);
        fs.create_dir_all(&meta)
            .map_err(|e| EngineError::io(format!("create {}", meta.display()), e))?;

        for (name, value) in [
            ("commit", &self.commit),
            ("tree_hash", &self.tree_hash),
            ("description", &self.description),
        ] {
            let path = meta.join(name);
            fs.write(&path, value.as_bytes())
                .map_err(|e| EngineError::io(format!("write {}", path.display()), e))?;
        }
        info!("Recorded source metadata in {}", meta.display());
        Ok(())
    }
}
