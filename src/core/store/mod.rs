//! Route image persistence.
//!
//! Routes live as `blue_*.jpg` files in one flat directory; the directory
//! listing is the index. Comparison renderings are staged next to them as
//! `red_*.jpg` for the duration of a duplicate scan and removed afterwards.

pub mod naming;

use std::cmp::Reverse;
use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use time::OffsetDateTime;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use crate::error::{PipelineError, Result};
use crate::models::{RenderRole, Rendering, RouteImage};

pub trait RouteStore: Send + Sync + 'static {
    /// Persist an accepted rendering under a fresh, never-reused name.
    fn save(&self, accepted: &Rendering) -> impl Future<Output = Result<RouteImage>> + Send;
    /// Write a comparison rendering as a transient file.
    fn stage(&self, rendering: &Rendering) -> impl Future<Output = Result<TransientRendering>> + Send;
    /// Stored routes in directory order. The order is not stable across calls.
    fn list(&self) -> impl Future<Output = Result<Vec<RouteImage>>> + Send;
    /// Stored routes, newest first. Routes stored within the same second are
    /// ordered by modification time, then by name.
    fn list_recent(&self) -> impl Future<Output = Result<Vec<RouteImage>>> + Send;
    /// Bytes of a stored route. Unknown or unsafe names are `NotFound`.
    fn read(&self, name: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
    /// Best-effort removal of a transient rendering. Failures are logged only.
    fn discard(&self, transient: TransientRendering) -> impl Future<Output = ()> + Send;
}

/// Handle to a staged comparison rendering.
///
/// Dropping the handle without passing it to [`RouteStore::discard`] removes
/// the file synchronously, so abandoned submissions do not leak it.
#[derive(Debug)]
pub struct TransientRendering {
    name: String,
    path: PathBuf,
    armed: bool,
}

impl TransientRendering {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientRendering {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(name = %self.name, "removed abandoned transient rendering"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => tracing::warn!(name = %self.name, error = %e, "failed to remove transient rendering"),
        }
    }
}

/// Route store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsRouteStore {
    dir: PathBuf,
}

impl FsRouteStore {
    /// Open (creating if needed) the route directory and sweep transient
    /// renderings left behind by interrupted submissions.
    pub async fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create route directory {:?}", dir))?;

        let store = Self { dir };
        let swept = store.sweep_transient().await?;
        if swept > 0 {
            tracing::info!(swept, dir = %store.dir.display(), "removed stale transient renderings");
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn sweep_transient(&self) -> anyhow::Result<usize> {
        let mut entries = async_fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list route directory {:?}", self.dir))?;
        let mut swept = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if naming::has_role(name, RenderRole::Comparison) && entry.file_type().await?.is_file() {
                async_fs::remove_file(entry.path())
                    .await
                    .with_context(|| format!("Failed to remove stale rendering {name}"))?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Write `bytes` under a new name for `role`. Never overwrites: on a
    /// name collision the token is regenerated once.
    async fn write_new(&self, role: RenderRole, bytes: &[u8]) -> Result<(String, PathBuf)> {
        let mut collision = None;
        for _ in 0..2 {
            let name = naming::route_filename(role, OffsetDateTime::now_utc()).map_err(|e| {
                PipelineError::storage("formatting route timestamp", std::io::Error::other(e))
            })?;
            let path = self.dir.join(&name);
            let mut file = match async_fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    tracing::warn!(%name, "route filename collision, regenerating token");
                    collision = Some(e);
                    continue;
                }
                Err(e) => return Err(PipelineError::storage(format!("creating {name}"), e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                remove_partial(&path, &name).await;
                return Err(PipelineError::storage(format!("writing {name}"), e));
            }
            return Ok((name, path));
        }

        Err(PipelineError::storage(
            "filename collision persisted after regenerating the token",
            collision.unwrap_or_else(|| IoErrorKind::AlreadyExists.into()),
        ))
    }

    /// Safe `blue_*` files with their modification times, in directory order.
    async fn scan_routes(&self) -> Result<Vec<(RouteImage, Option<SystemTime>)>> {
        let mut entries = match async_fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipelineError::storage("listing routes", e)),
        };

        let mut routes = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(PipelineError::storage("listing routes", e)),
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if !naming::is_safe_route_name(name) {
                continue;
            }
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => routes.push((RouteImage::new(name), meta.modified().ok())),
                Ok(_) => {}
                Err(e) => return Err(PipelineError::storage(format!("inspecting {name}"), e)),
            }
        }
        Ok(routes)
    }
}

/// Remove a file left behind by a failed write. Returns whether it was removed.
async fn remove_partial(path: &Path, name: &str) -> bool {
    match async_fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == IoErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(%name, error = %e, "failed to remove partially written file");
            false
        }
    }
}

impl RouteStore for FsRouteStore {
    async fn save(&self, accepted: &Rendering) -> Result<RouteImage> {
        if accepted.role != RenderRole::Accepted {
            return Err(PipelineError::InvalidInput(
                "only accepted renderings can be stored as routes".to_string(),
            ));
        }
        let (name, _) = self.write_new(RenderRole::Accepted, &accepted.jpeg).await?;
        tracing::info!(%name, bytes = accepted.jpeg.len(), "stored route");
        Ok(RouteImage::new(name))
    }

    async fn stage(&self, rendering: &Rendering) -> Result<TransientRendering> {
        let (name, path) = self.write_new(RenderRole::Comparison, &rendering.jpeg).await?;
        tracing::debug!(%name, "staged comparison rendering");
        Ok(TransientRendering {
            name,
            path,
            armed: true,
        })
    }

    async fn list(&self) -> Result<Vec<RouteImage>> {
        Ok(self.scan_routes().await?.into_iter().map(|(route, _)| route).collect())
    }

    async fn list_recent(&self) -> Result<Vec<RouteImage>> {
        let mut routes = self.scan_routes().await?;
        routes.sort_by(|(a, a_modified), (b, b_modified)| {
            Reverse(a.created_at())
                .cmp(&Reverse(b.created_at()))
                .then_with(|| Reverse(*a_modified).cmp(&Reverse(*b_modified)))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(routes.into_iter().map(|(route, _)| route).collect())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        if !naming::is_safe_route_name(name) {
            return Err(PipelineError::NotFound(name.to_string()));
        }
        match async_fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(PipelineError::NotFound(name.to_string())),
            Err(e) => Err(PipelineError::storage(format!("reading {name}"), e)),
        }
    }

    async fn discard(&self, mut transient: TransientRendering) {
        transient.armed = false;
        match async_fs::remove_file(&transient.path).await {
            Ok(()) => tracing::debug!(name = %transient.name, "discarded transient rendering"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::debug!(name = %transient.name, "transient rendering already gone")
            }
            Err(e) => tracing::warn!(
                name = %transient.name,
                error = %e,
                "failed to discard transient rendering"
            ),
        }
    }
}
