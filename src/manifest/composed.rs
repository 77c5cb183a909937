use async_trait::async_trait;
use semver::Version;
use std::{path::Path, sync::Arc};

use crate::{
    Result,
    manifest::{Manifest, VersionUpdate},
};

/// Manifest whose reads come from a main manifest while version writes are
/// mirrored into every subordinate manifest.
pub struct ComposedManifest {
    main: Arc<dyn Manifest>,
    subordinates: Vec<Arc<dyn Manifest>>,
}

impl ComposedManifest {
    pub fn new(
        main: Arc<dyn Manifest>,
        subordinates: Vec<Arc<dyn Manifest>>,
    ) -> Self {
        Self { main, subordinates }
    }
}

#[async_trait]
impl Manifest for ComposedManifest {
    fn path(&self) -> &Path {
        self.main.path()
    }

    fn project_path(&self) -> &Path {
        self.main.project_path()
    }

    async fn name(&self) -> Result<String> {
        self.main.name().await
    }

    async fn version(&self) -> Result<Version> {
        self.main.version().await
    }

    async fn is_private(&self) -> Result<bool> {
        self.main.is_private().await
    }

    async fn write_version(
        &self,
        version: &Version,
        dry_run: bool,
    ) -> Result<VersionUpdate> {
        let mut update = self.main.write_version(version, dry_run).await?;

        for subordinate in self.subordinates.iter() {
            let sub_update = subordinate.write_version(version, dry_run).await?;
            update.files.extend(sub_update.files);
        }

        Ok(update)
    }
}
