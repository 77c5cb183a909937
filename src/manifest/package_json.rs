use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use serde_json::{Value, json};
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tokio::{fs, sync::Mutex};

use crate::{
    ReleaseError, Result,
    manifest::{Manifest, VersionUpdate},
};

static VERSION_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""version":(\s*)"[^"]+""#).unwrap());

struct Loaded {
    contents: String,
    doc: Value,
}

/// Handles package.json parsing and in-place version updates.
pub struct PackageJsonManifest {
    path: PathBuf,
    state: Mutex<Option<Loaded>>,
}

impl PackageJsonManifest {
    pub const FILENAME: &'static str = "package.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<Loaded> {
        let contents = fs::read_to_string(&self.path).await?;
        let doc = serde_json::from_str(&contents)?;
        Ok(Loaded { contents, doc })
    }

    // The lock is held while loading so concurrent first readers share one
    // file read.
    async fn with_loaded<T>(
        &self,
        f: impl FnOnce(&mut Loaded) -> Result<T> + Send,
    ) -> Result<T> {
        let mut guard = self.state.lock().await;
        let mut loaded = match guard.take() {
            Some(loaded) => loaded,
            None => self.load().await?,
        };
        let result = f(&mut loaded);
        *guard = Some(loaded);
        result
    }

    fn read_name(&self, doc: &Value) -> Result<String> {
        doc.get("name")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "name"))
    }

    fn read_version(&self, doc: &Value) -> Result<Version> {
        let raw = doc
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "version"))?;
        Ok(Version::parse(raw)?)
    }
}

#[async_trait]
impl Manifest for PackageJsonManifest {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn name(&self) -> Result<String> {
        self.with_loaded(|loaded| self.read_name(&loaded.doc)).await
    }

    async fn version(&self) -> Result<Version> {
        self.with_loaded(|loaded| self.read_version(&loaded.doc)).await
    }

    async fn is_private(&self) -> Result<bool> {
        self.with_loaded(|loaded| {
            Ok(loaded
                .doc
                .get("private")
                .and_then(Value::as_bool)
                .unwrap_or(false))
        })
        .await
    }

    async fn write_version(
        &self,
        version: &Version,
        dry_run: bool,
    ) -> Result<VersionUpdate> {
        let (update, contents) = self
            .with_loaded(|loaded| {
                let name = self.read_name(&loaded.doc)?;
                let from = self.read_version(&loaded.doc)?;

                if !VERSION_FIELD.is_match(&loaded.contents) {
                    return Err(ReleaseError::missing_field(
                        &self.path, "version",
                    ));
                }

                loaded.contents = VERSION_FIELD
                    .replacen(
                        &loaded.contents,
                        1,
                        format!("\"version\":${{1}}\"{version}\""),
                    )
                    .into_owned();
                loaded.doc["version"] = json!(version.to_string());

                Ok((
                    VersionUpdate {
                        name,
                        from,
                        to: version.clone(),
                        files: vec![self.path.clone()],
                        notes: String::new(),
                    },
                    loaded.contents.clone(),
                ))
            })
            .await?;

        if !dry_run {
            fs::write(&self.path, contents).await?;
        }

        Ok(update)
    }
}
