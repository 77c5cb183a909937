use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tokio::{fs, sync::Mutex};
use toml_edit::{DocumentMut, Item, value};

use crate::{
    ReleaseError, Result,
    manifest::{Manifest, VersionUpdate},
};

static PACKAGE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\[package\][ \t]*\r?$").unwrap()
});

static NEXT_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[").unwrap());

static VERSION_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*version[ \t]*=[ \t]*)"[^"]*""#).unwrap()
});

struct Loaded {
    contents: String,
    doc: DocumentMut,
}

/// Handles Cargo.toml `[package]` parsing and in-place version updates.
pub struct CargoTomlManifest {
    path: PathBuf,
    state: Mutex<Option<Loaded>>,
}

impl CargoTomlManifest {
    pub const FILENAME: &'static str = "Cargo.toml";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<Loaded> {
        let contents = fs::read_to_string(&self.path).await?;
        let doc = contents.parse::<DocumentMut>()?;
        Ok(Loaded { contents, doc })
    }

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

    fn package<'a>(&self, doc: &'a DocumentMut) -> Result<&'a Item> {
        doc.get("package")
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "package"))
    }

    fn read_name(&self, doc: &DocumentMut) -> Result<String> {
        self.package(doc)?
            .get("name")
            .and_then(Item::as_str)
            .map(String::from)
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "name"))
    }

    fn read_version(&self, doc: &DocumentMut) -> Result<Version> {
        let item = self
            .package(doc)?
            .get("version")
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "version"))?;

        let raw = item.as_str().ok_or_else(|| {
            ReleaseError::invalid_manifest(
                &self.path,
                "package version must be a literal string",
            )
        })?;

        Ok(Version::parse(raw)?)
    }

    // Replaces the version key inside the [package] table only, leaving
    // dependency versions and every other byte untouched.
    fn rewrite_version(&self, contents: &str, version: &Version) -> Result<String> {
        let start = PACKAGE_HEADER
            .find(contents)
            .ok_or_else(|| ReleaseError::missing_field(&self.path, "package"))?
            .end();

        let end = NEXT_TABLE
            .find(&contents[start..])
            .map(|m| start + m.start())
            .unwrap_or(contents.len());

        let section = &contents[start..end];

        if !VERSION_KEY.is_match(section) {
            return Err(ReleaseError::missing_field(&self.path, "version"));
        }

        let replaced =
            VERSION_KEY.replacen(section, 1, format!("${{1}}\"{version}\""));

        Ok(format!("{}{}{}", &contents[..start], replaced, &contents[end..]))
    }
}

#[async_trait]
impl Manifest for CargoTomlManifest {
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
            let Some(publish) = self.package(&loaded.doc)?.get("publish")
            else {
                return Ok(false);
            };

            if let Some(enabled) = publish.as_bool() {
                return Ok(!enabled);
            }

            Ok(publish
                .as_array()
                .map(|registries| registries.is_empty())
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

                loaded.contents =
                    self.rewrite_version(&loaded.contents, version)?;
                loaded.doc["package"]["version"] = value(version.to_string());

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
