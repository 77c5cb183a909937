//! Monorepo child discovery from workspace definitions.
use futures_util::{StreamExt, stream, stream::BoxStream};
use glob::Pattern;
use log::*;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ReleaseError, Result, manifest::ManifestFormat};

/// Produces the directories of a monorepo's child projects.
#[cfg_attr(test, automock)]
pub trait ProjectDiscovery: Send + Sync {
    /// Child project directories, each containing a manifest.
    fn projects(&self) -> BoxStream<'static, Result<PathBuf>>;
}

/// Where workspace member patterns come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceSource {
    /// `workspaces` in the root `package.json`.
    #[default]
    Npm,
    /// `packages` in `pnpm-workspace.yaml`.
    Pnpm,
    /// `[workspace] members` and `exclude` in the root `Cargo.toml`.
    Cargo,
    /// Explicit glob patterns. Patterns starting with `!` exclude.
    Globs(Vec<String>),
}

/// [`ProjectDiscovery`] expanding workspace glob patterns relative to the
/// monorepo root. Only directories holding a manifest of the configured
/// format are yielded.
#[derive(Debug, Clone)]
pub struct WorkspaceDiscovery {
    root: PathBuf,
    source: WorkspaceSource,
    format: ManifestFormat,
}

impl WorkspaceDiscovery {
    pub fn new(
        root: impl Into<PathBuf>,
        source: WorkspaceSource,
        format: ManifestFormat,
    ) -> Self {
        Self {
            root: root.into(),
            source,
            format,
        }
    }

    /// Member patterns as declared by the workspace source.
    pub async fn patterns(&self) -> Result<Vec<String>> {
        match &self.source {
            WorkspaceSource::Npm => {
                let path = self.root.join("package.json");
                let content = tokio::fs::read_to_string(&path).await?;
                let json: serde_json::Value = serde_json::from_str(&content)?;

                let workspaces = match &json["workspaces"] {
                    serde_json::Value::Object(object) => object.get("packages"),
                    other => Some(other),
                };

                Ok(string_list(workspaces.and_then(|w| w.as_array())))
            }
            WorkspaceSource::Pnpm => {
                let path = self.root.join("pnpm-workspace.yaml");
                let content = tokio::fs::read_to_string(&path).await?;
                let yaml: serde_yaml::Value = serde_yaml::from_str(&content)?;

                Ok(yaml
                    .get("packages")
                    .and_then(|packages| packages.as_sequence())
                    .map(|packages| {
                        packages
                            .iter()
                            .filter_map(|p| p.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default())
            }
            WorkspaceSource::Cargo => {
                let path = self.root.join("Cargo.toml");
                let content = tokio::fs::read_to_string(&path).await?;
                let table: toml::Table = toml::from_str(&content)?;

                let Some(workspace) =
                    table.get("workspace").and_then(|w| w.as_table())
                else {
                    return Err(ReleaseError::invalid_manifest(
                        path,
                        "no [workspace] table",
                    ));
                };

                let members = workspace
                    .get("members")
                    .and_then(|m| m.as_array())
                    .map(|m| toml_strings(m))
                    .unwrap_or_default();

                let excluded = workspace
                    .get("exclude")
                    .and_then(|m| m.as_array())
                    .map(|m| toml_strings(m))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|pattern| format!("!{pattern}"));

                Ok(members.into_iter().chain(excluded).collect())
            }
            WorkspaceSource::Globs(patterns) => Ok(patterns.clone()),
        }
    }

    /// Expand the member patterns into project directories in pattern
    /// order, without duplicates. Anything under `node_modules` is ignored.
    pub async fn resolve(&self) -> Result<Vec<PathBuf>> {
        let patterns = self.patterns().await?;
        debug!("workspace patterns: {patterns:?}");

        let root = self.root.clone();
        let manifest = self.format.filename();

        // globbing and stat calls are blocking filesystem work
        tokio::task::spawn_blocking(move || expand(&root, &patterns, manifest))
            .await?
    }
}

fn expand(root: &Path, patterns: &[String], manifest: &str) -> Result<Vec<PathBuf>> {
    let mut excluded = vec![];
    let mut included = vec![];

    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(negated) => excluded.push(Pattern::new(&join(root, negated))?),
            None => included.push(join(root, pattern)),
        }
    }

    let mut dirs: Vec<PathBuf> = vec![];

    for pattern in included {
        for entry in glob::glob(&pattern)? {
            let dir = entry?;

            if in_node_modules(root, &dir)
                || !dir.join(manifest).is_file()
                || excluded.iter().any(|p| p.matches_path(&dir))
                || dirs.contains(&dir)
            {
                continue;
            }

            dirs.push(dir);
        }
    }

    Ok(dirs)
}

fn in_node_modules(root: &Path, dir: &Path) -> bool {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .any(|c| c.as_os_str() == "node_modules")
}

impl ProjectDiscovery for WorkspaceDiscovery {
    fn projects(&self) -> BoxStream<'static, Result<PathBuf>> {
        let discovery = self.clone();

        stream::once(async move { discovery.resolve().await })
            .flat_map(|resolved| match resolved {
                Ok(dirs) => {
                    stream::iter(dirs.into_iter().map(Ok::<_, ReleaseError>))
                        .boxed()
                }
                Err(err) => stream::iter([Err(err)]).boxed(),
            })
            .boxed()
    }
}

/// Glob pattern for a workspace member. The root is escaped so that glob
/// metacharacters in its path match literally.
fn join(root: &Path, pattern: &str) -> String {
    let pattern = pattern.trim_start_matches("./").trim_end_matches('/');

    if root.as_os_str().is_empty() {
        return pattern.to_string();
    }

    let root = Pattern::escape(&root.to_string_lossy());
    let separator = std::path::MAIN_SEPARATOR;

    if root.ends_with(separator) {
        format!("{root}{pattern}")
    } else {
        format!("{root}{separator}{pattern}")
    }
}

fn string_list(values: Option<&Vec<serde_json::Value>>) -> Vec<String> {
    values
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn toml_strings(values: &toml::value::Array) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_package_json;
    use futures_util::TryStreamExt;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(dir: &TempDir) {
        write_package_json(&dir.path().join("packages/core"), "@acme/core", "1.0.0", false);
        write_package_json(&dir.path().join("packages/ui"), "@acme/ui", "1.0.0", false);
        write_package_json(&dir.path().join("tools/cli"), "acme-cli", "1.0.0", false);
        fs::create_dir_all(dir.path().join("packages/empty")).unwrap();
    }

    #[tokio::test]
    async fn test_npm_workspaces() {
        let dir = TempDir::new().unwrap();
        workspace(&dir);
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "root", "private": true, "workspaces": ["packages/*", "tools/cli", "!packages/ui"] }"#,
        )
        .unwrap();

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Npm,
            ManifestFormat::PackageJson,
        );

        let dirs: Vec<PathBuf> = discovery.projects().try_collect().await.unwrap();

        assert_eq!(
            dirs,
            vec![
                dir.path().join("packages/core"),
                dir.path().join("tools/cli")
            ]
        );
    }

    #[tokio::test]
    async fn test_npm_workspaces_object_form() {
        let dir = TempDir::new().unwrap();
        workspace(&dir);
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "root", "workspaces": { "packages": ["tools/*"] } }"#,
        )
        .unwrap();

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Npm,
            ManifestFormat::PackageJson,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![dir.path().join("tools/cli")]
        );
    }

    #[tokio::test]
    async fn test_pnpm_workspace_file() {
        let dir = TempDir::new().unwrap();
        workspace(&dir);
        fs::write(
            dir.path().join("pnpm-workspace.yaml"),
            "packages:\n  - 'packages/*'\n  - '!packages/core'\n",
        )
        .unwrap();

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Pnpm,
            ManifestFormat::PackageJson,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![dir.path().join("packages/ui")]
        );
    }

    #[tokio::test]
    async fn test_cargo_workspace_members() {
        let dir = TempDir::new().unwrap();
        for member in ["crates/a", "crates/b", "crates/skip"] {
            let path = dir.path().join(member);
            fs::create_dir_all(&path).unwrap();
            fs::write(
                path.join("Cargo.toml"),
                "[package]\nname = \"x\"\nversion = \"0.1.0\"\n",
            )
            .unwrap();
        }
        fs::write(
            dir.path().join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/*\"]\nexclude = [\"crates/skip\"]\n",
        )
        .unwrap();

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Cargo,
            ManifestFormat::CargoToml,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![dir.path().join("crates/a"), dir.path().join("crates/b")]
        );
    }

    #[tokio::test]
    async fn test_missing_workspace_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Pnpm,
            ManifestFormat::PackageJson,
        );

        let result: Result<Vec<PathBuf>> =
            discovery.projects().try_collect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_glob_source_deduplicates() {
        let dir = TempDir::new().unwrap();
        workspace(&dir);

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Globs(vec![
                "./packages/core/".into(),
                "packages/*".into(),
            ]),
            ManifestFormat::PackageJson,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![
                dir.path().join("packages/core"),
                dir.path().join("packages/ui")
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_node_modules() {
        let dir = TempDir::new().unwrap();
        write_package_json(&dir.path().join("packages/a"), "@acme/a", "1.0.0", false);
        write_package_json(
            &dir.path().join("packages/a/node_modules/dep"),
            "dep",
            "3.1.0",
            false,
        );
        fs::write(
            dir.path().join("pnpm-workspace.yaml"),
            "packages:\n  - 'packages/**'\n",
        )
        .unwrap();

        let discovery = WorkspaceDiscovery::new(
            dir.path(),
            WorkspaceSource::Pnpm,
            ManifestFormat::PackageJson,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![dir.path().join("packages/a")]
        );
    }

    #[tokio::test]
    async fn test_root_with_glob_characters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo [v2]*");
        write_package_json(&root.join("packages/core"), "@acme/core", "1.0.0", false);
        write_package_json(&root.join("packages/ui"), "@acme/ui", "1.0.0", false);

        let discovery = WorkspaceDiscovery::new(
            &root,
            WorkspaceSource::Globs(vec!["packages/*".into(), "!packages/ui".into()]),
            ManifestFormat::PackageJson,
        );

        assert_eq!(
            discovery.resolve().await.unwrap(),
            vec![root.join("packages/core")]
        );
    }
}
