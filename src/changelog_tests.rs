use super::*;
use crate::ReleaseError;
use futures_util::stream;
use tempfile::TempDir;

const EXISTING: &str = "# Changelog

Intro text kept verbatim.

## [1.1.0](https://github.com/acme/widgets/compare/v1.0.0...v1.1.0) (2025-02-01)

### Features

* add spinner ([abc1234](https://github.com/acme/widgets/commit/abc1234))

## [1.0.0](https://github.com/acme/widgets/compare/v0.9.0...v1.0.0) (2025-01-01)

### Bug Fixes

* initial fix
";

const NOTES: &str = "## [1.2.0](https://github.com/acme/widgets/compare/v1.1.0...v1.2.0) (2025-03-01)

### Features

* add dial
";

fn chunks(
    parts: &[&str],
) -> impl Stream<Item = Result<String>> + Unpin + Send + use<> {
    let parts: Vec<Result<String>> =
        parts.iter().map(|part| Ok(part.to_string())).collect();
    stream::iter(parts)
}

#[tokio::test]
async fn test_add_release_notes_creates_new_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);

    let inserted = add_release_notes(&path, chunks(&["## 1.0.0\n", "\n* first\n"]))
        .await
        .unwrap();

    assert_eq!(inserted, "## 1.0.0\n\n* first\n");
    let content = fs::read_to_string(&path).await.unwrap();
    assert_eq!(content, format!("{CHANGELOG_HEADER}## 1.0.0\n\n* first\n"));
}

#[tokio::test]
async fn test_add_release_notes_inserts_above_newest_release() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    fs::write(&path, EXISTING).await.unwrap();

    let inserted = add_release_notes(&path, chunks(&[NOTES])).await.unwrap();

    assert_eq!(inserted, NOTES);

    let content = fs::read_to_string(&path).await.unwrap();
    let header_at = EXISTING.find("## [1.1.0]").unwrap();
    let expected = format!(
        "{}{}\n{}",
        &EXISTING[..header_at],
        NOTES,
        &EXISTING[header_at..]
    );
    assert_eq!(content, expected);
}

#[tokio::test]
async fn test_add_release_notes_ignores_chunk_boundaries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    fs::write(&path, EXISTING).await.unwrap();

    let inserted = add_release_notes(
        &path,
        chunks(&["## [1.2.0](https://github.com/acme/wid", "gets/compare/v1.1.0...v1.2.0)", " (2025-03-01)\n\n### Features\n\n* add ", "dial\n"]),
    )
    .await
    .unwrap();

    assert_eq!(inserted, NOTES);
    assert!(fs::read_to_string(&path).await.unwrap().contains(NOTES));
}

#[tokio::test]
async fn test_add_release_notes_appends_without_release_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    fs::write(&path, "# Changelog\n\nNothing released yet.")
        .await
        .unwrap();

    add_release_notes(&path, chunks(&["## 0.1.0\n\n* hello\n"]))
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(&path).await.unwrap(),
        "# Changelog\n\nNothing released yet.\n## 0.1.0\n\n* hello\n"
    );
}

#[tokio::test]
async fn test_add_release_notes_propagates_stream_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    fs::write(&path, EXISTING).await.unwrap();

    let failing = stream::iter(vec![
        Ok("## 1.2.0\n".to_string()),
        Err(ReleaseError::NothingToCommit),
    ]);

    let result = add_release_notes(&path, failing).await;

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&path).await.unwrap(), EXISTING);
}

#[tokio::test]
async fn test_extract_after_append_recovers_inserted_release() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    fs::write(&path, EXISTING).await.unwrap();

    let inserted = add_release_notes(&path, chunks(&[NOTES])).await.unwrap();
    let release = extract_last_release_from_file(&path).await.unwrap().unwrap();

    assert_eq!(release.version, "1.2.0");
    assert_eq!(release.previous_tag, "v1.1.0");
    assert_eq!(release.next_tag, "v1.2.0");

    let body = inserted.split_once('\n').unwrap().1;
    assert_eq!(release.notes, body.trim());
}

#[test]
fn test_extract_last_release_stops_at_next_header() {
    let release = extract_last_release([EXISTING]);

    assert_eq!(
        release,
        LastRelease {
            version: "1.1.0".into(),
            notes: "### Features\n\n* add spinner ([abc1234](https://github.com/acme/widgets/commit/abc1234))".into(),
            previous_tag: "v1.0.0".into(),
            next_tag: "v1.1.0".into(),
        }
    );
}

#[test]
fn test_extract_last_release_without_compare_link() {
    let release = extract_last_release(vec![
        "## [1.0.0] - 2017-06-20",
        "### Added",
        "- Version navigation.",
        "",
        "## [0.3.0] - 2015-12-03",
    ]);

    assert_eq!(release.version, "1.0.0");
    assert_eq!(release.notes, "### Added\n- Version navigation.");
    assert_eq!(release.previous_tag, "");
    assert_eq!(release.next_tag, "");
}

#[test]
fn test_extract_last_release_prerelease_header() {
    let release = extract_last_release([
        "# [8.0.0-alpha.2](https://github.com/acme/scripts/compare/v8.0.0-alpha.1...v8.0.0-alpha.2) (2022-01-14)\n\n\n### Bug Fixes\n\n* fix it\n",
    ]);

    assert_eq!(release.version, "8.0.0-alpha.2");
    assert_eq!(release.previous_tag, "v8.0.0-alpha.1");
    assert_eq!(release.next_tag, "v8.0.0-alpha.2");
    assert_eq!(release.notes, "### Bug Fixes\n\n* fix it");
}

#[test]
fn test_extract_last_release_scoped_tags() {
    let release = extract_last_release([
        "## [2.0.0](https://github.com/acme/mono/compare/core@1.4.0...core@2.0.0) (2025-05-05)\n\n* breaking\n",
    ]);

    assert_eq!(release.previous_tag, "core@1.4.0");
    assert_eq!(release.next_tag, "core@2.0.0");
}

#[test]
fn test_extract_last_release_empty_input() {
    assert_eq!(extract_last_release([""]), LastRelease::default());
    assert_eq!(
        extract_last_release(Vec::<String>::new()),
        LastRelease::default()
    );
    assert_eq!(
        extract_last_release(["# Changelog\n\nno releases"]),
        LastRelease::default()
    );
}

#[tokio::test]
async fn test_extract_from_stream_reassembles_split_header() {
    let text = EXISTING.as_bytes();
    let split_at = EXISTING.find("compare/v1.0.0").unwrap();
    let parts: Vec<Result<Vec<u8>>> = vec![
        Ok(text[..split_at].to_vec()),
        Ok(text[split_at..split_at + 7].to_vec()),
        Ok(text[split_at + 7..].to_vec()),
    ];

    let release = extract_last_release_from_stream(stream::iter(parts))
        .await
        .unwrap();

    assert_eq!(release, extract_last_release([EXISTING]));
    assert_eq!(release.previous_tag, "v1.0.0");
}

#[tokio::test]
async fn test_extract_from_stream_handles_split_multibyte_chars() {
    let text = "## 1.0.0\n\n* café au lait\n".as_bytes();
    let split_at = text.iter().position(|b| *b >= 0x80).unwrap() + 1;
    let parts: Vec<Result<Vec<u8>>> =
        vec![Ok(text[..split_at].to_vec()), Ok(text[split_at..].to_vec())];

    let release = extract_last_release_from_stream(stream::iter(parts))
        .await
        .unwrap();

    assert_eq!(release.notes, "* café au lait");
}

#[tokio::test]
async fn test_extract_from_missing_file_is_none() {
    let dir = TempDir::new().unwrap();

    let release = extract_last_release_from_file(&dir.path().join("nope.md"))
        .await
        .unwrap();

    assert!(release.is_none());
}

#[tokio::test]
async fn test_collect_notes_concatenates_chunks() {
    let notes = collect_notes(chunks(&["a", "b\n", "c"])).await.unwrap();
    assert_eq!(notes, "ab\nc");
}

#[tokio::test]
async fn test_invalid_utf8_is_kept_and_tolerated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CHANGELOG_FILENAME);
    let existing: &[u8] = b"# Changelog\n\n## 1.0.0\n\n* caf\xe9 fix\n";
    fs::write(&path, existing).await.unwrap();

    let release = extract_last_release_from_file(&path).await.unwrap().unwrap();
    assert_eq!(release.version, "1.0.0");
    assert_eq!(release.notes, "* caf\u{fffd} fix");

    add_release_notes(&path, chunks(&["## 1.1.0\n\n* dial\n"]))
        .await
        .unwrap();

    let content = fs::read(&path).await.unwrap();
    let expected =
        b"# Changelog\n\n## 1.1.0\n\n* dial\n\n## 1.0.0\n\n* caf\xe9 fix\n".to_vec();
    assert_eq!(content, expected);

    let release = extract_last_release_from_file(&path).await.unwrap().unwrap();
    assert_eq!(release.version, "1.1.0");
    assert_eq!(release.notes, "* dial");
}
