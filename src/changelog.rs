//! Streaming changelog maintenance.
//!
//! A release section starts at a markdown heading whose first semver-shaped
//! token is the release version, e.g. `## [1.2.0](https://host/compare/v1.1.0...v1.2.0) (2025-01-01)`.
//! New notes are inserted above the newest section, and the newest section can
//! be read back without loading the whole file.
use futures_util::{Stream, StreamExt};
use log::*;
use regex::Regex;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tempfile::NamedTempFile;
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
};

use crate::Result;

/// Default changelog file name inside a project directory.
pub const CHANGELOG_FILENAME: &str = "CHANGELOG.md";

/// Header block written at the top of a newly created changelog.
pub const CHANGELOG_HEADER: &str = "# Changelog

All notable changes to this project will be documented in this file.
See [Conventional Commits](https://conventionalcommits.org) for commit guidelines.

";

static VERSION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#+ \[?([^\[\]()\s]*\d+\.\d+\.\d+[^\[\]()\s]*)\]?").unwrap()
});

static COMPARE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([^/)]*)\.\.\.([^/)]*)\)").unwrap());

/// Newest release section of a changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastRelease {
    pub version: String,
    pub notes: String,
    pub previous_tag: String,
    pub next_tag: String,
}

/// Insert release notes above the newest release section of the changelog at
/// `path`, creating the file with [`CHANGELOG_HEADER`] when it does not exist.
///
/// The result is written to a temporary file next to the changelog and renamed
/// over it once complete. Returns exactly the text that was inserted.
pub async fn add_release_notes<S, T>(path: &Path, mut notes: S) -> Result<String>
where
    S: Stream<Item = Result<T>> + Unpin + Send,
    T: AsRef<str>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let temp_path = NamedTempFile::new_in(&dir)?.into_temp_path();
    let mut output = BufWriter::new(fs::File::create(&temp_path).await?);
    let mut inserted = String::new();

    if !fs::try_exists(path).await? {
        debug!("creating changelog: {}", path.display());
        output.write_all(CHANGELOG_HEADER.as_bytes()).await?;
        write_notes(&mut output, &mut notes, &mut inserted).await?;
    } else {
        let input = fs::File::open(path).await?;
        let permissions = input.metadata().await?.permissions();
        let mut input = BufReader::new(input);
        let mut line: Vec<u8> = Vec::new();
        let mut pending = true;
        let mut ends_with_newline = true;

        loop {
            line.clear();

            if input.read_until(b'\n', &mut line).await? == 0 {
                break;
            }

            // existing bytes are copied through untouched
            if pending && VERSION_HEADER.is_match(&String::from_utf8_lossy(&line)) {
                write_notes(&mut output, &mut notes, &mut inserted).await?;
                output.write_all(b"\n").await?;
                pending = false;
            }

            ends_with_newline = line.ends_with(b"\n");
            output.write_all(&line).await?;
        }

        if pending {
            debug!(
                "no release section found in {}: appending notes",
                path.display()
            );

            if !ends_with_newline {
                output.write_all(b"\n").await?;
            }

            write_notes(&mut output, &mut notes, &mut inserted).await?;
        }

        fs::set_permissions(&temp_path, permissions).await?;
    }

    output.flush().await?;
    drop(output);

    temp_path.persist(path)?;

    Ok(inserted)
}

/// Drain a notes stream into a string without touching the filesystem.
pub async fn collect_notes<S, T>(mut notes: S) -> Result<String>
where
    S: Stream<Item = Result<T>> + Unpin + Send,
    T: AsRef<str>,
{
    let mut collected = String::new();

    while let Some(chunk) = notes.next().await {
        collected.push_str(chunk?.as_ref());
    }

    Ok(collected)
}

async fn write_notes<W, S, T>(
    output: &mut W,
    notes: &mut S,
    inserted: &mut String,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Result<T>> + Unpin,
    T: AsRef<str>,
{
    while let Some(chunk) = notes.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        output.write_all(chunk.as_bytes()).await?;
        inserted.push_str(chunk);
    }

    Ok(())
}

#[derive(Default)]
struct LastReleaseParser {
    release: LastRelease,
    in_release: bool,
    notes: String,
}

impl LastReleaseParser {
    /// Feed one line without its terminator. Returns false once the following
    /// release header is reached and no more input is needed.
    fn feed(&mut self, line: &str) -> bool {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(captures) = VERSION_HEADER.captures(line) {
            if self.in_release {
                return false;
            }

            self.in_release = true;
            self.release.version = captures[1].to_string();

            if let Some(tags) = COMPARE_LINK.captures(line) {
                self.release.previous_tag = tags[1].to_string();
                self.release.next_tag = tags[2].to_string();
            }

            return true;
        }

        if self.in_release {
            self.notes.push_str(line);
            self.notes.push('\n');
        }

        true
    }

    fn finish(mut self) -> LastRelease {
        self.release.notes = self.notes.trim().to_string();
        self.release
    }
}

/// Extract the newest release section from in-memory text. Each item may hold
/// one or more complete lines.
pub fn extract_last_release<I, S>(input: I) -> LastRelease
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = LastReleaseParser::default();

    'items: for item in input {
        for line in item.as_ref().split('\n') {
            if !parser.feed(line) {
                break 'items;
            }
        }
    }

    parser.finish()
}

/// Extract the newest release section from a stream of text or byte chunks.
/// Chunk boundaries may fall anywhere, including inside a line.
pub async fn extract_last_release_from_stream<S, T>(
    mut input: S,
) -> Result<LastRelease>
where
    S: Stream<Item = Result<T>> + Unpin,
    T: AsRef<[u8]>,
{
    let mut parser = LastReleaseParser::default();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = input.next().await {
        buffer.extend_from_slice(chunk?.as_ref());

        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line[..end]);

            if !parser.feed(&line) {
                return Ok(parser.finish());
            }
        }
    }

    if !buffer.is_empty() {
        parser.feed(&String::from_utf8_lossy(&buffer));
    }

    Ok(parser.finish())
}

/// Extract the newest release section from a changelog file, reading only as
/// far as needed. Returns `None` when the file does not exist.
pub async fn extract_last_release_from_file(
    path: &Path,
) -> Result<Option<LastRelease>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }

    let file = fs::File::open(path).await?;
    let mut input = BufReader::new(file);
    let mut line: Vec<u8> = Vec::new();
    let mut parser = LastReleaseParser::default();

    loop {
        line.clear();

        if input.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.strip_suffix('\n').unwrap_or(&text);

        if !parser.feed(text) {
            break;
        }
    }

    Ok(Some(parser.finish()))
}

#[cfg(test)]
#[path = "./changelog_tests.rs"]
mod tests;
