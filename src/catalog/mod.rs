//! Identifier catalog: containers, images and volumes known to the delegated CLI.
//!
//! `CliCatalog::load` runs the three listing sub-commands of the delegated
//! executable, each emitting one JSON object per line, and parses them into
//! typed records. Loading is best-effort:
//!   - a listing that fails to spawn or exits non-zero yields an empty list
//!   - a line that does not parse is skipped, siblings still load
//!
//! A catalog is a snapshot. It is never patched in place; a refresh builds a
//! new one and the old one is dropped.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use tokio::process::Command;

use crate::utils::monotonic_ms;
use crate::{log_debug, log_trace};

/// Number of characters kept for a short identifier.
pub const SHORT_ID_LEN: usize = 12;

const IMAGE_DIGEST_PREFIX: &str = "sha256:";

/* ---- Records ---- */

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerRecord {
    #[serde(skip)]
    pub short_id: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRecord {
    #[serde(skip)]
    pub short_id: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Tag", default)]
    pub tag: String,
    #[serde(rename = "Repository", default)]
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeRecord {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Derive the short form of an identifier. Image digests lose their
/// `sha256:` prefix first; identifiers shorter than the cut are kept whole.
pub fn short_id(id: &str, strip_digest: bool) -> String {
    let id = if strip_digest {
        id.strip_prefix(IMAGE_DIGEST_PREFIX).unwrap_or(id)
    } else {
        id
    };
    id.chars().take(SHORT_ID_LEN).collect()
}

/* ---- Snapshot ---- */

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentCatalog {
    pub containers: Vec<ContainerRecord>,
    pub images: Vec<ImageRecord>,
    pub volumes: Vec<VolumeRecord>,
}

impl EnrichmentCatalog {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.images.is_empty() && self.volumes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.images.len() + self.volumes.len()
    }
}

/// Anything able to produce a fresh catalog snapshot.
pub trait CatalogSource {
    fn load(&self) -> impl Future<Output = EnrichmentCatalog> + Send;
}

/* ---- Line parsing ---- */

/// Parse line-delimited JSON, silently skipping blank or malformed lines.
pub fn parse_records<T: DeserializeOwned>(output: &str) -> Vec<T> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match serde_json::from_str::<T>(l) {
            Ok(rec) => Some(rec),
            Err(e) => {
                log_trace!("skipping unparsable listing line ({e}): {l}");
                None
            }
        })
        .collect()
}

pub fn parse_containers(output: &str) -> Vec<ContainerRecord> {
    let mut cs: Vec<ContainerRecord> = parse_records(output);
    for c in &mut cs {
        c.short_id = short_id(&c.id, false);
    }
    cs
}

pub fn parse_images(output: &str) -> Vec<ImageRecord> {
    let mut imgs: Vec<ImageRecord> = parse_records(output);
    for img in &mut imgs {
        img.short_id = short_id(&img.id, true);
    }
    imgs
}

pub fn parse_volumes(output: &str) -> Vec<VolumeRecord> {
    parse_records(output)
}

/* ---- Executable-backed source ---- */

const CONTAINER_LISTING: &[&str] = &["ps", "--all", "--no-trunc", "--format", "{{json .}}"];
const IMAGE_LISTING: &[&str] = &["image", "ls", "--no-trunc", "--format", "{{json .}}"];
const VOLUME_LISTING: &[&str] = &["volume", "ls", "--format", "{{json .}}"];

/// Catalog source backed by listing sub-commands of the delegated executable.
#[derive(Debug, Clone)]
pub struct CliCatalog {
    executable: PathBuf,
}

impl CliCatalog {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Run one listing and return its stdout, or `None` on any failure.
    async fn listing(&self, args: &[&str]) -> Option<String> {
        let out = match Command::new(&self.executable)
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(out) => out,
            Err(e) => {
                log_debug!("listing `{}` failed to start: {e}", args.join(" "));
                return None;
            }
        };
        if !out.status.success() {
            log_debug!("listing `{}` exited with {}", args.join(" "), out.status);
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl CatalogSource for CliCatalog {
    async fn load(&self) -> EnrichmentCatalog {
        let started = monotonic_ms();
        let (cs, imgs, vols) = tokio::join!(
            self.listing(CONTAINER_LISTING),
            self.listing(IMAGE_LISTING),
            self.listing(VOLUME_LISTING),
        );
        let catalog = EnrichmentCatalog {
            containers: cs.as_deref().map(parse_containers).unwrap_or_default(),
            images: imgs.as_deref().map(parse_images).unwrap_or_default(),
            volumes: vols.as_deref().map(parse_volumes).unwrap_or_default(),
        };
        log_debug!(
            "catalog loaded in {} ms: {} records ({} containers, {} images, {} volumes)",
            monotonic_ms().saturating_sub(started),
            catalog.len(),
            catalog.containers.len(),
            catalog.images.len(),
            catalog.volumes.len()
        );
        catalog
    }
}

/* ---- Tests ---- */
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_is_dropped() {
        let cs = parse_containers("{\"ID\":\"abc\"}\nNOT-JSON\n{\"ID\":\"def\"}");
        let ids: Vec<&str> = cs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["abc", "def"]);
        assert!(cs.iter().all(|c| c.names.is_empty()));
    }

    #[test]
    fn container_short_id_truncates() {
        let cs = parse_containers(
            r#"{"ID":"4f66ad9a0b2e1c3d5e7f9a0b1c2d3e4f","Names":"web-1","Image":"nginx"}"#,
        );
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].short_id, "4f66ad9a0b2e");
        assert_eq!(cs[0].names, "web-1");
    }

    #[test]
    fn image_short_id_strips_digest_prefix() {
        let imgs = parse_images(
            r#"{"ID":"sha256:9c7a54a9a43cca047013b82af109fe963fde787f63f9e016fdc3384500c2823d","Repository":"nginx","Tag":"1.25"}"#,
        );
        assert_eq!(imgs[0].short_id, "9c7a54a9a43c");
        assert_eq!(imgs[0].repository, "nginx");
        assert_eq!(imgs[0].tag, "1.25");
        assert!(imgs[0].id.starts_with("sha256:"), "full id keeps its prefix");
    }

    #[test]
    fn short_id_of_short_input_is_whole() {
        assert_eq!(short_id("abc", false), "abc");
        assert_eq!(short_id("sha256:abc", true), "abc");
        assert_eq!(short_id("sha256:abc", false), "sha256:abc");
    }

    #[test]
    fn volumes_and_blank_lines() {
        let vols = parse_volumes("\n{\"Driver\":\"local\",\"Name\":\"pgdata\"}\n\n{\"Name\":\"cache\"}\n");
        let names: Vec<&str> = vols.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["pgdata", "cache"]);
    }

    #[test]
    fn record_without_required_field_is_skipped() {
        let vols = parse_volumes("{\"Driver\":\"local\"}\n{\"Name\":\"ok\"}");
        assert_eq!(vols.len(), 1);
    }

    #[tokio::test]
    async fn missing_executable_yields_empty_catalog() {
        let src = CliCatalog::new("/nonexistent/dockerlink-test/com.docker.cli");
        let catalog = src.load().await;
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn loads_from_fake_cli() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("com.docker.cli");
        std::fs::write(
            &path,
            r#"#!/bin/sh
case "$1" in
  ps) printf '%s\n' '{"ID":"aaaaaaaaaaaa1111","Names":"db"}' 'garbage' ;;
  image) printf '%s\n' '{"ID":"sha256:bbbbbbbbbbbb2222","Repository":"myapp","Tag":"v1"}' ;;
  volume) exit 1 ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let catalog = CliCatalog::new(&path).load().await;

        assert_eq!(catalog.containers.len(), 1);
        assert_eq!(catalog.containers[0].short_id, "aaaaaaaaaaaa");
        assert_eq!(catalog.images.len(), 1);
        assert_eq!(catalog.images[0].short_id, "bbbbbbbbbbbb");
        assert!(catalog.volumes.is_empty(), "failed listing degrades to empty");
    }
}
