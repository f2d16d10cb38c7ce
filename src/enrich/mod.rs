/*!
Stream enrichment: rewrite identifiers in the delegated command's stdout into
terminal hyperlinks, one line at a time.

Passes (applied in this order, each to the output of the previous one):
  1. containers : short id (plus trailing `[a-z0-9]*`) and display name,
                  standalone occurrences only
  2. volumes    : every occurrence of the volume name
  3. images     : repository, only when the line contains it; the link id is
                  `<id>-<tag>` when the tag is on the line too, else `<id>-latest`

Known limitation: a later pass can match text that an earlier pass inserted
(for example a volume named like part of a dashboard URI). This is left as is.

The engine owns its catalog. For attaching commands (`run`) the catalog is
reloaded before every line so freshly created objects become linkable;
everything else reuses the snapshot loaded at start.
*/

pub mod link;

use regex::{Captures, Regex};
use std::borrow::Cow;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::catalog::{CatalogSource, EnrichmentCatalog};
use crate::{log_debug, log_error, log_trace};
use link::{LinkKind, hyperlink};

/// First argument that makes the engine reload the catalog on every line.
pub const REFRESH_TRIGGER: &str = "run";

/* ---- Refresh policy ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Load once at start, reuse for the whole invocation.
    Once,
    /// Reload before each line.
    EveryLine,
}

impl RefreshPolicy {
    pub fn for_args(args: &[String]) -> Self {
        match args.first() {
            Some(first) if first == REFRESH_TRIGGER => RefreshPolicy::EveryLine,
            _ => RefreshPolicy::Once,
        }
    }
}

/* ---- Compiled rules ---- */

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// True when the match at `start..end` is not glued to other identifier text.
fn is_standalone(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
}

fn literal(text: &str) -> Option<Regex> {
    if text.is_empty() {
        return None;
    }
    Regex::new(&regex::escape(text)).ok()
}

fn replace_standalone<'a>(re: &Regex, line: &'a str, kind: LinkKind, id: &str) -> Cow<'a, str> {
    let mut out = String::new();
    let mut last = 0;
    for m in re.find_iter(line) {
        if !is_standalone(line, m.start(), m.end()) {
            continue;
        }
        out.push_str(&line[last..m.start()]);
        out.push_str(&hyperlink(kind, m.as_str(), id));
        last = m.end();
    }
    if last == 0 {
        return Cow::Borrowed(line);
    }
    out.push_str(&line[last..]);
    Cow::Owned(out)
}

fn replace_all<'a>(re: &Regex, line: &'a str, kind: LinkKind, id: &str) -> Cow<'a, str> {
    re.replace_all(line, |caps: &Captures| hyperlink(kind, &caps[0], id))
}

fn rewritten(c: Cow<'_, str>) -> Option<String> {
    match c {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    }
}

#[derive(Debug)]
struct ContainerRule {
    id: String,
    patterns: Vec<Regex>,
}

#[derive(Debug)]
struct VolumeRule {
    name: String,
    pattern: Regex,
}

#[derive(Debug)]
struct ImageRule {
    id: String,
    repository: String,
    tag: String,
    pattern: Regex,
}

impl ImageRule {
    fn link_id(&self, line: &str) -> String {
        if !self.tag.is_empty() && line.contains(&self.tag) {
            format!("{}-{}", self.id, self.tag)
        } else {
            format!("{}-latest", self.id)
        }
    }
}

/// Matchers compiled from one catalog snapshot.
#[derive(Debug, Default)]
pub struct Rules {
    containers: Vec<ContainerRule>,
    volumes: Vec<VolumeRule>,
    images: Vec<ImageRule>,
}

impl Rules {
    pub fn compile(catalog: &EnrichmentCatalog) -> Self {
        let containers = catalog
            .containers
            .iter()
            .filter(|c| !c.id.is_empty())
            .map(|c| {
                let mut patterns = Vec::new();
                if !c.short_id.is_empty()
                    && let Ok(re) = Regex::new(&format!("{}[a-z0-9]*", regex::escape(&c.short_id)))
                {
                    patterns.push(re);
                }
                // Multiple names come comma separated.
                patterns.extend(c.names.split(',').map(str::trim).filter_map(literal));
                ContainerRule {
                    id: c.id.clone(),
                    patterns,
                }
            })
            .collect();

        let volumes = catalog
            .volumes
            .iter()
            .filter_map(|v| {
                literal(&v.name).map(|pattern| VolumeRule {
                    name: v.name.clone(),
                    pattern,
                })
            })
            .collect();

        let images = catalog
            .images
            .iter()
            .filter(|img| !img.id.is_empty())
            .filter_map(|img| {
                literal(&img.repository).map(|pattern| ImageRule {
                    id: img.id.clone(),
                    repository: img.repository.clone(),
                    tag: img.tag.clone(),
                    pattern,
                })
            })
            .collect();

        Rules {
            containers,
            volumes,
            images,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.volumes.is_empty() && self.images.is_empty()
    }

    /// Rewrite one line (without its newline). Lines with no match come back
    /// unchanged.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let mut line = Cow::Borrowed(line);

        for c in &self.containers {
            for re in &c.patterns {
                if let Some(s) = rewritten(replace_standalone(re, &line, LinkKind::Containers, &c.id)) {
                    line = Cow::Owned(s);
                }
            }
        }

        for v in &self.volumes {
            if let Some(s) = rewritten(replace_all(&v.pattern, &line, LinkKind::Volumes, &v.name)) {
                line = Cow::Owned(s);
            }
        }

        for img in &self.images {
            if !line.contains(&img.repository) {
                continue;
            }
            let id = img.link_id(&line);
            if let Some(s) = rewritten(replace_all(&img.pattern, &line, LinkKind::Images, &id)) {
                line = Cow::Owned(s);
            }
        }

        line
    }
}

/* ---- Engine ---- */

/// Result of draining the child's stdout.
#[derive(Debug)]
pub struct Drained<W> {
    /// Lines read from the pipe (all of them, written or not).
    pub lines: usize,
    /// The writer handed to `pump`, returned to the caller.
    pub output: W,
    /// First error hit while writing; the pipe is still drained after it.
    pub write_error: Option<std::io::Error>,
}

pub struct Enricher<S> {
    source: S,
    policy: RefreshPolicy,
    rules: Rules,
}

impl<S: CatalogSource> Enricher<S> {
    /// Load the initial snapshot from `source`.
    pub async fn new(source: S, policy: RefreshPolicy) -> Self {
        let catalog = source.load().await;
        if catalog.is_empty() {
            log_trace!("initial catalog is empty");
        }
        Self::with_catalog(source, policy, &catalog)
    }

    pub fn with_catalog(source: S, policy: RefreshPolicy, catalog: &EnrichmentCatalog) -> Self {
        Self {
            source,
            policy,
            rules: Rules::compile(catalog),
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Replace the current snapshot with a freshly loaded one.
    pub async fn refresh(&mut self) {
        let catalog = self.source.load().await;
        self.rules = Rules::compile(&catalog);
    }

    pub fn enrich_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.rules.apply(line)
    }

    /// Read `reader` line by line until end of stream, writing each enriched
    /// line plus `\n` to `out`. Returns once the reader is exhausted.
    ///
    /// Lines that are not UTF-8 are written unchanged. A write failure stops
    /// further writes but not the reading, so the producer never stalls on a
    /// full pipe.
    pub async fn pump<R, W>(mut self, reader: R, mut out: W) -> std::io::Result<Drained<W>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.rules.is_empty() && self.policy == RefreshPolicy::Once {
            log_debug!("no identifiers to link, output passes through unchanged");
        }
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut lines = 0usize;
        let mut write_error: Option<std::io::Error> = None;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            lines += 1;

            if write_error.is_some() {
                continue;
            }

            if self.policy == RefreshPolicy::EveryLine {
                self.refresh().await;
            }

            let mut rendered = match std::str::from_utf8(&buf) {
                Ok(text) => self.enrich_line(text).into_owned().into_bytes(),
                Err(_) => {
                    log_trace!("line {lines} is not UTF-8, passing through");
                    buf.clone()
                }
            };
            rendered.push(b'\n');

            let res = async {
                out.write_all(&rendered).await?;
                out.flush().await
            }
            .await;
            if let Err(e) = res {
                log_error!("writing enriched output failed, discarding the rest: {e}");
                write_error = Some(e);
            }
        }

        log_debug!("output drained: {lines} lines");
        Ok(Drained {
            lines,
            output: out,
            write_error,
        })
    }
}

/* ---- Tests ---- */
