//! OSC 8 terminal hyperlinks.
//!
//! `ESC ] 8 ; ; URI BEL text ESC ] 8 ; ; BEL`. Terminals without support show
//! `text` and ignore the escape bytes.

use std::fmt;

const OSC: &str = "\u{1b}]";
const BEL: &str = "\u{7}";

/// URI scheme the desktop dashboard registers.
pub const LINK_SCHEME: &str = "docker-desktop";

/// Object kinds addressable in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Containers,
    Images,
    Volumes,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Containers => "containers",
            LinkKind::Images => "images",
            LinkKind::Volumes => "volumes",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn dashboard_uri(kind: LinkKind, id: &str) -> String {
    format!("{LINK_SCHEME}://dashboard/{kind}/{id}")
}

/// Wrap `text` in a hyperlink pointing at the dashboard page of `id`.
pub fn hyperlink(kind: LinkKind, text: &str, id: &str) -> String {
    format!(
        "{OSC}8;;{uri}{BEL}{text}{OSC}8;;{BEL}",
        uri = dashboard_uri(kind, id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_layout() {
        assert_eq!(
            hyperlink(LinkKind::Volumes, "pgdata", "pgdata"),
            "\x1b]8;;docker-desktop://dashboard/volumes/pgdata\x07pgdata\x1b]8;;\x07"
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(LinkKind::Containers.to_string(), "containers");
        assert_eq!(LinkKind::Images.as_str(), "images");
    }
}
