//! Link fragments inside structured content.
//!
//! Link-parseable content refers to other resources with fragments like
//!
//! ```text
//! <link type="strong"><target>/sites/default/a.html</target><uuid>…</uuid></link>
//! ```
//!
//! After an import the uuid may be stale (the target was re-created) or
//! missing (the producer only knew the path). Correction re-binds each
//! fragment to the live target: the uuid wins when it resolves, otherwise the
//! path is looked up and the uuid rewritten.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<link(?:\s+type="(?P<kind>[A-Za-z]+)")?\s*>\s*<target>(?P<target>.*?)</target>\s*(?:<uuid>(?P<uuid>.*?)</uuid>\s*)?</link>"#,
    )
    .expect("link pattern must compile")
});

/// Relation type created for a strong link.
pub const RELATION_STRONG: &str = "XML_STRONG";

/// Relation type created for a weak link.
pub const RELATION_WEAK: &str = "XML_WEAK";

/// One link fragment found in content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFragment {
    pub target: String,
    pub uuid: Option<String>,
    pub strong: bool,
}

impl LinkFragment {
    /// Relation type this link implies.
    #[must_use]
    pub const fn relation_type(&self) -> &'static str {
        if self.strong {
            RELATION_STRONG
        } else {
            RELATION_WEAK
        }
    }

    fn render(&self) -> String {
        let kind = if self.strong { "strong" } else { "weak" };
        match &self.uuid {
            Some(uuid) => format!(
                r#"<link type="{kind}"><target>{}</target><uuid>{uuid}</uuid></link>"#,
                self.target
            ),
            None => format!(r#"<link type="{kind}"><target>{}</target></link>"#, self.target),
        }
    }
}

fn fragment(caps: &Captures<'_>) -> LinkFragment {
    let target = caps.name("target").map_or("", |m| m.as_str()).trim();
    let target = target
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(target);
    LinkFragment {
        target: target.trim().to_string(),
        uuid: caps
            .name("uuid")
            .map(|m| m.as_str().trim().to_string())
            .filter(|u| !u.is_empty()),
        strong: caps
            .name("kind")
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("strong")),
    }
}

/// All link fragments in `content`, in document order.
#[must_use]
pub fn parse_links(content: &str) -> Vec<LinkFragment> {
    LINK_RE.captures_iter(content).map(|c| fragment(&c)).collect()
}

/// Re-bind every link fragment through `resolve`.
///
/// `resolve(uuid, path)` returns the live `(path, uuid)` of the target or
/// `None` when it cannot be found. Unresolved fragments are left untouched.
/// Returns the corrected content and the fragments that resolved.
pub fn correct_links<F>(content: &str, mut resolve: F) -> (String, Vec<LinkFragment>)
where
    F: FnMut(Option<&str>, &str) -> Option<(String, String)>,
{
    let mut resolved = Vec::new();
    let corrected = LINK_RE.replace_all(content, |caps: &Captures<'_>| {
        let link = fragment(caps);
        match resolve(link.uuid.as_deref(), &link.target) {
            Some((target, uuid)) => {
                let fixed = LinkFragment {
                    target,
                    uuid: Some(uuid),
                    strong: link.strong,
                };
                let rendered = fixed.render();
                resolved.push(fixed);
                rendered
            }
            None => caps[0].to_string(),
        }
    });
    (corrected.into_owned(), resolved)
}
