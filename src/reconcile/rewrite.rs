//! Rewriting legacy links and asset URLs inside migrated HTML bodies.

use std::collections::HashMap;

use crate::model::TargetRecord;
use crate::reconcile::files::{extract_path_from_year, without_hash_dir};
use crate::report::DiagnosticKind;

/// URL segment the target system serves at `/`.
pub const HOME_SEGMENT: &str = "home";

pub fn page_token(id: u64) -> String {
    format!("[page-ref:{id}]")
}

pub fn file_token(id: u64) -> String {
    format!("[file-ref:{id}]")
}

/// One attribute of a start tag. Only `value` is written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlAttribute {
    /// Lowercased attribute name.
    pub name: String,
    pub value: String,
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Visit every attribute value in `body`. Values the callback changes are
/// spliced back in place; everything else (text, comments, tag structure) is
/// copied through byte for byte.
pub fn rewrite_attributes(body: &str, mut edit: impl FnMut(&mut HtmlAttribute)) -> String {
    let bytes = body.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut copied = 0;
    let mut i = 0;

    while let Some(offset) = body[i..].find('<') {
        let start = i + offset;
        if body[start..].starts_with("<!--") {
            i = body[start..].find("-->").map_or(len, |end| start + end + 3);
            continue;
        }
        if !bytes.get(start + 1).is_some_and(u8::is_ascii_alphabetic) {
            i = start + 1;
            continue;
        }

        let mut pos = start + 1;
        while pos < len && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'-' | b':')) {
            pos += 1;
        }

        loop {
            pos = skip_whitespace(bytes, pos);
            match bytes.get(pos) {
                None => break,
                Some(b'>') => {
                    pos += 1;
                    break;
                }
                Some(b'/') | Some(b'=') => {
                    pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let name_start = pos;
            while pos < len
                && !bytes[pos].is_ascii_whitespace()
                && !matches!(bytes[pos], b'=' | b'>' | b'/')
            {
                pos += 1;
            }
            let name = &body[name_start..pos];

            pos = skip_whitespace(bytes, pos);
            if bytes.get(pos) != Some(&b'=') {
                continue;
            }
            pos = skip_whitespace(bytes, pos + 1);

            let (value_start, value_end) = match bytes.get(pos) {
                None => break,
                Some(&quote @ (b'"' | b'\'')) => {
                    let value_start = pos + 1;
                    let value_end = body[value_start..]
                        .find(quote as char)
                        .map_or(len, |end| value_start + end);
                    pos = (value_end + 1).min(len);
                    (value_start, value_end)
                }
                Some(_) => {
                    let value_start = pos;
                    while pos < len && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                        pos += 1;
                    }
                    (value_start, pos)
                }
            };

            let original = &body[value_start..value_end];
            let mut attr = HtmlAttribute {
                name: name.to_ascii_lowercase(),
                value: original.to_string(),
            };
            edit(&mut attr);
            if attr.value != original {
                out.push_str(&body[copied..value_start]);
                out.push_str(&attr.value);
                copied = value_end;
            }
        }
        i = pos.min(len);
    }

    out.push_str(&body[copied..]);
    out
}

fn strip_query(link: &str) -> &str {
    link.split_once(['?', '#']).map_or(link, |(path, _)| path)
}

/// Resolves site-relative links (`/about/team/`) to target page ids.
#[derive(Debug, Default)]
pub struct LinkIndex {
    by_path: HashMap<String, u64>,
    by_segment: HashMap<String, Vec<u64>>,
}

impl LinkIndex {
    /// Index every non-file record by its full segment path below `root_parent_id`.
    pub fn build(pages: &[TargetRecord], root_parent_id: u64) -> Self {
        let by_id: HashMap<u64, &TargetRecord> = pages.iter().map(|p| (p.id, p)).collect();
        let mut index = Self::default();

        for page in pages.iter().filter(|p| !p.url_segment.is_empty()) {
            let mut chain = vec![page.url_segment.as_str()];
            let mut parent = page.parent_id;
            let mut complete = true;
            while parent != root_parent_id && parent != 0 {
                match by_id.get(&parent) {
                    Some(ancestor) if chain.len() <= by_id.len() => {
                        chain.push(ancestor.url_segment.as_str());
                        parent = ancestor.parent_id;
                    }
                    _ => {
                        complete = false;
                        break;
                    }
                }
            }
            index
                .by_segment
                .entry(page.url_segment.clone())
                .or_default()
                .push(page.id);
            if !complete {
                continue;
            }
            chain.reverse();
            let path = chain.join("/");
            if path == HOME_SEGMENT {
                index.by_path.entry(String::new()).or_insert(page.id);
            }
            index.by_path.entry(path).or_insert(page.id);
        }
        index
    }

    /// Exact path match first, then a page that is the only one carrying the
    /// link's last segment.
    pub fn resolve(&self, link: &str) -> Option<u64> {
        let path = strip_query(link).trim_matches('/');
        if let Some(id) = self.by_path.get(path) {
            return Some(*id);
        }
        let last = path.rsplit('/').next().filter(|s| !s.is_empty())?;
        match self.by_segment.get(last).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub id: u64,
    /// Target-relative link, e.g. `assets/Uploads/2014/01/a.pdf`.
    pub link: String,
}

/// Legacy upload path (`2014/01/[hash/]a.pdf`) to migrated file.
#[derive(Debug, Default)]
pub struct AssetMap {
    entries: HashMap<String, AssetRef>,
}

impl AssetMap {
    pub fn build(files: &[TargetRecord]) -> Self {
        let mut map = Self::default();
        let mut variants = Vec::new();
        for file in files.iter().filter(|f| f.stamp.is_legacy()) {
            let Some(filename) = file.filename.as_deref() else {
                continue;
            };
            let Some(canonical) = extract_path_from_year(filename, false) else {
                continue;
            };
            let asset = AssetRef {
                id: file.id,
                link: filename.trim_start_matches('/').to_string(),
            };
            if let Some(short) = without_hash_dir(&canonical) {
                variants.push((short, asset.clone()));
            }
            map.entries.insert(canonical, asset);
        }
        for (key, asset) in variants {
            map.entries.entry(key).or_insert(asset);
        }
        map
    }

    pub fn get(&self, legacy_path: &str) -> Option<&AssetRef> {
        self.entries.get(legacy_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A reference the rewriter had to leave untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub kind: DiagnosticKind,
    pub attribute: String,
    pub value: String,
    pub message: String,
}

/// A `YYYY/MM/.../name.ext` path, as opposed to a dated permalink.
fn names_dated_file(value: &str) -> bool {
    extract_path_from_year(value, false).is_some_and(|path| {
        path.rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
    })
}

pub struct LinkRewriter<'a> {
    site_urls: Vec<String>,
    storage_hosts: &'a [String],
    asset_prefix: String,
    links: &'a LinkIndex,
    assets: &'a AssetMap,
}

impl<'a> LinkRewriter<'a> {
    /// `asset_prefix` is the target-relative uploads directory, used to
    /// recognise values an earlier run already rewrote.
    pub fn new(
        site_url: &str,
        storage_hosts: &'a [String],
        asset_prefix: &str,
        links: &'a LinkIndex,
        assets: &'a AssetMap,
    ) -> Self {
        let canonical = site_url.trim().trim_end_matches('/').to_string();
        let mut site_urls = vec![canonical.clone()];
        if let Some(rest) = canonical.strip_prefix("http://") {
            site_urls.push(format!("https://{rest}"));
        } else if let Some(rest) = canonical.strip_prefix("https://") {
            site_urls.push(format!("http://{rest}"));
        }
        let asset_prefix = asset_prefix.trim_matches('/');
        Self {
            site_urls,
            storage_hosts,
            asset_prefix: if asset_prefix.is_empty() {
                String::new()
            } else {
                format!("{asset_prefix}/")
            },
            links,
            assets,
        }
    }

    fn is_extracted_asset(&self, value: &str) -> bool {
        !self.asset_prefix.is_empty()
            && value.trim_start_matches('/').starts_with(&self.asset_prefix)
    }

    fn lookup_asset(&self, value: &str) -> Option<&'a AssetRef> {
        let assets = self.assets;
        extract_path_from_year(value, false)
            .and_then(|path| assets.get(&path))
            .or_else(|| extract_path_from_year(value, true).and_then(|path| assets.get(&path)))
    }

    fn rewrite_value(&self, attr: &mut HtmlAttribute, unresolved: &mut Vec<UnresolvedReference>) {
        let value = attr.value.clone();
        let mut is_asset = false;

        if let Some(site_url) = self.site_urls.iter().find(|url| value.contains(url.as_str())) {
            let relative = value.replace(site_url.as_str(), "");
            if let Some(id) = self.links.resolve(&relative) {
                attr.value = page_token(id);
                return;
            }
            if names_dated_file(&value) {
                is_asset = true;
            } else {
                unresolved.push(UnresolvedReference {
                    kind: DiagnosticKind::UnresolvedLink,
                    attribute: attr.name.clone(),
                    message: format!(
                        "unable to make URL relative on attribute \"{}\": {value}",
                        attr.name
                    ),
                    value,
                });
                return;
            }
        }

        let is_asset = is_asset
            || self.storage_hosts.iter().any(|host| value.contains(host.as_str()))
            || self.is_extracted_asset(&value);
        if !is_asset {
            return;
        }

        match self.lookup_asset(&value) {
            Some(asset) => {
                attr.value = if attr.name == "href" {
                    file_token(asset.id)
                } else {
                    asset.link.clone()
                };
            }
            None => unresolved.push(UnresolvedReference {
                kind: DiagnosticKind::UnresolvedAsset,
                attribute: attr.name.clone(),
                message: format!(
                    "cannot find file {} referenced by attribute \"{}\"",
                    extract_path_from_year(&value, false).unwrap_or_else(|| value.clone()),
                    attr.name
                ),
                value,
            }),
        }
    }

    /// Rewrite every resolvable reference in `body`; unresolvable ones are
    /// returned alongside and left as they were.
    pub fn rewrite(&self, body: &str) -> (String, Vec<UnresolvedReference>) {
        let mut unresolved = Vec::new();
        let rewritten = rewrite_attributes(body, |attr| self.rewrite_value(attr, &mut unresolved));
        (rewritten, unresolved)
    }
}
