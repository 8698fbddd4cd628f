//! Read-only access to the legacy WordPress dataset.

pub mod phpser;
pub mod wpdb;

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::Result;
use crate::model::LegacyRecord;

pub use wpdb::WpDatabase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavMenu {
    pub name: String,
    pub slug: String,
}

/// Queries the migration needs from the legacy store. Every call returns a
/// fresh snapshot; records come back with their meta attached.
pub trait LegacySource {
    fn option(&self, name: &str) -> Result<Option<String>>;

    /// Rows of `post_type`, excluding trashed and auto-draft rows.
    fn posts(&self, post_type: &str) -> Result<Vec<LegacyRecord>>;

    fn nav_menus(&self) -> Result<Vec<NavMenu>>;

    /// Items of the menu with `slug`, ordered by `menu_order`.
    fn nav_menu_items(&self, slug: &str) -> Result<Vec<LegacyRecord>>;

    /// Whether the Gravity Forms tables exist in this dataset.
    fn has_forms(&self) -> Result<bool>;

    /// Gravity Forms definitions with `display_meta` attached as meta.
    fn forms(&self) -> Result<Vec<LegacyRecord>>;

    fn site_url(&self) -> Result<Option<String>> {
        Ok(self
            .option("siteurl")?
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty()))
    }

    /// Legacy id of the static front page, when the site uses one.
    fn front_page_id(&self) -> Result<Option<u64>> {
        if self.option("show_on_front")?.as_deref() != Some("page") {
            return Ok(None);
        }
        Ok(self
            .option("page_on_front")?
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|id| *id != 0))
    }
}

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));

/// Decode the HTML entities WordPress stores in titles (`&amp;`, `&#8217;`, ...).
pub fn decode_entities(raw: &str) -> String {
    ENTITY
        .replace_all(raw, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        _ => return None,
    })
}

/// Title as it should appear on the target side.
pub fn process_title(raw: &str) -> String {
    decode_entities(raw.trim())
}

/// Body as it should appear on the target side.
pub fn process_content(raw: &str) -> String {
    raw.replace("\r\n", "\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry&#8217;s"), "Tom & Jerry\u{2019}s");
        assert_eq!(decode_entities("&#x41;&lt;b&gt;"), "A<b>");
    }

    #[test]
    fn unknown_entities_are_left_alone() {
        assert_eq!(decode_entities("&bogus; &#xZZ;"), "&bogus; &#xZZ;");
    }

    #[test]
    fn content_is_trimmed_with_unix_newlines() {
        assert_eq!(process_content("  <p>a</p>\r\n<p>b</p>\r\n "), "<p>a</p>\n<p>b</p>");
    }
}
