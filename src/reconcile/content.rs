use crate::config::ContentMode;
use crate::legacy::process_content;
use crate::model::{ContentBlock, TargetRecord};

/// Where a page keeps its body. Chosen once per run from configuration.
pub trait ContentStrategy {
    fn mode(&self) -> ContentMode;

    /// Current body, `None` when there is nothing to work on.
    fn get<'a>(&self, record: &'a TargetRecord) -> Option<&'a str>;

    fn set(&self, record: &mut TargetRecord, content: &str);
}

pub fn for_mode(mode: ContentMode) -> Box<dyn ContentStrategy> {
    match mode {
        ContentMode::Flat => Box::new(FlatContent),
        ContentMode::Blocks => Box::new(BlockContent),
    }
}

/// Body stored directly on the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatContent;

impl ContentStrategy for FlatContent {
    fn mode(&self) -> ContentMode {
        ContentMode::Flat
    }

    fn get<'a>(&self, record: &'a TargetRecord) -> Option<&'a str> {
        Some(record.content.as_str()).filter(|c| !c.is_empty())
    }

    /// Blank legacy bodies never overwrite existing content.
    fn set(&self, record: &mut TargetRecord, content: &str) {
        let content = process_content(content);
        if !content.is_empty() {
            record.content = content;
        }
    }
}

/// Body stored as an HTML block owned by the page, keyed by the page's
/// legacy id so hand-added blocks are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockContent;

impl ContentStrategy for BlockContent {
    fn mode(&self) -> ContentMode {
        ContentMode::Blocks
    }

    fn get<'a>(&self, record: &'a TargetRecord) -> Option<&'a str> {
        let legacy_id = record.stamp.legacy_id;
        record
            .blocks
            .iter()
            .find(|b| b.legacy_id == legacy_id)
            .map(|b| b.html.as_str())
            .filter(|html| !html.is_empty())
    }

    fn set(&self, record: &mut TargetRecord, content: &str) {
        let html = process_content(content);
        let legacy_id = record.stamp.legacy_id;
        match record.blocks.iter_mut().find(|b| b.legacy_id == legacy_id) {
            Some(block) => block.html = html,
            None => record.blocks.push(ContentBlock { legacy_id, html }),
        }
    }
}
