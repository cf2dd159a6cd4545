//! Search index entries and keyword matching.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::page::PageRecord;
use super::record_map::{RecordMap, text_content};

pub const MAX_CONTENT_EXCERPTS: usize = 50;
pub const MAX_SNIPPETS: usize = 3;
const MIN_FRAGMENT_CHARS: usize = 4;
const UNTITLED: &str = "Untitled";
const ELLIPSIS: &str = "...";
const FALLBACK_SUMMARY_CHARS: usize = 80;

/// Block kinds whose text is indexed.
pub const SEARCHABLE_BLOCK_KINDS: &[&str] = &[
    "text",
    "bulleted_list",
    "numbered_list",
    "to_do",
    "toggle",
    "header",
    "sub_header",
    "sub_sub_header",
    "quote",
    "callout",
    "code",
    "column",
    "column_list",
];

/// Characters kept before/after a match in an excerpt.
#[derive(Debug, Clone, Copy)]
struct Window {
    before: usize,
    after: usize,
}

const SUMMARY_WINDOW: Window = Window {
    before: 30,
    after: 50,
};
const CONTENT_WINDOW: Window = Window {
    before: 20,
    after: 40,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub content_excerpts: Vec<String>,
    pub date: i64,
}

impl SearchIndexEntry {
    pub fn new(post: &PageRecord, content_excerpts: Vec<String>) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            slug: post.slug.clone(),
            tags: post.tags.clone(),
            summary: post.summary.clone(),
            content_excerpts,
            date: post.date,
        }
    }
}

pub type SearchIndex = HashMap<String, SearchIndexEntry>;

/// A matching post with up to [`MAX_SNIPPETS`] highlighted snippets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub page: PageRecord,
    pub snippets: Vec<String>,
}

/// Collects searchable text fragments below `root_id` in document order.
pub fn content_fragments(blocks: &RecordMap, root_id: &str) -> Vec<String> {
    let mut fragments = Vec::new();

    for block in blocks.descendants(root_id) {
        if !SEARCHABLE_BLOCK_KINDS.contains(&block.kind.as_str()) {
            continue;
        }

        if let Some(title) = block.property("title").map(text_content)
            && title != UNTITLED
            && title.chars().count() >= MIN_FRAGMENT_CHARS
        {
            fragments.push(title);
        }

        if block.kind == "code"
            && let Some(language) = block.property("language").map(text_content)
            && !language.is_empty()
        {
            fragments.push(language);
        }

        if let Some(caption) = block.property("caption").map(text_content)
            && caption.chars().count() >= MIN_FRAGMENT_CHARS
        {
            fragments.push(caption);
        }

        if fragments.len() >= MAX_CONTENT_EXCERPTS {
            break;
        }
    }

    fragments.truncate(MAX_CONTENT_EXCERPTS);
    fragments
}

/// Case-folded, trimmed keyword; `None` when nothing is left to match.
pub fn normalize_keyword(keyword: &str) -> Option<String> {
    let keyword: String = keyword.trim().chars().map(fold_char).collect();
    (!keyword.is_empty()).then_some(keyword)
}

/// Snippets for a post that has a full index entry.
pub fn indexed_snippets(entry: &SearchIndexEntry, keyword: &str) -> Vec<String> {
    let mut snippets = Vec::new();

    if find_ci(&entry.title, keyword).is_some() {
        snippets.push(entry.title.clone());
    }

    if let Some(tag) = matching_tag(&entry.tags, keyword) {
        snippets.push(format!("tag: {tag}"));
    }

    if let Some(position) = find_ci(&entry.summary, keyword) {
        snippets.push(excerpt(&entry.summary, position, keyword, SUMMARY_WINDOW));
    }

    for content in &entry.content_excerpts {
        if snippets.len() >= MAX_SNIPPETS {
            break;
        }
        if let Some(position) = find_ci(content, keyword) {
            snippets.push(excerpt(content, position, keyword, CONTENT_WINDOW));
        }
    }

    snippets.truncate(MAX_SNIPPETS);
    snippets
}

/// Snippets for a post missing from the index, using metadata only.
pub fn metadata_snippets(post: &PageRecord, keyword: &str) -> Vec<String> {
    let mut snippets = Vec::new();

    if find_ci(&post.title, keyword).is_some() {
        snippets.push(post.title.clone());
    }

    if let Some(tag) = matching_tag(&post.tags, keyword) {
        snippets.push(format!("tag: {tag}"));
    }

    if find_ci(&post.summary, keyword).is_some() {
        let head: String = post.summary.chars().take(FALLBACK_SUMMARY_CHARS).collect();
        snippets.push(format!("{head}{ELLIPSIS}"));
    }

    snippets.truncate(MAX_SNIPPETS);
    snippets
}

fn matching_tag<'a>(tags: &'a [String], keyword: &str) -> Option<&'a str> {
    tags.iter()
        .map(String::as_str)
        .find(|tag| find_ci(tag, keyword).is_some())
}

/// Case-insensitive substring search over characters.
///
/// Both sides are folded one char at a time, so every char of the haystack
/// lines up with one char of the keyword. Returns the char offset of the
/// first match.
pub fn find_ci(haystack: &str, keyword: &str) -> Option<usize> {
    let needle: Vec<char> = keyword.chars().map(fold_char).collect();
    if needle.is_empty() {
        return None;
    }

    let folded: Vec<char> = haystack.chars().map(fold_char).collect();
    if folded.len() < needle.len() {
        return None;
    }

    (0..=folded.len() - needle.len()).find(|&start| folded[start..start + needle.len()] == needle[..])
}

fn fold_char(ch: char) -> char {
    let mut lower = ch.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => ch,
    }
}

fn excerpt(text: &str, position: usize, keyword: &str, window: Window) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = position.saturating_sub(window.before);
    let end = (position + keyword.chars().count() + window.after).min(chars.len());

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}
