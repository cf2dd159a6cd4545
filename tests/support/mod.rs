//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use siteweave::application::{SiteError, SubtreeSource};
use siteweave::domain::record_map::{
    Block, RecordMap, RecordMapBuilder, date_property, text_property,
};

pub const ROOT_ID: &str = "root";
pub const CONFIG_ID: &str = "cfg";

const SCHEMA: &[(&str, &str, &str)] = &[
    ("title", "title", "title"),
    ("sl", "slug", "text"),
    ("ty", "type", "select"),
    ("st", "status", "select"),
    ("dt", "date", "date"),
    ("tg", "tags", "multi_select"),
    ("sm", "summary", "text"),
];

/// In-memory upstream that counts requests per item.
#[derive(Default)]
pub struct FakeSource {
    trees: Mutex<HashMap<String, RecordMap>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, tree: RecordMap) {
        self.trees.lock().unwrap().insert(id.to_string(), tree);
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SubtreeSource for FakeSource {
    async fn fetch_subtree(&self, id: &str) -> Result<RecordMap, SiteError> {
        *self.calls.lock().unwrap().entry(id.to_string()).or_default() += 1;
        // Yield so concurrent callers overlap with the request.
        tokio::task::yield_now().await;
        self.trees
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::upstream(id, "404 Not Found"))
    }
}

/// One row of the root collection.
pub struct Item<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub slug: &'a str,
    pub kind: &'a str,
    pub status: &'a str,
    pub date: &'a str,
    pub tags: &'a str,
    pub summary: &'a str,
}

impl<'a> Item<'a> {
    pub fn post(id: &'a str, slug: &'a str, date: &'a str) -> Self {
        Self {
            id,
            title: id,
            slug,
            kind: "Post",
            status: "Published",
            date,
            tags: "",
            summary: "",
        }
    }

    fn block(&self) -> Block {
        Block::new(self.id, "page")
            .with_title(self.title)
            .with_property("sl", text_property(self.slug))
            .with_property("ty", text_property(self.kind))
            .with_property("st", text_property(self.status))
            .with_property("dt", date_property(self.date, None))
            .with_property("tg", text_property(self.tags))
            .with_property("sm", text_property(self.summary))
    }
}

/// Root collection holding `items` plus a configuration item in the `Config` view.
pub fn root_tree(items: &[Item<'_>]) -> RecordMap {
    let mut ids: Vec<&str> = items.iter().map(|item| item.id).collect();
    ids.push(CONFIG_ID);

    let mut builder = RecordMapBuilder::new().database(
        ROOT_ID,
        "posts",
        SCHEMA,
        &[("all", "All", ids.as_slice()), ("config", "Config", &[CONFIG_ID])],
    );
    for item in items {
        builder = builder.block(item.block());
    }
    builder
        .block(
            Block::new(CONFIG_ID, "page")
                .with_title("Site config")
                .with_property("ty", text_property("Config"))
                .with_property("st", text_property("Published")),
        )
        .build()
}

/// Root collection holding only `items`, with no `Config` view.
pub fn root_tree_without_config(items: &[Item<'_>]) -> RecordMap {
    let ids: Vec<&str> = items.iter().map(|item| item.id).collect();

    let mut builder =
        RecordMapBuilder::new().database(ROOT_ID, "posts", SCHEMA, &[("all", "All", ids.as_slice())]);
    for item in items {
        builder = builder.block(item.block());
    }
    builder.build()
}

/// Subtree of the configuration item with its name/value/type table.
pub fn config_tree() -> RecordMap {
    let mut map = RecordMapBuilder::new()
        .database(
            "cfg-table",
            "cfg-coll",
            &[("n", "name", "title"), ("v", "value", "text"), ("t", "type", "select")],
            &[("cfg-view", "Table", &[])],
        )
        .block(Block::new(CONFIG_ID, "page").with_content(["cfg-table"]))
        .build();
    if let Some(table) = map.block.get_mut("cfg-table").and_then(|record| record.value.as_mut()) {
        table.kind = "collection_view".to_string();
    }
    map
}

/// Subtree of a post whose body is the given paragraphs.
pub fn post_tree(id: &str, paragraphs: &[&str]) -> RecordMap {
    let children: Vec<String> = (0..paragraphs.len())
        .map(|index| format!("{id}-b{index}"))
        .collect();
    let mut builder =
        RecordMapBuilder::new().block(Block::new(id, "page").with_title(id).with_content(&children));
    for (child, text) in children.iter().zip(paragraphs) {
        builder = builder.block(Block::new(child.as_str(), "text").with_title(text));
    }
    builder.build()
}

/// A source serving a complete small site.
pub fn seeded_source(items: &[Item<'_>]) -> FakeSource {
    let source = FakeSource::new();
    source.insert(ROOT_ID, root_tree(items));
    source.insert(CONFIG_ID, config_tree());
    source
}
