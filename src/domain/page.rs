//! Typed page records and schema-driven property extraction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{
    Date, PrimitiveDateTime, Time,
    format_description::FormatItem,
    macros::{format_description, offset},
};

use super::error::DomainError;
use super::record_map::{RecordMap, Schema, date_value, file_value, text_content};
use super::slug::SlugPolicy;

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour]:[minute]");

/// Publishing role of an item in the root collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageKind {
    Post,
    Page,
    Notice,
    Menu,
    SubMenu,
    HeadMenu,
    Link,
    Config,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Post => "Post",
            PageKind::Page => "Page",
            PageKind::Notice => "Notice",
            PageKind::Menu => "Menu",
            PageKind::SubMenu => "SubMenu",
            PageKind::HeadMenu => "HeadMenu",
            PageKind::Link => "Link",
            PageKind::Config => "Config",
        }
    }

    /// Kinds that show up in site navigation.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            PageKind::Page
                | PageKind::Menu
                | PageKind::SubMenu
                | PageKind::HeadMenu
                | PageKind::Link
        )
    }
}

impl FromStr for PageKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Post" => Ok(PageKind::Post),
            "Page" => Ok(PageKind::Page),
            "Notice" => Ok(PageKind::Notice),
            "Menu" => Ok(PageKind::Menu),
            "SubMenu" => Ok(PageKind::SubMenu),
            "HeadMenu" => Ok(PageKind::HeadMenu),
            "Link" => Ok(PageKind::Link),
            "Config" => Ok(PageKind::Config),
            other => Err(DomainError::validation(format!(
                "unknown page type `{other}`"
            ))),
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageStatus {
    Published,
    Invisible,
    Draft,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Published => "Published",
            PageStatus::Invisible => "Invisible",
            PageStatus::Draft => "Draft",
        }
    }
}

impl FromStr for PageStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Published" => Ok(PageStatus::Published),
            "Invisible" => Ok(PageStatus::Invisible),
            "Draft" => Ok(PageStatus::Draft),
            other => Err(DomainError::validation(format!(
                "unknown page status `{other}`"
            ))),
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of the root collection with its typed properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub kind: Option<PageKind>,
    pub status: Option<PageStatus>,
    /// Publication instant in epoch milliseconds.
    pub date: i64,
    pub last_edited_time: Option<i64>,
    pub tags: Vec<String>,
    pub summary: String,
    pub category: Option<String>,
    /// Columns without a dedicated field, keyed by column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, PropertyValue>,
}

impl PageRecord {
    pub fn is_published_post(&self) -> bool {
        self.kind == Some(PageKind::Post) && self.status == Some(PageStatus::Published)
    }

    pub fn is_published(&self) -> bool {
        self.status == Some(PageStatus::Published)
    }
}

/// Closed set of column types understood by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Date,
    MultiSelect,
    Text,
    File,
}

impl PropertyKind {
    /// Maps a schema column type to its extraction variant; unknown types read as text.
    pub fn from_schema_type(kind: &str) -> Self {
        match kind {
            "date" => PropertyKind::Date,
            "multi_select" => PropertyKind::MultiSelect,
            "file" => PropertyKind::File,
            _ => PropertyKind::Text,
        }
    }

    pub fn extract(self, decorations: &Value) -> Option<PropertyValue> {
        match self {
            PropertyKind::Date => extract_date(decorations).map(PropertyValue::Date),
            PropertyKind::MultiSelect => Some(PropertyValue::Tags(extract_tags(decorations))),
            PropertyKind::Text => Some(PropertyValue::Text(text_content(decorations))),
            PropertyKind::File => file_value(decorations).map(PropertyValue::File),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Date(i64),
    Tags(Vec<String>),
    Text(String),
    File(String),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) | PropertyValue::File(text) => Some(text),
            _ => None,
        }
    }
}

fn extract_date(decorations: &Value) -> Option<i64> {
    let value = date_value(decorations)?;
    let date = Date::parse(&value.start_date, DATE_FORMAT).ok()?;
    let time = match (value.kind.as_str(), value.start_time.as_deref()) {
        ("datetime", Some(raw)) => Time::parse(raw, TIME_FORMAT).ok()?,
        _ => Time::MIDNIGHT,
    };
    let instant = PrimitiveDateTime::new(date, time).assume_offset(offset!(UTC));
    Some((instant.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn extract_tags(decorations: &Value) -> Vec<String> {
    text_content(decorations)
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turns one item of a subtree into a [`PageRecord`].
pub trait PropertyExtractor: Send + Sync {
    fn extract(
        &self,
        id: &str,
        blocks: &RecordMap,
        schema: &Schema,
    ) -> Result<PageRecord, DomainError>;
}

/// Default extractor: dispatches every schema column on its [`PropertyKind`].
#[derive(Debug, Clone, Default)]
pub struct SchemaExtractor {
    slug_policy: SlugPolicy,
}

impl SchemaExtractor {
    pub fn new(slug_policy: SlugPolicy) -> Self {
        Self { slug_policy }
    }

    /// Reads a single plain-text column by its schema name, skipping typed extraction.
    pub fn text_column(block_map: &RecordMap, id: &str, schema: &Schema, name: &str) -> String {
        let Some(block) = block_map.block(id) else {
            return String::new();
        };
        schema
            .iter()
            .find(|(_, column)| column.name == name)
            .and_then(|(key, _)| block.property(key))
            .map(text_content)
            .unwrap_or_default()
    }
}

impl PropertyExtractor for SchemaExtractor {
    fn extract(
        &self,
        id: &str,
        blocks: &RecordMap,
        schema: &Schema,
    ) -> Result<PageRecord, DomainError> {
        let block = blocks.block(id).ok_or_else(|| DomainError::not_found("page"))?;

        let mut values: BTreeMap<String, PropertyValue> = BTreeMap::new();
        if let Some(properties) = block.properties.as_ref() {
            for (key, decorations) in properties {
                // Deleted columns can linger on blocks.
                let Some(column) = schema.get(key) else {
                    continue;
                };
                let kind = PropertyKind::from_schema_type(&column.kind);
                if let Some(value) = kind.extract(decorations) {
                    values.insert(column.name.clone(), value);
                }
            }
        }

        let mut take_text = |name: &str| match values.remove(name) {
            Some(PropertyValue::Text(text)) => Some(text),
            Some(other) => {
                values.insert(name.to_string(), other);
                None
            }
            None => None,
        };

        let title = take_text("title").unwrap_or_default();
        let raw_slug = take_text("slug").unwrap_or_default();
        let kind = take_text("type").and_then(|raw| raw.parse::<PageKind>().ok());
        let status = take_text("status").and_then(|raw| raw.parse::<PageStatus>().ok());
        let summary = take_text("summary").unwrap_or_default();
        let category = take_text("category").filter(|value| !value.is_empty());

        let date = match values.remove("date") {
            Some(PropertyValue::Date(millis)) => millis,
            _ => block.created_time.unwrap_or_default(),
        };
        let tags = match values.remove("tags") {
            Some(PropertyValue::Tags(tags)) => tags,
            _ => Vec::new(),
        };

        let slug = match kind {
            Some(PageKind::Post) | Some(PageKind::Page) => self.slug_policy.normalize(&raw_slug, id),
            _ => raw_slug,
        };

        Ok(PageRecord {
            id: id.to_string(),
            title,
            slug,
            kind,
            status,
            date,
            last_edited_time: block.last_edited_time,
            tags,
            summary,
            category,
            extra: values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record_map::{
        Block, RecordMapBuilder, date_property, file_property, text_property,
    };

    const SCHEMA: &[(&str, &str, &str)] = &[
        ("title", "title", "title"),
        ("s1", "slug", "text"),
        ("t1", "type", "select"),
        ("st", "status", "select"),
        ("d1", "date", "date"),
        ("tg", "tags", "multi_select"),
        ("sm", "summary", "text"),
        ("cv", "cover", "file"),
    ];

    fn fixture(block: Block) -> (RecordMap, Schema) {
        let map = RecordMapBuilder::new()
            .database("root", "coll", SCHEMA, &[("v1", "All", &["p1"])])
            .block(block)
            .build();
        let schema = map.collection("coll").expect("collection").schema.clone();
        (map, schema)
    }

    #[test]
    fn extracts_typed_columns() {
        let block = Block::new("p1", "page")
            .with_title("Hello Rust")
            .with_property("s1", text_property("hello-rust"))
            .with_property("t1", text_property("Post"))
            .with_property("st", text_property("Published"))
            .with_property("d1", date_property("2024-03-01", None))
            .with_property("tg", text_property("rust, async,,"))
            .with_property("sm", text_property("A short summary"))
            .with_property("cv", file_property("c.png", "https://files.example/c.png"))
            .with_property("gone", text_property("stale column"));
        let (map, schema) = fixture(block);

        let page = SchemaExtractor::default()
            .extract("p1", &map, &schema)
            .expect("page");

        assert_eq!(page.title, "Hello Rust");
        assert_eq!(page.slug, "hello-rust");
        assert_eq!(page.kind, Some(PageKind::Post));
        assert_eq!(page.status, Some(PageStatus::Published));
        assert_eq!(page.date, 1_709_251_200_000);
        assert_eq!(page.tags, ["rust", "async"]);
        assert_eq!(page.summary, "A short summary");
        assert_eq!(
            page.extra.get("cover"),
            Some(&PropertyValue::File("https://files.example/c.png".into()))
        );
        assert!(page.is_published_post());
    }

    #[test]
    fn datetime_includes_start_time() {
        let block = Block::new("p1", "page")
            .with_property("d1", date_property("2024-03-01", Some("10:30")));
        let (map, schema) = fixture(block);

        let page = SchemaExtractor::default()
            .extract("p1", &map, &schema)
            .expect("page");
        assert_eq!(page.date, 1_709_251_200_000 + 10 * 3_600_000 + 30 * 60_000);
    }

    #[test]
    fn missing_date_falls_back_to_created_time() {
        let block = Block::new("p1", "page")
            .with_title("No date")
            .with_created_time(42);
        let (map, schema) = fixture(block);

        let page = SchemaExtractor::default()
            .extract("p1", &map, &schema)
            .expect("page");
        assert_eq!(page.date, 42);
        assert_eq!(page.kind, None);
        assert!(!page.is_published_post());
    }

    #[test]
    fn empty_post_slug_becomes_item_id() {
        let block = Block::new("p1", "page").with_property("t1", text_property("Post"));
        let (map, schema) = fixture(block);

        let page = SchemaExtractor::default()
            .extract("p1", &map, &schema)
            .expect("page");
        assert_eq!(page.slug, "p1");
    }

    #[test]
    fn unknown_item_is_not_found() {
        let (map, schema) = fixture(Block::new("p1", "page"));
        let err = SchemaExtractor::default()
            .extract("missing", &map, &schema)
            .expect_err("missing item");
        assert!(matches!(err, DomainError::NotFound { entity: "page" }));
    }

    #[test]
    fn text_column_reads_by_schema_name() {
        let block = Block::new("p1", "page").with_property("s1", text_property("raw-slug"));
        let (map, schema) = fixture(block);

        assert_eq!(
            SchemaExtractor::text_column(&map, "p1", &schema, "slug"),
            "raw-slug"
        );
        assert_eq!(SchemaExtractor::text_column(&map, "p1", &schema, "status"), "");
    }
}
