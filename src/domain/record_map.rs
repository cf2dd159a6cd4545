//! Raw subtree model as returned by the upstream content service.
//!
//! A subtree is a "record map": flat tables of blocks, collections (databases),
//! collection views and pre-computed view queries, all keyed by ID. Block
//! properties are kept as raw decoration arrays and decoded on demand by the
//! helpers at the bottom of this module.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub type BlockMap = HashMap<String, Record<Block>>;
pub type Schema = BTreeMap<String, PropertySchema>;

/// Block kinds that make an item a queryable collection.
pub const COLLECTION_KINDS: &[&str] = &["collection_view_page", "collection_view"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMap {
    #[serde(default)]
    pub block: BlockMap,
    #[serde(default)]
    pub collection: HashMap<String, Record<Collection>>,
    #[serde(default)]
    pub collection_view: HashMap<String, Record<CollectionView>>,
    #[serde(default)]
    pub collection_query: HashMap<String, HashMap<String, CollectionQueryResult>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default = "Option::default")]
    pub value: Option<T>,
}

impl<T> Record<T> {
    pub fn new(value: T) -> Self {
        Self {
            role: None,
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub view_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: None,
            content: Vec::new(),
            collection_id: None,
            view_ids: Vec::new(),
            created_time: None,
            last_edited_time: None,
            format: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_title(self, text: &str) -> Self {
        self.with_property("title", text_property(text))
    }

    pub fn with_content<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_time(mut self, millis: i64) -> Self {
        self.created_time = Some(millis);
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|props| props.get(key))
    }

    pub fn is_collection(&self) -> bool {
        COLLECTION_KINDS.contains(&self.kind.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionView {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionQueryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_group_results: Option<GroupResults>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupResults {
    #[serde(default, rename = "blockIds")]
    pub block_ids: Vec<String>,
}

impl RecordMap {
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.block.get(id).and_then(|record| record.value.as_ref())
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collection.get(id).and_then(|record| record.value.as_ref())
    }

    /// Block IDs returned by the pre-computed query of one collection view.
    pub fn view_block_ids(&self, collection_id: &str, view_id: &str) -> &[String] {
        self.collection_query
            .get(collection_id)
            .and_then(|views| views.get(view_id))
            .and_then(|result| result.collection_group_results.as_ref())
            .map(|groups| groups.block_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Walks the subtree below `root_id` depth-first in document order.
    ///
    /// The root itself is not yielded. Blocks referenced from `content` but
    /// missing from the map are skipped, and each block is visited once.
    pub fn descendants(&self, root_id: &str) -> Vec<&Block> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(root_id.to_string());

        let mut stack: Vec<&str> = match self.block(root_id) {
            Some(root) => root.content.iter().rev().map(String::as_str).collect(),
            None => return ordered,
        };

        while let Some(id) = stack.pop() {
            if !seen.insert(id.to_string()) {
                continue;
            }
            let Some(block) = self.block(id) else {
                continue;
            };
            ordered.push(block);
            stack.extend(block.content.iter().rev().map(String::as_str));
        }

        ordered
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles record maps by hand; used by snapshot tooling and tests.
#[derive(Debug, Default)]
pub struct RecordMapBuilder {
    map: RecordMap,
}

impl RecordMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collection root block with its schema and views.
    ///
    /// `schema` entries are `(key, column name, column type)`; `views` entries are
    /// `(view id, view name, block ids)`.
    pub fn database(
        mut self,
        root_id: &str,
        collection_id: &str,
        schema: &[(&str, &str, &str)],
        views: &[(&str, &str, &[&str])],
    ) -> Self {
        let mut root = Block::new(root_id, "collection_view_page");
        root.collection_id = Some(collection_id.to_string());
        root.view_ids = views.iter().map(|(id, _, _)| id.to_string()).collect();
        self.map
            .block
            .insert(root_id.to_string(), Record::new(root));

        let schema = schema
            .iter()
            .map(|(key, name, kind)| {
                (
                    key.to_string(),
                    PropertySchema {
                        name: name.to_string(),
                        kind: kind.to_string(),
                    },
                )
            })
            .collect();
        self.map.collection.insert(
            collection_id.to_string(),
            Record::new(Collection {
                id: collection_id.to_string(),
                schema,
            }),
        );

        let queries = self
            .map
            .collection_query
            .entry(collection_id.to_string())
            .or_default();
        for (view_id, name, ids) in views {
            self.map.collection_view.insert(
                view_id.to_string(),
                Record::new(CollectionView {
                    id: view_id.to_string(),
                    name: Some(name.to_string()),
                    kind: Some("table".to_string()),
                }),
            );
            queries.insert(
                view_id.to_string(),
                CollectionQueryResult {
                    collection_group_results: Some(GroupResults {
                        block_ids: ids.iter().map(|id| id.to_string()).collect(),
                    }),
                },
            );
        }

        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.map
            .block
            .insert(block.id.clone(), Record::new(block));
        self
    }

    pub fn build(self) -> RecordMap {
        self.map
    }
}

// ============================================================================
// Decorations
// ============================================================================

/// Builds a plain-text decoration array: `[["text"]]`.
pub fn text_property(text: &str) -> Value {
    json!([[text]])
}

/// Builds a date decoration: `[["‣", [["d", {"type": "date", "start_date": ..}]]]]`.
pub fn date_property(start_date: &str, start_time: Option<&str>) -> Value {
    let date = match start_time {
        Some(time) => json!({"type": "datetime", "start_date": start_date, "start_time": time}),
        None => json!({"type": "date", "start_date": start_date}),
    };
    json!([["‣", [["d", date]]]])
}

/// Builds a file decoration: `[["name", [["a", "url"]]]]`.
pub fn file_property(name: &str, url: &str) -> Value {
    json!([[name, [["a", url]]]])
}

/// Concatenates the text runs of a decoration array, dropping formatting.
pub fn text_content(decorations: &Value) -> String {
    let Some(runs) = decorations.as_array() else {
        return decorations.as_str().unwrap_or_default().to_string();
    };

    let mut text = String::new();
    for run in runs {
        match run {
            Value::String(s) => text.push_str(s),
            Value::Array(parts) => {
                if let Some(s) = parts.first().and_then(Value::as_str) {
                    text.push_str(s);
                }
            }
            _ => {}
        }
    }
    text
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DateValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub start_date: String,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// Finds the first `["d", {...}]` format among the decoration runs.
pub fn date_value(decorations: &Value) -> Option<DateValue> {
    decorations
        .as_array()?
        .iter()
        .filter_map(|run| run.as_array()?.get(1)?.as_array())
        .flatten()
        .filter_map(Value::as_array)
        .find(|format| format.first().and_then(Value::as_str) == Some("d"))
        .and_then(|format| format.get(1))
        .and_then(|date| serde_json::from_value(date.clone()).ok())
}

/// Extracts a file URL from `[[url]]` or `[[name, [["a", url]]]]`.
pub fn file_value(decorations: &Value) -> Option<String> {
    let first = decorations.as_array()?.first()?.as_array()?;

    let linked = first
        .get(1)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|format| format.first().and_then(Value::as_str) == Some("a"))
        .and_then(|format| format.get(1))
        .and_then(Value::as_str);

    linked
        .or_else(|| first.first().and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_joins_runs_and_ignores_formats() {
        let value = json!([["Hello ", [["b"]]], ["world"]]);
        assert_eq!(text_content(&value), "Hello world");
        assert_eq!(text_content(&json!(null)), "");
    }

    #[test]
    fn date_value_reads_date_format() {
        let value = date_property("2024-03-01", Some("10:30"));
        let date = date_value(&value).expect("date");
        assert_eq!(date.kind, "datetime");
        assert_eq!(date.start_date, "2024-03-01");
        assert_eq!(date.start_time.as_deref(), Some("10:30"));

        assert!(date_value(&text_property("not a date")).is_none());
    }

    #[test]
    fn file_value_prefers_link_target() {
        let linked = file_property("cover.png", "https://files.example/cover.png");
        assert_eq!(
            file_value(&linked).as_deref(),
            Some("https://files.example/cover.png")
        );

        let bare = json!([["https://files.example/bare.png"]]);
        assert_eq!(
            file_value(&bare).as_deref(),
            Some("https://files.example/bare.png")
        );
        assert!(file_value(&json!([])).is_none());
    }

    #[test]
    fn descendants_follow_document_order() {
        let map = RecordMapBuilder::new()
            .block(Block::new("root", "page").with_content(["a", "b"]))
            .block(Block::new("a", "text").with_content(["a1"]))
            .block(Block::new("a1", "text"))
            .block(Block::new("b", "text").with_content(["root"]))
            .build();

        let ids: Vec<&str> = map
            .descendants("root")
            .into_iter()
            .map(|block| block.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "a1", "b"]);
    }

    #[test]
    fn record_map_deserializes_upstream_shape() {
        let raw = json!({
            "block": {
                "p1": {"role": "reader", "value": {"id": "p1", "type": "page", "content": ["b1"]}},
                "gone": {"role": "none"}
            },
            "collection_query": {
                "c1": {"v1": {"collection_group_results": {"type": "results", "blockIds": ["p1"]}}}
            }
        });

        let map: RecordMap = serde_json::from_value(raw).expect("record map");
        assert_eq!(map.block("p1").map(|b| b.kind.as_str()), Some("page"));
        assert!(map.block("gone").is_none());
        assert_eq!(map.view_block_ids("c1", "v1"), ["p1"]);
        assert!(map.view_block_ids("c1", "missing").is_empty());
    }
}
