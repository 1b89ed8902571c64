use serde::{Deserialize, Serialize};

/// A bookmark as returned by the API. Only the fields the sync needs are kept.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Raindrop {
    #[serde(rename = "_id")]
    pub id: u64,
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RaindropPage {
    #[serde(default)]
    pub items: Vec<Raindrop>,
    /// Total number of bookmarks in the collection, across all pages.
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedRaindrops {
    #[serde(default)]
    pub items: Vec<Raindrop>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct CollectionRef {
    #[serde(rename = "$ref")]
    kind: CollectionRefKind,
    #[serde(rename = "$id")]
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum CollectionRefKind {
    Collections,
}

impl CollectionRef {
    pub fn new(id: i64) -> Self {
        Self {
            kind: CollectionRefKind::Collections,
            id,
        }
    }
}

/// Serialized as `{}`; asks the service to fetch title and cover in the background.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PleaseParse {}

/// Creation payload for one bookmark.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewRaindrop {
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionRef>,
    #[serde(default)]
    pub please_parse: PleaseParse,
}

impl NewRaindrop {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: None,
            tags: Vec::new(),
            collection: None,
            please_parse: PleaseParse::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_collection(mut self, collection_id: i64) -> Self {
        self.collection = Some(CollectionRef::new(collection_id));
        self
    }

    /// Appends `tag` unless it is already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
}
