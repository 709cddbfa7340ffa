//! Defines the [`Tag`] type, which represents a document tag, and the
//! [`TagIndex`] which maps each tag to the documents that carry it.

use crate::permalink::Permalink;
use gtmpl::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use url::Url;

/// Represents a document tag. Tags are compared by slug so that e.g., `macOS`
/// and `MacOS` resolve to the same tag.
#[derive(Clone, Debug)]
pub struct Tag {
    /// The tag as first written in a document's front matter.
    pub name: String,

    /// The slugified name, used for comparison and in the tag's URL.
    pub slug: String,

    /// The URL for the tag's first index page, i.e.
    /// `{base_url}/tags/{slug}/`.
    pub url: String,
}

impl Tag {
    /// Creates a tag from a front matter name. Returns `None` for names that
    /// slugify to nothing (e.g. `"!!!"`).
    pub fn new(name: &str, base_url: Option<&Url>) -> Option<Tag> {
        let slug = tag_slug(name);
        if slug.is_empty() {
            return None;
        }
        Some(Tag {
            name: name.trim().to_owned(),
            url: Tag::permalink(&slug).url(base_url),
            slug,
        })
    }

    /// The permalink of the tag's first index page.
    pub fn permalink(slug: &str) -> Permalink {
        Permalink::directory(&["tags", slug])
    }

    /// Creates the tags for a document, dropping duplicates (by slug) while
    /// keeping the order they were written in.
    pub fn from_names(names: &[String], base_url: Option<&Url>) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::with_capacity(names.len());
        for tag in names.iter().filter_map(|name| Tag::new(name, base_url)) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

// `slugify` drops punctuation, which would fold `c++` and `c#` into `c`.
fn tag_slug(name: &str) -> String {
    slug::slugify(name.replace('+', "p").replace('#', "sharp"))
}

impl Hash for Tag {
    /// Implements [`Hash`] for [`Tag`] by delegating directly to the `slug`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slug.hash(state)
    }
}

impl PartialEq for Tag {
    /// Implements [`PartialEq`] and [`Eq`] for [`Tag`] by delegating directly
    /// to the `slug` field.
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}
impl Eq for Tag {}

impl From<&Tag> for Value {
    /// Converts [`Tag`]s into [`Value`]s for templating.
    fn from(t: &Tag) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(t.name.clone()));
        m.insert("slug".to_owned(), Value::String(t.slug.clone()));
        m.insert("url".to_owned(), Value::String(t.url.clone()));
        Value::Object(m)
    }
}

/// A tag and the documents that carry it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: Tag,

    /// Indices of the member documents, in the order they were folded in.
    pub members: Vec<usize>,
}

/// The tag-to-documents index for a build. It's derived from every
/// document's tags after rendering rather than accumulated as documents are
/// processed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagIndex {
    entries: BTreeMap<String, TagEntry>,
}

impl TagIndex {
    /// Folds per-document tag contributions into an index. `contributions`
    /// yields each document's index alongside its tags; the first spelling of
    /// a tag wins as its display name.
    pub fn fold<'a, I>(contributions: I) -> TagIndex
    where
        I: IntoIterator<Item = (usize, &'a [Tag])>,
    {
        let mut entries: BTreeMap<String, TagEntry> = BTreeMap::new();
        for (document, tags) in contributions {
            for tag in tags {
                entries
                    .entry(tag.slug.clone())
                    .or_insert_with(|| TagEntry {
                        tag: tag.clone(),
                        members: Vec::new(),
                    })
                    .members
                    .push(document);
            }
        }
        TagIndex { entries }
    }

    /// Iterates the tags in slug order.
    pub fn iter(&self) -> impl Iterator<Item = &TagEntry> {
        self.entries.values()
    }

    pub fn get(&self, slug: &str) -> Option<&TagEntry> {
        self.entries.get(slug)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
