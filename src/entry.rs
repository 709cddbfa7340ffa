//! Defines the [`Entry`] type: a [`Document`] after it has been assigned a
//! permalink and rendered. See [`Entry::to_value`] and [`Entry::summarize`]
//! for how entries are exposed to layouts.

use crate::document::Document;
use crate::markdown::Rendered;
use crate::permalink::Permalink;
use crate::tag::Tag;
use gtmpl::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A rendered document.
#[derive(Clone, Debug)]
pub struct Entry {
    pub document: Document,
    pub permalink: Permalink,

    /// The document's URL (absolute if the site has a `base_url`).
    pub url: String,

    pub rendered: Rendered,

    pub tags: Vec<Tag>,
}

impl Entry {
    /// The HTML summary for index pages and feeds, and whether the document
    /// has more content than the summary. A `summary` front matter key wins
    /// over the `<!-- more -->` fold.
    pub fn summary(&self) -> (&str, bool) {
        match &self.document.front_matter.summary {
            Some(summary) => (summary.as_str(), true),
            None => self.rendered.summary(),
        }
    }

    /// The date as `YYYY-MM-DD`, if any.
    pub fn date(&self) -> Option<String> {
        self.document
            .front_matter
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Converts an entry into the [`Value`] for its own page. The result has
    /// the fields of [`Entry::summarize`] plus `content` (the full fragment),
    /// `layout`, and `source`.
    pub fn to_value(&self) -> Value {
        let mut m = self.fields();
        m.insert(
            "content".to_owned(),
            Value::String(self.rendered.html.clone()),
        );
        m.insert(
            "layout".to_owned(),
            Value::String(self.document.front_matter.layout.clone()),
        );
        m.insert(
            "source".to_owned(),
            Value::String(self.document.source.to_string_lossy().into_owned()),
        );
        Value::Object(m)
    }

    /// Converts an entry into the [`Value`] listed on index pages: `title`,
    /// `date`, `url`, `permalink`, `tags`, `summary`, and `summarized`.
    pub fn summarize(&self) -> Value {
        Value::Object(self.fields())
    }

    fn fields(&self) -> HashMap<String, Value> {
        let (summary, summarized) = self.summary();
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert(
            "title".to_owned(),
            Value::String(self.document.front_matter.title.clone()),
        );
        m.insert(
            "date".to_owned(),
            match self.date() {
                Some(date) => Value::String(date),
                None => Value::Nil,
            },
        );
        m.insert("url".to_owned(), Value::String(self.url.clone()));
        m.insert(
            "permalink".to_owned(),
            Value::String(self.permalink.url_path().to_owned()),
        );
        m.insert(
            "tags".to_owned(),
            Value::Array(self.tags.iter().map(Value::from).collect()),
        );
        m.insert("summary".to_owned(), Value::String(summary.to_owned()));
        m.insert("summarized".to_owned(), Value::Bool(summarized));
        m
    }
}

/// The listing order on index pages: dated entries newest first, then
/// undated entries, with ties broken by source path so the order never
/// depends on how entries were produced.
pub fn listing_order(a: &Entry, b: &Entry) -> Ordering {
    let (a_date, b_date) = (a.document.front_matter.date, b.document.front_matter.date);
    match (a_date, b_date) {
        (Some(a_date), Some(b_date)) => b_date.cmp(&a_date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.document.source.cmp(&b.document.source))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::FrontMatter;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn entry(source: &str, date: Option<(i32, u32, u32)>, html: &str) -> Entry {
        let document = Document {
            source: PathBuf::from(source),
            front_matter: FrontMatter {
                layout: "post".to_owned(),
                title: source.to_owned(),
                date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
                ..FrontMatter::default()
            },
            body: String::new(),
        };
        let permalink = Permalink::resolve(&document, None).unwrap();
        Entry {
            url: permalink.url(None),
            permalink,
            document,
            rendered: Rendered {
                html: html.to_owned(),
                warnings: Vec::new(),
            },
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_summary_override() {
        let mut e = entry("a.md", None, "<p>Intro.</p><!-- more --><p>Rest.</p>");
        assert_eq!(("<p>Intro.</p>", true), e.summary());
        e.document.front_matter.summary = Some("Custom".to_owned());
        assert_eq!(("Custom", true), e.summary());
    }

    #[test]
    fn test_listing_order() {
        let mut entries = vec![
            entry("about.md", None, ""),
            entry("old.md", Some((2020, 1, 1)), ""),
            entry("new.md", Some((2023, 1, 1)), ""),
            entry("b.md", Some((2021, 6, 1)), ""),
            entry("a.md", Some((2021, 6, 1)), ""),
        ];
        entries.sort_by(listing_order);
        let sources: Vec<_> = entries
            .iter()
            .map(|e| e.document.source.to_string_lossy().into_owned())
            .collect();
        assert_eq!(vec!["new.md", "a.md", "b.md", "old.md", "about.md"], sources);
    }
}
