//! Support for creating Atom feeds from a list of entries.

use crate::config::Author;
use crate::entry::Entry;
use atom_syndication::{
    Category, Entry as AtomEntry, Error as AtomError, Feed, FixedDateTime, Link, Person, Text,
};
use chrono::{NaiveDate, TimeZone, Utc};
use thiserror::Error;

/// The feed's path relative to the output directory.
pub const FEED_FILE: &str = "feed.xml";

/// Bundled configuration for creating a feed.
pub struct FeedConfig<'a> {
    pub title: &'a str,

    /// The feed's Atom id; the site's `base_url`.
    pub id: &'a str,

    pub author: Option<&'a Author>,

    /// The URL of the site's main page.
    pub home_page: &'a str,

    /// The URL the feed itself is served from.
    pub feed_url: &'a str,

    /// The maximum number of entries.
    pub size: usize,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// [`Entry`]s in listing order, returning the serialized XML. Only dated
/// entries are included. The feed's `updated` timestamp is the newest entry's
/// date rather than the build time, so rebuilding unchanged content yields
/// an identical feed.
pub fn write_feed(config: &FeedConfig, entries: &[Entry]) -> Result<Vec<u8>> {
    let dated: Vec<(&Entry, FixedDateTime)> = entries
        .iter()
        .filter_map(|e| e.document.front_matter.date.map(|d| (e, timestamp(d))))
        .take(config.size)
        .collect();

    let mut feed = Feed::default();
    feed.set_title(config.title);
    feed.set_id(config.id);
    feed.set_updated(
        dated
            .iter()
            .map(|(_, date)| *date)
            .max()
            .unwrap_or_else(|| timestamp(NaiveDate::default())),
    );
    feed.set_authors(author_to_people(config.author));
    feed.set_links(vec![
        link(config.home_page, "alternate"),
        link(config.feed_url, "self"),
    ]);
    feed.set_entries(
        dated
            .into_iter()
            .map(|(entry, date)| feed_entry(config, entry, date))
            .collect::<Vec<_>>(),
    );
    Ok(feed.write_to(Vec::new())?)
}

fn feed_entry(config: &FeedConfig, entry: &Entry, date: FixedDateTime) -> AtomEntry {
    let (summary, _) = entry.summary();
    let mut atom_entry = AtomEntry::default();
    atom_entry.set_id(entry.url.as_str());
    atom_entry.set_title(entry.document.front_matter.title.as_str());
    atom_entry.set_updated(date);
    atom_entry.set_published(Some(date));
    atom_entry.set_authors(author_to_people(config.author));
    atom_entry.set_links(vec![link(&entry.url, "alternate")]);
    atom_entry.set_summary(Some(Text::html(summary)));
    atom_entry.set_categories(
        entry
            .tags
            .iter()
            .map(|tag| {
                let mut category = Category::default();
                category.set_term(tag.slug.as_str());
                category.set_label(Some(tag.name.clone()));
                category
            })
            .collect::<Vec<_>>(),
    );
    atom_entry
}

// Documents only carry a date; they're published at midnight UTC.
fn timestamp(date: NaiveDate) -> FixedDateTime {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&midnight).into()
}

fn link(href: &str, rel: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel(rel);
    link
}

fn author_to_people(author: Option<&Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name.as_str());
            person.set_email(author.email.clone());
            vec![person]
        }
        None => Vec::new(),
    }
}

/// The result of creating a feed.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when there is an Atom-related error.
    #[error("writing feed: {0}")]
    Atom(#[from] AtomError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::{Document, FrontMatter};
    use crate::markdown::Rendered;
    use crate::permalink::Permalink;
    use crate::tag::Tag;
    use std::path::PathBuf;

    fn entry(source: &str, date: Option<NaiveDate>) -> Entry {
        let document = Document {
            source: PathBuf::from(source),
            front_matter: FrontMatter {
                layout: "post".to_owned(),
                title: format!("Title of {}", source),
                date,
                ..FrontMatter::default()
            },
            body: String::new(),
        };
        let permalink = Permalink::resolve(&document, None).unwrap();
        Entry {
            url: format!("https://example.org{}", permalink.url_path()),
            permalink,
            document,
            rendered: Rendered {
                html: "<p>Intro</p><!-- more --><p>Rest</p>".to_owned(),
                warnings: Vec::new(),
            },
            tags: Tag::from_names(&["Go".to_owned()], None),
        }
    }

    fn config(size: usize) -> FeedConfig<'static> {
        FeedConfig {
            title: "Blog",
            id: "https://example.org/",
            author: None,
            home_page: "https://example.org/",
            feed_url: "https://example.org/feed.xml",
            size,
        }
    }

    #[test]
    fn test_feed_includes_newest_dated_entries() -> Result<()> {
        let entries = vec![
            entry("new.md", NaiveDate::from_ymd_opt(2023, 3, 1)),
            entry("mid.md", NaiveDate::from_ymd_opt(2022, 3, 1)),
            entry("old.md", NaiveDate::from_ymd_opt(2021, 3, 1)),
            entry("about.md", None),
        ];
        let xml = String::from_utf8(write_feed(&config(2), &entries)?).unwrap();
        assert!(xml.contains("Title of new.md"));
        assert!(xml.contains("Title of mid.md"));
        assert!(!xml.contains("Title of old.md"));
        assert!(!xml.contains("Title of about.md"));
        assert!(xml.contains("2023-03-01T00:00:00"));
        assert!(xml.contains("https://example.org/feed.xml"));
        Ok(())
    }

    #[test]
    fn test_feed_is_deterministic() -> Result<()> {
        let entries = vec![entry("a.md", NaiveDate::from_ymd_opt(2023, 3, 1))];
        assert_eq!(
            write_feed(&config(10), &entries)?,
            write_feed(&config(10), &entries)?
        );
        Ok(())
    }
}
