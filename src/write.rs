//! Responsible for turning [`Entry`]s into [`RenderedPage`]s (document pages,
//! the paginated main index, per-tag indices, and the tag list) and for
//! writing pages and assets to the output directory.

use crate::entry::Entry;
use crate::layout::{self, Layouts};
use crate::permalink::Permalink;
use crate::tag::{Tag, TagIndex};
use gtmpl::Value;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// An output file held in memory until the write phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPage {
    /// The path relative to the output directory.
    pub path: PathBuf,
    pub bytes: Vec<u8>,

    /// What produced the page (a source path or a description such as
    /// `tag index "go"`), for error messages.
    pub origin: String,
}

/// A file copied verbatim into the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub source: PathBuf,

    /// The path relative to the output directory.
    pub path: PathBuf,
}

/// Wraps rendered fragments and indices in their layouts.
pub struct Writer<'a> {
    pub layouts: &'a Layouts,

    /// The `site` value made available to every layout.
    pub site: Value,

    pub base_url: Option<&'a Url>,

    /// The layout for the main index pages.
    pub index_layout: &'a str,

    /// The layout for tag index pages.
    pub tag_layout: &'a str,

    /// The layout for the list of tags.
    pub tags_layout: &'a str,

    /// The number of entries per index page.
    pub index_page_size: usize,
}

impl Writer<'_> {
    /// Wraps each entry in its layout. `entries` must be in listing order;
    /// dated entries link to their dated neighbors as `prev` (newer) and
    /// `next` (older). Results are returned in the same order as `entries`.
    pub fn entry_pages(&self, entries: &[Entry]) -> Vec<layout::Result<RenderedPage>> {
        let dated: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].document.is_dated())
            .collect();
        let mut neighbors: HashMap<usize, (Option<&Entry>, Option<&Entry>)> = HashMap::new();
        for (n, &i) in dated.iter().enumerate() {
            let prev = n.checked_sub(1).map(|p| &entries[dated[p]]);
            let next = dated.get(n + 1).map(|&x| &entries[x]);
            neighbors.insert(i, (prev, next));
        }

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let (prev, next) = neighbors.get(&i).copied().unwrap_or((None, None));
                let mut m = self.page_fields(entry.document.front_matter.title.clone());
                m.insert("page".to_owned(), entry.to_value());
                m.insert("prev".to_owned(), link_value(prev));
                m.insert("next".to_owned(), link_value(next));
                let origin = entry.document.source.display().to_string();
                let bytes = self.layouts.render(
                    &entry.document.front_matter.layout,
                    Value::Object(m),
                    &origin,
                )?;
                Ok(RenderedPage {
                    path: entry.permalink.output_path().to_owned(),
                    bytes,
                    origin,
                })
            })
            .collect()
    }

    /// Renders the main index (dated entries only), one index per tag, and
    /// the tag list. Each kind of page is only rendered when its layout
    /// exists. `entries` must be in listing order.
    pub fn index_pages(&self, entries: &[Entry], tags: &TagIndex) -> layout::Result<Vec<RenderedPage>> {
        let mut pages = Vec::new();

        if self.layouts.contains(self.index_layout) {
            let index = Index {
                segments: Vec::new(),
                title: String::new(),
                tag: None,
                entries: entries.iter().filter(|e| e.document.is_dated()).collect(),
            };
            pages.extend(self.paginate(&index, self.index_layout)?);
        } else {
            debug!(layout = self.index_layout, "no index layout; skipping main index");
        }

        if self.layouts.contains(self.tag_layout) {
            for tag_entry in tags.iter() {
                let mut members = tag_entry.members.clone();
                members.sort_unstable();
                let index = Index {
                    segments: vec!["tags".to_owned(), tag_entry.tag.slug.clone()],
                    title: tag_entry.tag.name.clone(),
                    tag: Some(&tag_entry.tag),
                    entries: members.iter().map(|&i| &entries[i]).collect(),
                };
                pages.extend(self.paginate(&index, self.tag_layout)?);
            }
        } else if !tags.is_empty() {
            debug!(layout = self.tag_layout, "no tag layout; skipping tag indices");
        }

        if self.layouts.contains(self.tags_layout) {
            pages.push(self.tag_list_page(tags)?);
        }

        Ok(pages)
    }

    fn tag_list_page(&self, tags: &TagIndex) -> layout::Result<RenderedPage> {
        let permalink = Permalink::directory(&["tags"]);
        let mut m = self.page_fields("Tags".to_owned());
        m.insert(
            "tags".to_owned(),
            Value::Array(
                tags.iter()
                    .map(|e| {
                        let mut value = Value::from(&e.tag);
                        if let Value::Object(obj) = &mut value {
                            obj.insert("count".to_owned(), Value::from(e.members.len() as i64));
                        }
                        value
                    })
                    .collect(),
            ),
        );
        m.insert("url".to_owned(), Value::String(permalink.url(self.base_url)));
        let origin = String::from("tag list");
        Ok(RenderedPage {
            path: permalink.output_path().to_owned(),
            bytes: self.layouts.render(self.tags_layout, Value::Object(m), &origin)?,
            origin,
        })
    }

    /// Splits an index into pages. The first page lives at the index root
    /// (`{segments}/index.html`), later pages at
    /// `{segments}/page/{n}/index.html`. An empty index still gets a first
    /// page.
    fn paginate(&self, index: &Index, layout: &str) -> layout::Result<Vec<RenderedPage>> {
        let chunks: Vec<&[&Entry]> = match index.entries.is_empty() {
            true => vec![&[][..]],
            false => index.entries.chunks(self.index_page_size).collect(),
        };
        let total = chunks.len();
        let permalink = |i: usize| -> Permalink {
            let mut segments: Vec<String> = index.segments.clone();
            if i > 0 {
                segments.push("page".to_owned());
                segments.push((i + 1).to_string());
            }
            let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
            Permalink::directory(&segments)
        };

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let current = permalink(i);
                let mut m = self.page_fields(index.title.clone());
                m.insert(
                    "items".to_owned(),
                    Value::Array(chunk.iter().map(|e| e.summarize()).collect()),
                );
                m.insert(
                    "tag".to_owned(),
                    match index.tag {
                        Some(tag) => Value::from(tag),
                        None => Value::Nil,
                    },
                );
                m.insert("url".to_owned(), Value::String(current.url(self.base_url)));
                m.insert("number".to_owned(), Value::from((i + 1) as i64));
                m.insert("total".to_owned(), Value::from(total as i64));
                m.insert(
                    "prev".to_owned(),
                    match i {
                        0 => Value::Nil,
                        _ => Value::String(permalink(i - 1).url(self.base_url)),
                    },
                );
                m.insert(
                    "next".to_owned(),
                    match i + 1 < total {
                        true => Value::String(permalink(i + 1).url(self.base_url)),
                        false => Value::Nil,
                    },
                );

                let origin = match index.tag {
                    Some(tag) => format!("tag index `{}` page {}", tag.name, i + 1),
                    None => format!("main index page {}", i + 1),
                };
                Ok(RenderedPage {
                    path: current.output_path().to_owned(),
                    bytes: self.layouts.render(layout, Value::Object(m), &origin)?,
                    origin,
                })
            })
            .collect()
    }

    /// The fields every page has: `site` and `title`.
    fn page_fields(&self, title: String) -> HashMap<String, Value> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("site".to_owned(), self.site.clone());
        m.insert("title".to_owned(), Value::String(title));
        m
    }
}

/// A group of entries listed together: all dated entries, or all entries
/// with a given tag.
struct Index<'a> {
    /// The URL path segments of the first page, e.g. `["tags", "go"]`.
    segments: Vec<String>,
    title: String,
    tag: Option<&'a Tag>,
    entries: Vec<&'a Entry>,
}

fn link_value(entry: Option<&Entry>) -> Value {
    match entry {
        None => Value::Nil,
        Some(entry) => {
            let mut m: HashMap<String, Value> = HashMap::new();
            m.insert(
                "title".to_owned(),
                Value::String(entry.document.front_matter.title.clone()),
            );
            m.insert("url".to_owned(), Value::String(entry.url.clone()));
            Value::Object(m)
        }
    }
}

/// Replaces `output_directory` with the given pages and assets. The
/// directory tree is created up front; files are then written in parallel on
/// the current rayon pool.
pub fn write_output(
    output_directory: &Path,
    protected: &[&Path],
    pages: &[RenderedPage],
    assets: &[Asset],
) -> Result<()> {
    clean(output_directory, protected)?;

    let dirs: BTreeSet<PathBuf> = pages
        .iter()
        .map(|p| &p.path)
        .chain(assets.iter().map(|a| &a.path))
        .filter_map(|p| p.parent())
        .map(|p| output_directory.join(p))
        .collect();
    create_dir(output_directory)?;
    for dir in &dirs {
        create_dir(dir)?;
    }

    pages.par_iter().try_for_each(|page| {
        let path = output_directory.join(&page.path);
        fs::write(&path, &page.bytes).map_err(|err| Error::Io { path, err })
    })?;
    assets.par_iter().try_for_each(|asset| {
        let path = output_directory.join(&asset.path);
        fs::copy(&asset.source, &path)
            .map(|_| ())
            .map_err(|err| Error::Io { path, err })
    })?;
    Ok(())
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| Error::Io {
        path: dir.to_owned(),
        err,
    })
}

/// Removes the existing output tree. Refuses if the output directory is, or
/// contains, any of the `protected` directories (e.g. the content directory),
/// so that a mistyped destination can't delete the site's sources.
fn clean(dir: &Path, protected: &[&Path]) -> Result<()> {
    let canonical = match dir.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(Error::Clean {
                path: dir.to_owned(),
                err,
            })
        }
    };
    for protected in protected {
        if let Ok(protected) = protected.canonicalize() {
            if protected.starts_with(&canonical) {
                return Err(Error::UnsafeOutput {
                    output: dir.to_owned(),
                    protected,
                });
            }
        }
    }

    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Clean {
            path: dir.to_owned(),
            err,
        }),
    }
}

/// The result of a fallible output operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing the output directory.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for I/O problems while removing the old output tree.
    #[error("cleaning output directory `{}`: {err}", path.display())]
    Clean { path: PathBuf, err: io::Error },

    /// Returned when the output directory would contain the site's own
    /// sources.
    #[error(
        "refusing to replace output directory `{}`: it contains `{}`",
        output.display(),
        protected.display()
    )]
    UnsafeOutput { output: PathBuf, protected: PathBuf },

    /// Returned for other I/O errors writing output files.
    #[error("writing `{}`: {err}", path.display())]
    Io { path: PathBuf, err: io::Error },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::{Document, FrontMatter};
    use crate::markdown::Rendered;
    use chrono::NaiveDate;

    fn entry(source: &str, day: Option<u32>, tags: &[&str]) -> Entry {
        let document = Document {
            source: PathBuf::from(source),
            front_matter: FrontMatter {
                layout: "post".to_owned(),
                title: source.trim_end_matches(".md").to_owned(),
                date: day.and_then(|d| NaiveDate::from_ymd_opt(2023, 1, d)),
                ..FrontMatter::default()
            },
            body: String::new(),
        };
        let permalink = Permalink::resolve(&document, None).unwrap();
        let names: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        Entry {
            url: permalink.url(None),
            permalink,
            document,
            rendered: Rendered {
                html: String::from("<p>body</p>"),
                warnings: Vec::new(),
            },
            tags: Tag::from_names(&names, None),
        }
    }

    fn layouts() -> Layouts {
        Layouts::from_sources(vec![
            (
                "post",
                "{{ .page.title }}|{{ if .prev }}{{ .prev.url }}{{ end }}|{{ if .next }}{{ .next.url }}{{ end }}",
            ),
            (
                "index",
                "{{ range .items }}{{ .title }},{{ end }}|{{ if .prev }}{{ .prev }}{{ end }}|{{ if .next }}{{ .next }}{{ end }}",
            ),
            ("tag", "{{ .tag.name }}:{{ range .items }}{{ .title }},{{ end }}"),
        ])
        .unwrap()
    }

    fn writer(layouts: &Layouts, page_size: usize) -> Writer {
        Writer {
            layouts,
            site: Value::Nil,
            base_url: None,
            index_layout: "index",
            tag_layout: "tag",
            tags_layout: "tags",
            index_page_size: page_size,
        }
    }

    fn text(page: &RenderedPage) -> &str {
        std::str::from_utf8(&page.bytes).unwrap()
    }

    #[test]
    fn test_entry_pages_link_dated_neighbors() {
        let layouts = layouts();
        let entries = vec![
            entry("c.md", Some(3), &[]),
            entry("b.md", Some(2), &[]),
            entry("a.md", Some(1), &[]),
            entry("about.md", None, &[]),
        ];
        let pages: Vec<RenderedPage> = writer(&layouts, 10)
            .entry_pages(&entries)
            .into_iter()
            .collect::<layout::Result<_>>()
            .unwrap();
        assert_eq!("c||/b.html", text(&pages[0]));
        assert_eq!("b|/c.html|/a.html", text(&pages[1]));
        assert_eq!("a|/b.html|", text(&pages[2]));
        assert_eq!("about||", text(&pages[3]));
        assert_eq!(PathBuf::from("about.html"), pages[3].path);
    }

    #[test]
    fn test_index_pagination() {
        let layouts = layouts();
        let entries = vec![
            entry("c.md", Some(3), &[]),
            entry("b.md", Some(2), &[]),
            entry("a.md", Some(1), &[]),
            entry("about.md", None, &[]),
        ];
        let pages = writer(&layouts, 2)
            .index_pages(&entries, &TagIndex::default())
            .unwrap();
        assert_eq!(2, pages.len());
        assert_eq!(PathBuf::from("index.html"), pages[0].path);
        assert_eq!("c,b,||/page/2/", text(&pages[0]));
        assert_eq!(PathBuf::from("page/2/index.html"), pages[1].path);
        assert_eq!("a,|/|", text(&pages[1]));
    }

    #[test]
    fn test_empty_index_has_one_page() {
        let layouts = layouts();
        let pages = writer(&layouts, 2).index_pages(&[], &TagIndex::default()).unwrap();
        assert_eq!(1, pages.len());
        assert_eq!("||", text(&pages[0]));
    }

    #[test]
    fn test_tag_pages() {
        let layouts = layouts();
        let entries = vec![
            entry("b.md", Some(2), &["go", "c"]),
            entry("a.md", Some(1), &["go"]),
        ];
        let tags = TagIndex::fold(entries.iter().enumerate().map(|(i, e)| (i, e.tags.as_slice())));
        let pages = writer(&layouts, 10).index_pages(&entries, &tags).unwrap();
        let tag_pages: Vec<(&Path, &str)> = pages
            .iter()
            .filter(|p| p.path.starts_with("tags"))
            .map(|p| (p.path.as_path(), text(p)))
            .collect();
        assert_eq!(
            vec![
                (Path::new("tags/c/index.html"), "c:b,"),
                (Path::new("tags/go/index.html"), "go:b,a,"),
            ],
            tag_pages
        );
    }

    #[test]
    fn test_write_output_replaces_tree() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("stale")).unwrap();
        fs::write(out.join("stale/old.html"), "old").unwrap();
        let asset_source = dir.path().join("style.css");
        fs::write(&asset_source, "body {}").unwrap();

        let pages = vec![RenderedPage {
            path: PathBuf::from("posts/a.html"),
            bytes: b"<p>a</p>".to_vec(),
            origin: "posts/a.md".to_owned(),
        }];
        let assets = vec![Asset {
            source: asset_source,
            path: PathBuf::from("css/style.css"),
        }];
        write_output(&out, &[], &pages, &assets)?;

        assert!(!out.join("stale").exists());
        assert_eq!("<p>a</p>", fs::read_to_string(out.join("posts/a.html")).unwrap());
        assert_eq!("body {}", fs::read_to_string(out.join("css/style.css")).unwrap());
        Ok(())
    }

    #[test]
    fn test_write_output_refuses_to_delete_sources() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        fs::create_dir_all(&content).unwrap();
        let result = write_output(dir.path(), &[&content], &[], &[]);
        assert!(matches!(result, Err(Error::UnsafeOutput { .. })));
        assert!(content.exists());
    }
}
