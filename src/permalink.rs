//! Resolves the output location of a [`Document`]. A permalink is written as
//! a URL path, optionally containing placeholders:
//!
//! * `:year`, `:month`, `:day` - from the document's `date`
//! * `:slug` - the slugified file stem (or directory name for `index.md`)
//! * `:title` - the slugified title
//!
//! A permalink ending in `/` or whose last segment has no extension is a
//! directory and is written to `index.html` inside it.

use crate::document::{Document, ParseErrorKind, MARKDOWN_EXTENSION};
use chrono::Datelike;
use std::path::{Component, Path, PathBuf};
use url::Url;

const INDEX_FILE: &str = "index.html";

/// The resolved location of a rendered page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permalink {
    /// The URL path of the page relative to the site root, always beginning
    /// with `/` (e.g., `/posts/hello.html` or `/about/`).
    url_path: String,

    /// The output file relative to the output directory (e.g.,
    /// `posts/hello.html` or `about/index.html`).
    output_path: PathBuf,
}

impl Permalink {
    /// Parses a permalink that has already had its placeholders expanded.
    pub fn parse(permalink: &str) -> Result<Permalink, ParseErrorKind> {
        let invalid = |reason| ParseErrorKind::InvalidPermalink {
            permalink: permalink.to_owned(),
            reason,
        };

        let segments: Vec<&str> = permalink.split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid("`.` and `..` segments are not allowed"));
        }
        if segments.iter().any(|s| s.contains('\\')) {
            return Err(invalid("backslashes are not allowed"));
        }

        let is_directory = match segments.last() {
            None => true,
            Some(last) => permalink.ends_with('/') || !last.contains('.'),
        };

        let joined = segments.join("/");
        let mut output_path: PathBuf = segments.iter().collect();
        let url_path = if is_directory {
            output_path.push(INDEX_FILE);
            match joined.is_empty() {
                true => String::from("/"),
                false => format!("/{}/", joined),
            }
        } else {
            format!("/{}", joined)
        };

        Ok(Permalink {
            url_path,
            output_path,
        })
    }

    /// Creates the permalink for a generated page (index and tag pages).
    pub fn directory(segments: &[&str]) -> Permalink {
        let mut output_path: PathBuf = segments.iter().collect();
        output_path.push(INDEX_FILE);
        let url_path = match segments.is_empty() {
            true => String::from("/"),
            false => format!("/{}/", segments.join("/")),
        };
        Permalink {
            url_path,
            output_path,
        }
    }

    /// Resolves a document's permalink. An explicit `permalink` front matter
    /// key wins over the site-wide `pattern`, which wins over the source
    /// path.
    pub fn resolve(document: &Document, pattern: Option<&str>) -> Result<Permalink, ParseErrorKind> {
        match document.front_matter.permalink.as_deref().or(pattern) {
            Some(pattern) => Permalink::parse(&expand(document, pattern)?),
            None => Ok(Permalink::from_source(&document.source)),
        }
    }

    /// `a/b.md` becomes `/a/b.html`; `a/index.md` becomes `/a/`.
    fn from_source(source: &Path) -> Permalink {
        let segments: Vec<String> = source
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        match segments.split_last() {
            Some((last, dirs)) if last == &format!("index.{}", MARKDOWN_EXTENSION) => {
                let dirs: Vec<&str> = dirs.iter().map(String::as_str).collect();
                Permalink::directory(&dirs)
            }
            Some((last, dirs)) => {
                let stem = Path::new(last)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| last.clone());
                let mut output_path: PathBuf = dirs.iter().collect();
                output_path.push(format!("{}.html", stem));
                let mut url_path = String::from("/");
                for dir in dirs {
                    url_path.push_str(dir);
                    url_path.push('/');
                }
                url_path.push_str(&stem);
                url_path.push_str(".html");
                Permalink {
                    url_path,
                    output_path,
                }
            }
            None => Permalink::directory(&[]),
        }
    }

    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The absolute URL of the page when the site has a `base_url`, or the
    /// root-relative URL path otherwise.
    pub fn url(&self, base_url: Option<&Url>) -> String {
        absolute_url(base_url, &self.url_path)
    }
}

/// Joins a root-relative `url_path` onto `base_url`.
pub fn absolute_url(base_url: Option<&Url>, url_path: &str) -> String {
    let relative = url_path.trim_start_matches('/');
    match base_url.map(|base| base.join(relative)) {
        Some(Ok(url)) => url.into(),
        _ => format!("/{}", relative),
    }
}

/// The `:slug` value for a document: the file stem, or the bundle directory
/// name for `index.md` files.
fn source_slug(source: &Path) -> String {
    let name = match source.file_stem() {
        Some(stem) if stem == "index" => source.parent().and_then(Path::file_name),
        stem => stem,
    };
    slug::slugify(name.map(|n| n.to_string_lossy()).unwrap_or_default())
}

fn expand(document: &Document, pattern: &str) -> Result<String, ParseErrorKind> {
    let mut expanded = pattern.to_owned();
    if expanded.contains(":year") || expanded.contains(":month") || expanded.contains(":day") {
        let date = document
            .front_matter
            .date
            .ok_or_else(|| ParseErrorKind::InvalidPermalink {
                permalink: pattern.to_owned(),
                reason: "date placeholders require a `date`",
            })?;
        expanded = expanded
            .replace(":year", &format!("{:04}", date.year()))
            .replace(":month", &format!("{:02}", date.month()))
            .replace(":day", &format!("{:02}", date.day()));
    }
    if expanded.contains(":slug") {
        expanded = expanded.replace(":slug", &source_slug(&document.source));
    }
    if expanded.contains(":title") {
        let title = match document.front_matter.title.is_empty() {
            true => source_slug(&document.source),
            false => slug::slugify(&document.front_matter.title),
        };
        expanded = expanded.replace(":title", &title);
    }
    Ok(expanded)
}
