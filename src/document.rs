//! Defines the [`Document`], [`FrontMatter`], [`Loader`], and [`ParseError`]
//! types. Documents are markdown source files that begin with a YAML front
//! matter block:
//!
//! ```md
//! ---
//! layout: post
//! title: Hello, world!
//! date: 2021-04-16
//! tags: [greet]
//! ---
//! # Hello
//!
//! World
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// The extension of document source files.
pub const MARKDOWN_EXTENSION: &str = "md";

const FENCE: &str = "---";
const END_FENCE: &str = "...";

/// A parsed source file. Documents are immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// The path of the source file relative to the content directory. This
    /// uniquely identifies the document within a build.
    pub source: PathBuf,

    pub front_matter: FrontMatter,

    /// The raw markdown following the front matter.
    pub body: String,
}

/// The recognized front matter keys. Keys not listed here are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrontMatter {
    /// The name of the layout the rendered body is wrapped in.
    pub layout: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    /// An explicit permalink, possibly containing placeholders. See
    /// [`crate::permalink`].
    pub permalink: Option<String>,
    pub tags: Vec<String>,
    /// Drafts are only built when the site enables them.
    pub draft: bool,
    /// Overrides the summary derived from the `<!-- more -->` fold.
    pub summary: Option<String>,
}

#[derive(Deserialize)]
struct RawFrontMatter {
    #[serde(default)]
    layout: Option<String>,

    #[serde(default)]
    title: Option<String>,

    #[serde(default)]
    date: Option<String>,

    #[serde(default)]
    permalink: Option<String>,

    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,

    #[serde(default)]
    draft: bool,

    #[serde(default)]
    summary: Option<String>,
}

/// Tags may be written as a YAML sequence (`[a, b]`) or a comma-separated
/// string (`a, b`).
fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Tags>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Tags::List(tags)) => tags,
        Some(Tags::Text(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect(),
    })
}

/// Parses a `YYYY-MM-DD` date, also accepting date-times (`2021-04-16
/// 10:00:00 +0200`, `2021-04-16T10:00:00Z`) whose time part is dropped.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let (date, rest) = match s.char_indices().nth(10) {
        Some((i, _)) => s.split_at(i),
        None => (s, ""),
    };
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T')) {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

impl Document {
    /// Reads and parses the document at `content_directory/source`.
    pub fn load(content_directory: &Path, source: &Path) -> Result<Document> {
        let input = std::fs::read_to_string(content_directory.join(source))
            .map_err(|err| ParseError::new(source, 1, ParseErrorKind::Io(err)))?;
        Document::parse(source, &input)
    }

    /// Parses a document from its `source` path (relative to the content
    /// directory) and file contents.
    pub fn parse(source: &Path, input: &str) -> Result<Document> {
        let split = split_front_matter(input)
            .map_err(|(line, kind)| ParseError::new(source, line, kind))?;
        let front_matter = parse_front_matter(split.yaml)
            .map_err(|(line, kind)| ParseError::new(source, line, kind))?;
        Ok(Document {
            source: source.to_owned(),
            front_matter,
            body: split.body.to_owned(),
        })
    }

    /// The document's dated-ness decides whether it's listed on the main
    /// index and in the feed.
    pub fn is_dated(&self) -> bool {
        self.front_matter.date.is_some()
    }
}

struct Split<'a> {
    yaml: &'a str,
    body: &'a str,
}

/// Finds the front matter block. Errors carry the 1-based line to report.
fn split_front_matter(input: &str) -> std::result::Result<Split, (usize, ParseErrorKind)> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lines = input.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == FENCE => {
            let yaml_start = first.len();
            let mut offset = yaml_start;
            for line in lines {
                let trimmed = line.trim_end();
                if trimmed == FENCE || trimmed == END_FENCE {
                    return Ok(Split {
                        yaml: &input[yaml_start..offset],
                        body: &input[offset + line.len()..],
                    });
                }
                offset += line.len();
            }
            Err((1, ParseErrorKind::UnterminatedFrontMatter))
        }
        _ => Err((1, ParseErrorKind::MissingFrontMatter)),
    }
}

fn parse_front_matter(yaml: &str) -> std::result::Result<FrontMatter, (usize, ParseErrorKind)> {
    if yaml.trim().is_empty() {
        return Err((1, ParseErrorKind::MissingLayoutKey));
    }

    let raw: RawFrontMatter = serde_yaml::from_str(yaml).map_err(|err| {
        // The block starts on the line after the opening fence.
        let line = err.location().map_or(1, |l| l.line() + 1);
        (line, ParseErrorKind::Yaml(err))
    })?;

    let layout = match raw.layout {
        Some(layout) if !layout.trim().is_empty() => layout.trim().to_owned(),
        _ => return Err((key_line(yaml, "layout"), ParseErrorKind::MissingLayoutKey)),
    };

    let date = match raw.date {
        None => None,
        Some(date) => match parse_date(&date) {
            Some(date) => Some(date),
            None => return Err((key_line(yaml, "date"), ParseErrorKind::InvalidDate(date))),
        },
    };

    Ok(FrontMatter {
        layout,
        title: raw.title.unwrap_or_default(),
        date,
        permalink: raw.permalink,
        tags: raw.tags,
        draft: raw.draft,
        summary: raw.summary,
    })
}

/// Reads documents from a content directory.
pub struct Loader<'a> {
    content_directory: &'a Path,
}

impl<'a> Loader<'a> {
    pub fn new(content_directory: &'a Path) -> Loader<'a> {
        Loader { content_directory }
    }

    /// The paths (relative to the content directory) of every document,
    /// sorted by file name within each directory. Hidden files and
    /// directories are skipped.
    pub fn sources(&self) -> impl Iterator<Item = Result<PathBuf>> + 'a {
        let root = self.content_directory;
        self.walk().filter_map(move |result| match result {
            Err(err) => Some(Err(walk_error(root, err))),
            Ok(entry) if is_document(&entry) => Some(Ok(relative(root, entry.path()))),
            Ok(_) => None,
        })
    }

    /// Lazily loads every document in the content directory. Each call walks
    /// the directory afresh.
    pub fn documents(&self) -> impl Iterator<Item = Result<Document>> + 'a {
        let root = self.content_directory;
        self.sources()
            .map(move |source| source.and_then(|source| Document::load(root, &source)))
    }

    /// Every non-document file in the content directory (e.g., images that
    /// live next to the post that uses them), relative to the content
    /// directory.
    pub fn assets(&self) -> impl Iterator<Item = walkdir::Result<PathBuf>> + 'a {
        let root = self.content_directory;
        self.walk().filter_map(move |result| match result {
            Err(err) => Some(Err(err)),
            Ok(entry) if entry.file_type().is_file() && !is_document(&entry) => {
                Some(Ok(relative(root, entry.path())))
            }
            Ok(_) => None,
        })
    }

    fn walk(&self) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
        WalkDir::new(self.content_directory)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_document(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry.path().extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION)
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    // every walked path is beneath the root
    path.strip_prefix(root).unwrap_or(path).to_owned()
}

fn walk_error(root: &Path, err: walkdir::Error) -> ParseError {
    let path = err.path().map_or_else(|| root.to_owned(), |p| relative(root, p));
    ParseError::new(&path, 1, ParseErrorKind::Io(err.into()))
}

/// The 1-based file line of the top-level `key` in a front matter block, or
/// the opening fence's line if the key isn't there.
fn key_line(yaml: &str, key: &str) -> usize {
    yaml.lines()
        .position(|line| {
            line.strip_prefix(key)
                .map_or(false, |rest| rest.trim_start().starts_with(':'))
        })
        // +1 for 1-based lines, +1 for the opening fence.
        .map_or(1, |i| i + 2)
}

/// The result of parsing a [`Document`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// A document that couldn't be loaded, with the source path and the 1-based
/// line of the problem.
#[derive(Debug, Error)]
#[error("{}:{line}: {kind}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(path: &Path, line: usize, kind: ParseErrorKind) -> ParseError {
        ParseError {
            path: path.to_owned(),
            line,
            kind,
        }
    }
}

/// What went wrong parsing a [`Document`].
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// Returned when the file doesn't begin with a `---` line.
    #[error("document must begin with a `---` front matter fence")]
    MissingFrontMatter,

    /// Returned when the opening `---` has no matching closing line.
    #[error("front matter is never closed with `---`")]
    UnterminatedFrontMatter,

    /// Returned when the front matter isn't valid YAML or a recognized key
    /// has the wrong type.
    #[error("invalid front matter: {0}")]
    Yaml(serde_yaml::Error),

    /// Returned when the front matter has no `layout` key.
    #[error("front matter is missing the required `layout` key")]
    MissingLayoutKey,

    /// Returned when `date` isn't a `YYYY-MM-DD` date.
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Returned when a permalink can't be turned into an output path.
    #[error("invalid permalink `{permalink}`: {reason}")]
    InvalidPermalink {
        permalink: String,
        reason: &'static str,
    },

    /// Returned when the file can't be read.
    #[error("{0}")]
    Io(std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(input: &str) -> Result<Document> {
        Document::parse(Path::new("posts/hello.md"), input)
    }

    #[test]
    fn test_parse_document() -> Result<()> {
        let doc = parse(
            "---\nlayout: post\ntitle: \"Hello\"\ndate: 2023-01-01\ntags: [a, b]\n---\n# Hi\n",
        )?;
        assert_eq!(
            FrontMatter {
                layout: "post".to_owned(),
                title: "Hello".to_owned(),
                date: NaiveDate::from_ymd_opt(2023, 1, 1),
                permalink: None,
                tags: vec!["a".to_owned(), "b".to_owned()],
                draft: false,
                summary: None,
            },
            doc.front_matter
        );
        assert_eq!("# Hi\n", doc.body);
        assert_eq!(PathBuf::from("posts/hello.md"), doc.source);
        Ok(())
    }

    #[test]
    fn test_unknown_keys_ignored() -> Result<()> {
        let doc = parse("---\nlayout: page\ncomments: true\n---\nbody")?;
        assert_eq!("page", doc.front_matter.layout);
        assert_eq!("body", doc.body);
        Ok(())
    }

    #[test]
    fn test_tags_as_string() -> Result<()> {
        let doc = parse("---\nlayout: post\ntags: go, unsafe \n---\n")?;
        assert_eq!(vec!["go", "unsafe"], doc.front_matter.tags);
        Ok(())
    }

    #[test]
    fn test_date_time_keeps_date() -> Result<()> {
        let doc = parse("---\nlayout: post\ndate: 2020-05-06 10:00:00 +0200\n---\n")?;
        assert_eq!(NaiveDate::from_ymd_opt(2020, 5, 6), doc.front_matter.date);
        Ok(())
    }

    #[test]
    fn test_crlf_and_bom() -> Result<()> {
        let doc = parse("\u{feff}---\r\nlayout: post\r\n---\r\nbody\r\n")?;
        assert_eq!("post", doc.front_matter.layout);
        assert_eq!("body\r\n", doc.body);
        Ok(())
    }

    #[test]
    fn test_missing_front_matter() {
        let err = parse("# Hi\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingFrontMatter));
        assert_eq!(1, err.line);
        assert_eq!(PathBuf::from("posts/hello.md"), err.path);
    }

    #[test]
    fn test_empty_front_matter_is_an_error() {
        let err = parse("---\n---\n# Hi\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingLayoutKey));
    }

    #[test]
    fn test_unterminated_front_matter() {
        let err = parse("---\nlayout: post\n# Hi\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnterminatedFrontMatter));
    }

    #[test]
    fn test_missing_layout() {
        let err = parse("---\ntitle: Hi\n---\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingLayoutKey));
        assert_eq!(1, err.line);

        let err = parse("---\ntitle: Hi\nlayout: \"\"\n---\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingLayoutKey));
        assert_eq!(3, err.line);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = parse("---\nlayout: post\ntags: [a, b\n---\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Yaml(_)));
        assert!(err.line > 1);
    }

    #[test]
    fn test_invalid_date() {
        let err = parse("---\nlayout: post\ndate: yesterday\n---\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidDate(_)));
        assert_eq!(3, err.line);
    }

    #[test]
    fn test_fence_must_be_whole_line() {
        let err = parse("---\nlayout: post\ntitle: a --- b\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnterminatedFrontMatter));
    }

    #[test]
    fn test_loader_walks_content() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("posts/bundle")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("about.md"), "---\nlayout: page\n---\n").unwrap();
        std::fs::write(root.join("posts/bundle/index.md"), "---\nlayout: post\n---\n").unwrap();
        std::fs::write(root.join("posts/bundle/image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join(".git/config.md"), "not a document").unwrap();

        let loader = Loader::new(root);
        let docs = loader.documents().collect::<Result<Vec<_>>>()?;
        let sources: Vec<_> = docs.iter().map(|d| d.source.clone()).collect();
        assert_eq!(
            vec![PathBuf::from("about.md"), PathBuf::from("posts/bundle/index.md")],
            sources
        );

        let assets = loader.assets().collect::<walkdir::Result<Vec<_>>>().unwrap();
        assert_eq!(vec![PathBuf::from("posts/bundle/image.png")], assets);
        Ok(())
    }
}
