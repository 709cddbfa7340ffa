//! Defines the [`Config`] type which holds the resolved settings for a build.
//! A site is a directory holding an optional `quill.yaml` project file plus
//! the `content`, `layouts`, and `static` directories (each of which may be
//! relocated by the project file).

use crate::markdown::RenderOptions;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The name of the project file looked up in the site root.
pub const PROJECT_FILE: &str = "quill.yaml";

#[derive(Deserialize)]
struct PageSize(usize);

impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

#[derive(Deserialize)]
struct FeedSize(usize);

impl Default for FeedSize {
    fn default() -> Self {
        FeedSize(20)
    }
}

/// The on-disk shape of `quill.yaml`. Every key is optional, but unknown keys
/// are rejected so that typos don't silently fall back to defaults.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct Project {
    #[serde(default)]
    title: String,

    #[serde(default)]
    base_url: Option<Url>,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default)]
    content_directory: Option<PathBuf>,

    #[serde(default)]
    layouts_directory: Option<PathBuf>,

    #[serde(default)]
    static_directory: Option<PathBuf>,

    #[serde(default)]
    index_layout: Option<String>,

    #[serde(default)]
    tag_layout: Option<String>,

    #[serde(default)]
    tags_layout: Option<String>,

    #[serde(default)]
    index_page_size: PageSize,

    #[serde(default)]
    permalink: Option<String>,

    #[serde(default)]
    policy: Policy,

    #[serde(default)]
    threads: Option<usize>,

    #[serde(default)]
    drafts: bool,

    #[serde(default)]
    feed: Option<bool>,

    #[serde(default)]
    feed_size: FeedSize,

    #[serde(default)]
    languages: Vec<String>,

    #[serde(default)]
    heading_offset: u32,
}

/// The author of the site, used in the Atom feed and exposed to layouts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

/// What to do with a document that fails to parse or references a layout
/// that doesn't exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Abort the whole build on the first failing document.
    #[default]
    Strict,

    /// Skip the failing document, keep building, and list it in the build
    /// report.
    Lenient,
}

/// The fully-resolved build configuration. All directories are absolute or
/// relative to the working directory (never relative to the project file).
#[derive(Clone, Debug)]
pub struct Config {
    /// The site's title.
    pub title: String,

    /// The public root of the site, always ending in `/`. When absent, URLs
    /// are rendered root-relative (`/posts/foo.html`) and no feed is written.
    pub base_url: Option<Url>,

    pub author: Option<Author>,

    /// The directory holding markdown documents and their bundled assets.
    pub content_directory: PathBuf,

    /// The directory holding layout templates (`<name>.html`) and partials
    /// (`partials/*.html`).
    pub layouts_directory: PathBuf,

    /// The directory whose contents are copied verbatim to the output root.
    pub static_directory: PathBuf,

    /// The directory the site is written to. Any existing tree is replaced.
    pub output_directory: PathBuf,

    /// The layout for the paginated main index. The index is skipped when
    /// this layout doesn't exist.
    pub index_layout: String,

    /// The layout for the paginated per-tag indices.
    pub tag_layout: String,

    /// The layout for the page listing every tag.
    pub tags_layout: String,

    /// The number of documents per index page.
    pub index_page_size: usize,

    /// The permalink pattern for documents without a `permalink` key.
    pub permalink: Option<String>,

    pub policy: Policy,

    /// The size of the worker pool. `None` uses one worker per CPU.
    pub threads: Option<usize>,

    /// Whether documents marked `draft: true` are built.
    pub drafts: bool,

    /// Whether the Atom feed is written (requires `base_url`).
    pub feed: bool,

    /// The number of documents in the Atom feed.
    pub feed_size: usize,

    pub render: RenderOptions,
}

impl Config {
    /// Loads the configuration for the site rooted at `root`. The project
    /// file is optional; a site without one uses the defaults.
    pub fn from_directory(root: &Path, output_directory: &Path) -> Result<Config> {
        let path = root.join(PROJECT_FILE);
        if path.is_file() {
            Config::from_project_file(&path, output_directory)
        } else {
            Config::from_project(root, Project::default(), output_directory)
        }
    }

    /// Loads the configuration from a specific project file. Relative
    /// directories in the file are resolved against the file's directory.
    pub fn from_project_file(path: &Path, output_directory: &Path) -> Result<Config> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project = serde_yaml::from_reader(file).map_err(|err| Error::Deserialize {
            path: path.to_owned(),
            err,
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Config::from_project(root, project, output_directory)
    }

    fn from_project(root: &Path, project: Project, output_directory: &Path) -> Result<Config> {
        if project.index_page_size.0 < 1 {
            return Err(Error::Invalid("`index_page_size` must be at least 1"));
        }

        let base_url = match project.base_url {
            Some(url) if url.cannot_be_a_base() => {
                return Err(Error::Invalid("`base_url` must be a hierarchical URL"));
            }
            Some(mut url) => {
                // `Url::join` drops the last path segment unless the base
                // ends in a slash.
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Some(url)
            }
            None => None,
        };

        let dir = |configured: Option<PathBuf>, default: &str| match configured {
            Some(dir) => root.join(dir),
            None => root.join(default),
        };

        Ok(Config {
            title: project.title,
            base_url,
            author: project.author,
            content_directory: dir(project.content_directory, "content"),
            layouts_directory: dir(project.layouts_directory, "layouts"),
            static_directory: dir(project.static_directory, "static"),
            output_directory: output_directory.to_owned(),
            index_layout: project.index_layout.unwrap_or_else(|| "index".to_owned()),
            tag_layout: project.tag_layout.unwrap_or_else(|| "tag".to_owned()),
            tags_layout: project.tags_layout.unwrap_or_else(|| "tags".to_owned()),
            index_page_size: project.index_page_size.0,
            permalink: project.permalink,
            policy: project.policy,
            threads: project.threads,
            drafts: project.drafts,
            feed: project.feed.unwrap_or(true),
            feed_size: project.feed_size.0,
            render: RenderOptions {
                languages: project.languages,
                heading_offset: project.heading_offset,
            },
        })
    }
}

/// The result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading the project file.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the project file exists but can't be opened.
    #[error("opening project file `{}`: {err}", path.display())]
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when the project file isn't valid YAML or has unknown or
    /// mistyped keys.
    #[error("parsing project file `{}`: {err}", path.display())]
    Deserialize {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    /// Returned when a setting is out of range.
    #[error("invalid project file: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod test {
    use super::*;

    fn project(yaml: &str) -> Project {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::from_project(Path::new("site"), Project::default(), Path::new("out"))?;
        assert_eq!(PathBuf::from("site/content"), config.content_directory);
        assert_eq!(PathBuf::from("site/layouts"), config.layouts_directory);
        assert_eq!(PathBuf::from("site/static"), config.static_directory);
        assert_eq!(10, config.index_page_size);
        assert_eq!(Policy::Strict, config.policy);
        assert_eq!("index", config.index_layout);
        assert!(config.base_url.is_none());
        Ok(())
    }

    #[test]
    fn test_base_url_gets_trailing_slash() -> Result<()> {
        let config = Config::from_project(
            Path::new("."),
            project("base_url: https://example.org/blog"),
            Path::new("out"),
        )?;
        assert_eq!(
            "https://example.org/blog/",
            config.base_url.unwrap().as_str()
        );
        Ok(())
    }

    #[test]
    fn test_policy_and_overrides() -> Result<()> {
        let config = Config::from_project(
            Path::new("."),
            project("policy: lenient\ncontent_directory: posts\nindex_page_size: 3\nlanguages: [zig]"),
            Path::new("out"),
        )?;
        assert_eq!(Policy::Lenient, config.policy);
        assert_eq!(PathBuf::from("./posts"), config.content_directory);
        assert_eq!(3, config.index_page_size);
        assert_eq!(vec!["zig".to_owned()], config.render.languages);
        Ok(())
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(serde_yaml::from_str::<Project>("titel: oops").is_err());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = Config::from_project(
            Path::new("."),
            project("index_page_size: 0"),
            Path::new("out"),
        );
        assert!(matches!(result, Err(Error::Invalid(_))));
    }
}
