//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: loading documents
//! ([`crate::document`]), resolving permalinks, rendering markdown
//! ([`crate::markdown`]), wrapping pages in layouts and building index pages
//! ([`crate::write`]), generating the Atom feed ([`crate::feed`]), and
//! writing everything (plus static assets) to the output directory.

use crate::config::{Config, Policy};
use crate::document::{Document, Loader, ParseError};
use crate::entry::{listing_order, Entry};
use crate::feed::{self, FeedConfig, FEED_FILE};
use crate::layout::{self, Layouts};
use crate::markdown::{Links, RenderWarning, Renderer};
use crate::permalink::{absolute_url, Permalink};
use crate::tag::{Tag, TagIndex};
use crate::write::{self, write_output, Asset, RenderedPage, Writer};
use gtmpl::Value;
use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A summary of a successful build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// The number of pages written (documents, index pages, and the feed).
    pub pages_written: usize,

    /// The number of files copied verbatim.
    pub assets_copied: usize,

    /// Documents that were not built, in source order.
    pub skipped: Vec<Skipped>,

    /// Non-fatal problems found while rendering, in source order.
    pub warnings: Vec<RenderWarning>,
}

impl fmt::Display for BuildReport {
    /// The summary printed after a build: the totals, then one line per
    /// skipped document and per warning.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "wrote {} pages and {} assets ({} skipped, {} warnings)",
            self.pages_written,
            self.assets_copied,
            self.skipped.len(),
            self.warnings.len(),
        )?;
        for skipped in &self.skipped {
            writeln!(f, "skipped {}: {}", skipped.path.display(), skipped.reason)?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        Ok(())
    }
}

/// A document left out of the build.
#[derive(Debug)]
pub struct Skipped {
    /// The document's path relative to the content directory.
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Why a document was left out of the build.
#[derive(Debug)]
pub enum SkipReason {
    /// The document is a draft and drafts weren't requested.
    Draft,

    /// The document failed and the build is lenient.
    Failed(Error),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SkipReason::Draft => f.write_str("draft"),
            SkipReason::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Builds the site described by a [`Config`] into
/// `config.output_directory`. Loading, rendering, and writing run on a
/// dedicated thread pool sized by `config.threads`.
pub fn build_site(config: &Config) -> Result<BuildReport> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()?;
    pool.install(|| Builder::new(config).build())
}

struct Builder<'a> {
    config: &'a Config,
    skipped: Vec<Skipped>,
}

impl<'a> Builder<'a> {
    fn new(config: &'a Config) -> Builder<'a> {
        Builder {
            config,
            skipped: Vec::new(),
        }
    }

    fn build(mut self) -> Result<BuildReport> {
        let config = self.config;
        let layouts = Layouts::load(&config.layouts_directory)?;
        info!(
            layouts = layouts.names().count(),
            directory = %config.layouts_directory.display(),
            "loaded layouts"
        );

        let documents = self.load(&layouts)?;
        check_permalinks(&documents)?;

        let mut entries = self.render(documents)?;
        entries.sort_by(listing_order);

        let writer = Writer {
            layouts: &layouts,
            site: self.site_value(),
            base_url: config.base_url.as_ref(),
            index_layout: &config.index_layout,
            tag_layout: &config.tag_layout,
            tags_layout: &config.tags_layout,
            index_page_size: config.index_page_size,
        };
        let mut pages = self.wrap(&writer, &mut entries)?;

        // Warnings are reported for the documents that made it into the
        // site, in source order.
        let mut sources: Vec<&Entry> = entries.iter().collect();
        sources.sort_by(|a, b| a.document.source.cmp(&b.document.source));
        let mut warnings: Vec<RenderWarning> = Vec::new();
        for entry in sources {
            for warning in &entry.rendered.warnings {
                warn!("{}", warning);
                warnings.push(warning.clone());
            }
        }

        let tags = TagIndex::fold(
            entries
                .iter()
                .enumerate()
                .map(|(i, entry)| (i, entry.tags.as_slice())),
        );
        info!(documents = entries.len(), tags = tags.len(), "rendered documents");
        pages.extend(writer.index_pages(&entries, &tags)?);

        if let Some(page) = self.feed_page(&entries)? {
            pages.push(page);
        }

        let assets = self.assets()?;
        check_output_paths(&pages, &assets)?;

        write_output(
            &config.output_directory,
            &[
                config.content_directory.as_path(),
                config.layouts_directory.as_path(),
                config.static_directory.as_path(),
            ],
            &pages,
            &assets,
        )?;

        let report = BuildReport {
            pages_written: pages.len(),
            assets_copied: assets.len(),
            skipped: self.skipped,
            warnings,
        };
        info!(
            pages = report.pages_written,
            assets = report.assets_copied,
            skipped = report.skipped.len(),
            warnings = report.warnings.len(),
            output = %config.output_directory.display(),
            "build finished"
        );
        Ok(report)
    }

    /// Loads and parses every document in parallel, then applies the failure
    /// policy in source order. Returns the documents to build, sorted by
    /// source path.
    fn load(&mut self, layouts: &Layouts) -> Result<Vec<(Document, Permalink)>> {
        let config = self.config;
        let mut sources = Loader::new(&config.content_directory)
            .sources()
            .collect::<std::result::Result<Vec<PathBuf>, ParseError>>()?;
        sources.sort();
        info!(
            documents = sources.len(),
            directory = %config.content_directory.display(),
            "found documents"
        );

        let loaded: Vec<(PathBuf, std::result::Result<(Document, Permalink), ParseError>)> =
            sources
                .into_par_iter()
                .map(|source| {
                    let result = Document::load(&config.content_directory, &source)
                        .and_then(|document| {
                            let permalink =
                                Permalink::resolve(&document, config.permalink.as_deref())
                                    .map_err(|kind| ParseError::new(&source, 1, kind))?;
                            Ok((document, permalink))
                        });
                    (source, result)
                })
                .collect();

        let mut documents = Vec::with_capacity(loaded.len());
        for (source, result) in loaded {
            match result {
                Err(err) => self.tolerate(source, Error::Parse(err))?,
                Ok((document, _)) if document.front_matter.draft && !config.drafts => {
                    debug!(source = %source.display(), "skipping draft");
                    self.skipped.push(Skipped {
                        path: source,
                        reason: SkipReason::Draft,
                    });
                }
                Ok((document, _)) if !layouts.contains(&document.front_matter.layout) => {
                    let layout = document.front_matter.layout;
                    self.tolerate(source.clone(), Error::MissingLayout { layout, path: source })?
                }
                Ok((document, permalink)) => {
                    debug!(
                        source = %source.display(),
                        permalink = permalink.url_path(),
                        "loaded document"
                    );
                    documents.push((document, permalink));
                }
            }
        }
        Ok(documents)
    }

    /// Renders every document's markdown in parallel. A document that fails
    /// to render is handled by the failure policy like any other failing
    /// document.
    fn render(&mut self, documents: Vec<(Document, Permalink)>) -> Result<Vec<Entry>> {
        let config = self.config;
        let base_url = config.base_url.as_ref();
        let renderer = Renderer::new(&config.render);
        let mut links = Links::new();
        for (document, permalink) in &documents {
            links.insert(&document.source, permalink.url(base_url));
        }

        let results: Vec<(PathBuf, Result<Entry>)> = documents
            .into_par_iter()
            .map(|(document, permalink)| {
                let source = document.source.clone();
                let url = permalink.url(base_url);
                let rendered = renderer.render(&document, &url, &links);
                let result = match rendered {
                    Ok(rendered) => {
                        debug!(
                            source = %source.display(),
                            warnings = rendered.warnings.len(),
                            "rendered document"
                        );
                        Ok(Entry {
                            tags: Tag::from_names(&document.front_matter.tags, base_url),
                            document,
                            permalink,
                            url,
                            rendered,
                        })
                    }
                    Err(err) => Err(Error::Io {
                        path: source.clone(),
                        err,
                    }),
                };
                (source, result)
            })
            .collect();
        self.settle(results)
    }

    /// Keeps the successful results, in order, applying the failure policy
    /// to the rest.
    fn settle<T>(&mut self, results: Vec<(PathBuf, Result<T>)>) -> Result<Vec<T>> {
        let mut kept = Vec::with_capacity(results.len());
        for (source, result) in results {
            match result {
                Ok(value) => kept.push(value),
                Err(err) => self.tolerate(source, err)?,
            }
        }
        Ok(kept)
    }

    /// Wraps every entry in its layout. In lenient mode, entries whose layout
    /// fails to execute are dropped and the remaining entries are wrapped
    /// again so that no page links to a dropped neighbor.
    fn wrap(&mut self, writer: &Writer, entries: &mut Vec<Entry>) -> Result<Vec<RenderedPage>> {
        loop {
            let results = writer.entry_pages(entries.as_slice());
            let failed: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, result)| result.is_err())
                .map(|(i, _)| i)
                .collect();
            if failed.is_empty() {
                return Ok(results.into_iter().collect::<layout::Result<Vec<_>>>()?);
            }

            let mut errors: Vec<(PathBuf, layout::Error)> = results
                .into_iter()
                .zip(entries.iter())
                .filter_map(|(result, entry)| {
                    result.err().map(|err| (entry.document.source.clone(), err))
                })
                .collect();
            errors.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (source, err) in errors {
                self.tolerate(source, Error::Template(err))?;
            }
            for i in failed.into_iter().rev() {
                entries.remove(i);
            }
        }
    }

    /// Aborts with `err` in strict mode. In lenient mode, records the
    /// document as skipped and carries on.
    fn tolerate(&mut self, path: PathBuf, err: Error) -> Result<()> {
        match self.config.policy {
            Policy::Strict => Err(err),
            Policy::Lenient => {
                warn!(source = %path.display(), "skipping document: {}", err);
                self.skipped.push(Skipped {
                    path,
                    reason: SkipReason::Failed(err),
                });
                Ok(())
            }
        }
    }

    fn feed_url(&self) -> Option<String> {
        match (&self.config.base_url, self.config.feed) {
            (Some(base_url), true) => Some(absolute_url(Some(base_url), FEED_FILE)),
            _ => None,
        }
    }

    fn feed_page(&self, entries: &[Entry]) -> Result<Option<RenderedPage>> {
        let (base_url, feed_url) = match (&self.config.base_url, self.feed_url()) {
            (Some(base_url), Some(feed_url)) => (base_url, feed_url),
            _ => return Ok(None),
        };
        let bytes = feed::write_feed(
            &FeedConfig {
                title: &self.config.title,
                id: base_url.as_str(),
                author: self.config.author.as_ref(),
                home_page: base_url.as_str(),
                feed_url: &feed_url,
                size: self.config.feed_size,
            },
            entries,
        )?;
        Ok(Some(RenderedPage {
            path: PathBuf::from(FEED_FILE),
            bytes,
            origin: String::from("feed"),
        }))
    }

    /// The `site` value shared by every layout: `title`, `base_url`,
    /// `author`, and `feed_url`.
    fn site_value(&self) -> Value {
        let config = self.config;
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(config.title.clone()));
        m.insert(
            "base_url".to_owned(),
            match &config.base_url {
                Some(url) => Value::String(url.to_string()),
                None => Value::String(String::from("/")),
            },
        );
        m.insert(
            "author".to_owned(),
            match &config.author {
                Some(author) => {
                    let mut a: HashMap<String, Value> = HashMap::new();
                    a.insert("name".to_owned(), Value::String(author.name.clone()));
                    a.insert(
                        "email".to_owned(),
                        match &author.email {
                            Some(email) => Value::String(email.clone()),
                            None => Value::Nil,
                        },
                    );
                    Value::Object(a)
                }
                None => Value::Nil,
            },
        );
        m.insert(
            "feed_url".to_owned(),
            match self.feed_url() {
                Some(url) => Value::String(url),
                None => Value::Nil,
            },
        );
        Value::Object(m)
    }

    /// The static directory's files, copied to the output root, followed by
    /// the content directory's bundled files, copied next to their
    /// documents.
    fn assets(&self) -> Result<Vec<Asset>> {
        let config = self.config;
        let mut assets = Vec::new();

        if config.static_directory.is_dir() {
            for entry in WalkDir::new(&config.static_directory).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry
                    .path()
                    .strip_prefix(&config.static_directory)
                    .unwrap_or(entry.path())
                    .to_owned();
                assets.push(Asset {
                    source: entry.path().to_owned(),
                    path,
                });
            }
        }

        for path in Loader::new(&config.content_directory).assets() {
            let path = path?;
            assets.push(Asset {
                source: config.content_directory.join(&path),
                path,
            });
        }
        Ok(assets)
    }
}

/// Fails if two documents resolve to the same output file. `documents` must
/// be sorted by source path so the reported pair doesn't depend on the order
/// documents were processed in.
fn check_permalinks(documents: &[(Document, Permalink)]) -> Result<()> {
    let mut seen: BTreeMap<&Path, &Path> = BTreeMap::new();
    for (document, permalink) in documents {
        if let Some(first) = seen.insert(permalink.output_path(), document.source.as_path()) {
            return Err(Error::DuplicatePermalink {
                permalink: permalink.url_path().to_owned(),
                first: first.display().to_string(),
                second: document.source.display().to_string(),
            });
        }
    }
    Ok(())
}

/// Fails if two outputs (pages or assets) would be written to the same
/// file, e.g. a document whose permalink is `/index.html` alongside the main
/// index.
fn check_output_paths(pages: &[RenderedPage], assets: &[Asset]) -> Result<()> {
    let mut seen: HashMap<&Path, String> = HashMap::new();
    let outputs = pages
        .iter()
        .map(|page| (page.path.as_path(), page.origin.clone()))
        .chain(
            assets
                .iter()
                .map(|asset| (asset.path.as_path(), asset.source.display().to_string())),
        );
    for (path, origin) in outputs {
        if let Some(first) = seen.insert(path, origin.clone()) {
            return Err(Error::DuplicatePermalink {
                permalink: format!("/{}", path.display()),
                first,
                second: origin,
            });
        }
    }
    Ok(())
}

/// The result of building a site.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a document can't be loaded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Returned when a document names a layout that doesn't exist.
    #[error("{}: layout `{layout}` is not defined", path.display())]
    MissingLayout { layout: String, path: PathBuf },

    /// Returned when two outputs resolve to the same location. Always fatal.
    #[error("`{first}` and `{second}` both resolve to `{permalink}`")]
    DuplicatePermalink {
        permalink: String,
        first: String,
        second: String,
    },

    /// Returned for errors loading or executing layouts.
    #[error(transparent)]
    Template(#[from] layout::Error),

    /// Returned for errors writing the output directory.
    #[error(transparent)]
    Write(#[from] write::Error),

    /// Returned for errors writing the feed.
    #[error(transparent)]
    Feed(#[from] feed::Error),

    /// Returned for I/O problems rendering a document.
    #[error("{}: {err}", path.display())]
    Io { path: PathBuf, err: std::io::Error },

    /// Returned for problems walking the static or content directories.
    #[error("walking directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Returned when the worker pool can't be started.
    #[error("starting worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}
