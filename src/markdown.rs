//! Converts a [`Document`]'s markdown body into an HTML fragment. Rendering
//! is pure: the same document, URL, and [`Links`] always produce the same
//! bytes. Problems that shouldn't stop a build (footnotes without a
//! definition, links to documents that don't exist) are returned as
//! [`RenderWarning`]s alongside the fragment.

use crate::document::{Document, MARKDOWN_EXTENSION};
use crate::htmlrenderer::HtmlRenderer;
use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Everything before this marker is the document's summary.
pub const FOLD: &str = "<!-- more -->";

/// Languages that get a `language-*` class on fenced code blocks without any
/// configuration.
const KNOWN_LANGUAGES: &[&str] = &[
    "asm", "bash", "c", "c++", "clojure", "cpp", "csharp", "css", "diff", "dockerfile", "elixir",
    "erlang", "go", "golang", "haskell", "html", "ini", "java", "javascript", "js", "json",
    "kotlin", "lisp", "lua", "make", "makefile", "markdown", "md", "nix", "ocaml", "perl", "php",
    "python", "py", "ruby", "rust", "scala", "scheme", "sh", "shell", "sql", "swift", "text",
    "toml", "ts", "typescript", "xml", "yaml", "yml", "zig",
];

/// Renderer settings taken from the site configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Extra fenced code block languages to recognize.
    pub languages: Vec<String>,

    /// Added to every heading level (clamped to `h6`), e.g. so a post's `#`
    /// headings sit below the page title.
    pub heading_offset: u32,
}

/// The output of rendering a single document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub warnings: Vec<RenderWarning>,
}

impl Rendered {
    /// Returns the fragment up to the fold marker and whether the fragment
    /// was actually folded.
    pub fn summary(&self) -> (&str, bool) {
        match self.html.find(FOLD) {
            Some(i) => (&self.html[..i], true),
            None => (&self.html, false),
        }
    }
}

/// A non-fatal problem found while rendering a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderWarning {
    /// A footnote marker (`[^name]`) with no matching definition.
    UnresolvedFootnote { path: PathBuf, marker: String },

    /// A relative link to a markdown file that isn't a document in this
    /// build.
    BrokenLink { path: PathBuf, target: String },
}

impl RenderWarning {
    /// The source path of the document the warning is about.
    pub fn path(&self) -> &Path {
        match self {
            RenderWarning::UnresolvedFootnote { path, .. } => path,
            RenderWarning::BrokenLink { path, .. } => path,
        }
    }
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderWarning::UnresolvedFootnote { path, marker } => write!(
                f,
                "{}: footnote `[^{}]` has no definition",
                path.display(),
                marker
            ),
            RenderWarning::BrokenLink { path, target } => write!(
                f,
                "{}: link target `{}` is not a document",
                path.display(),
                target
            ),
        }
    }
}

/// Maps document source paths to their URLs so that links between documents
/// (`[see also](../other.md)`) can be rewritten to the rendered pages.
#[derive(Clone, Debug, Default)]
pub struct Links {
    urls: HashMap<String, String>,
}

/// Where a link in a document points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    /// Not a relative link to a markdown file; left alone.
    External,

    /// A link to another document, rewritten to its URL.
    Internal(String),

    /// A relative link to a markdown file that isn't a document.
    Broken,
}

impl Links {
    pub fn new() -> Links {
        Links::default()
    }

    pub fn insert(&mut self, source: &Path, url: String) {
        self.urls.insert(source_key(source), url);
    }

    /// Resolves `href`, written in the document at `from`.
    pub fn resolve(&self, from: &Path, href: &str) -> LinkTarget {
        if href.starts_with('/') || href.starts_with('#') || has_scheme(href) {
            return LinkTarget::External;
        }

        let (path, fragment) = match href.find('#') {
            Some(i) => href.split_at(i),
            None => (href, ""),
        };
        let is_markdown = Path::new(path)
            .extension()
            .map_or(false, |ext| ext == MARKDOWN_EXTENSION);
        if !is_markdown || path.contains('?') {
            return LinkTarget::External;
        }

        let mut segments: Vec<&str> = Vec::new();
        if let Some(dir) = from.parent() {
            for component in dir.components() {
                if let Component::Normal(s) = component {
                    match s.to_str() {
                        Some(s) => segments.push(s),
                        None => return LinkTarget::Broken,
                    }
                }
            }
        }
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return LinkTarget::Broken;
                    }
                }
                s => segments.push(s),
            }
        }

        match self.urls.get(&segments.join("/")) {
            Some(url) => LinkTarget::Internal(format!("{}{}", url, fragment)),
            None => LinkTarget::Broken,
        }
    }
}

/// `a/b.md` regardless of platform separators.
fn source_key(source: &Path) -> String {
    source
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn has_scheme(href: &str) -> bool {
    match href.find(':') {
        Some(i) if i > 0 => {
            let scheme = &href[..i];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        _ => false,
    }
}

/// Renders documents with a fixed set of [`RenderOptions`].
pub struct Renderer {
    languages: HashSet<String>,
    heading_offset: u32,
}

impl Renderer {
    pub fn new(options: &RenderOptions) -> Renderer {
        Renderer {
            languages: KNOWN_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .chain(options.languages.iter().map(|l| l.to_ascii_lowercase()))
                .collect(),
            heading_offset: options.heading_offset,
        }
    }

    /// Renders `document`'s body. `url` is the document's own URL, used to
    /// prefix footnote links; `links` resolves links to other documents.
    pub fn render(&self, document: &Document, url: &str, links: &Links) -> io::Result<Rendered> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut event_converter = EventConverter {
            links,
            source: &document.source,
            heading_offset: self.heading_offset,
            broken: Vec::new(),
        };
        let events: Vec<Event> = Parser::new_ext(&document.body, options)
            .map(|ev| event_converter.convert(ev))
            .collect();

        let defined: HashSet<String> = events
            .iter()
            .filter_map(|ev| match ev {
                Event::Start(Tag::FootnoteDefinition(name)) => Some(name.to_string()),
                _ => None,
            })
            .collect();

        let mut html_renderer = HtmlRenderer::new(&self.languages, url, defined);
        for ev in events {
            html_renderer.on_event(ev)?;
        }
        let (html, unresolved) = html_renderer.finish()?;

        let warnings = unresolved
            .into_iter()
            .map(|marker| RenderWarning::UnresolvedFootnote {
                path: document.source.clone(),
                marker,
            })
            .chain(event_converter.broken.into_iter().map(|target| {
                RenderWarning::BrokenLink {
                    path: document.source.clone(),
                    target,
                }
            }))
            .collect();

        Ok(Rendered { html, warnings })
    }
}

struct EventConverter<'a> {
    links: &'a Links,
    source: &'a Path,
    heading_offset: u32,

    /// Link targets that look like documents but aren't.
    broken: Vec<String>,
}

impl<'a> EventConverter<'a> {
    fn convert_heading(&self, level: u32) -> u32 {
        level.saturating_add(self.heading_offset).min(6)
    }

    fn convert<'b>(&mut self, ev: Event<'b>) -> Event<'b> {
        match ev {
            Event::Start(Tag::Heading(level)) => Event::Start(Tag::Heading(self.convert_heading(level))),
            Event::End(Tag::Heading(level)) => Event::End(Tag::Heading(self.convert_heading(level))),

            // Links between documents are written against the source tree
            // (`other.md`) and need to point at the rendered page instead.
            Event::Start(Tag::Link(link_type, url, title)) if link_type != LinkType::Email => {
                let url = match self.links.resolve(self.source, &url) {
                    LinkTarget::Internal(resolved) => CowStr::Boxed(resolved.into_boxed_str()),
                    LinkTarget::Broken => {
                        if !self.broken.iter().any(|b| b.as_str() == &*url) {
                            self.broken.push(url.to_string());
                        }
                        url
                    }
                    LinkTarget::External => url,
                };
                Event::Start(Tag::Link(link_type, url, title))
            }
            _ => ev,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::FrontMatter;

    fn document(source: &str, body: &str) -> Document {
        Document {
            source: PathBuf::from(source),
            front_matter: FrontMatter {
                layout: "post".to_owned(),
                ..FrontMatter::default()
            },
            body: body.to_owned(),
        }
    }

    fn render_with(options: &RenderOptions, body: &str) -> Rendered {
        Renderer::new(options)
            .render(&document("posts/a.md", body), "/posts/a.html", &Links::new())
            .unwrap()
    }

    fn render(body: &str) -> Rendered {
        render_with(&RenderOptions::default(), body)
    }

    #[test]
    fn test_heading() {
        assert_eq!("<h1>Hi</h1>", render("# Hi").html);
    }

    #[test]
    fn test_heading_offset() {
        let options = RenderOptions {
            heading_offset: 2,
            ..RenderOptions::default()
        };
        assert_eq!("<h3>Hi</h3><h6>Lo</h6>", render_with(&options, "# Hi\n\n##### Lo").html);

        let options = RenderOptions {
            heading_offset: u32::MAX,
            ..RenderOptions::default()
        };
        assert_eq!("<h6>Hi</h6>", render_with(&options, "# Hi").html);
    }

    #[test]
    fn test_emphasis_and_links() {
        assert_eq!(
            r#"<p><em>a</em> <strong>b</strong> <a href="https://go.dev" title="Go">go</a></p>"#,
            render(r#"*a* **b** [go](https://go.dev "Go")"#).html
        );
    }

    #[test]
    fn test_image_alt_text() {
        assert_eq!(
            r#"<p><img src="gopher.png" alt="a gopher" title="Hi" /></p>"#,
            render(r#"![a *gopher*](gopher.png "Hi")"#).html
        );
    }

    #[test]
    fn test_fenced_code_block_language() {
        let html = render("```golang\nfmt.Println(\"<hi>\")\n```\n").html;
        assert_eq!(
            "<pre><code class=\"language-golang\">fmt.Println(&quot;&lt;hi&gt;&quot;)\n</code></pre>",
            html
        );
    }

    #[test]
    fn test_fenced_code_block_unknown_language() {
        let html = render("```klingon\nqapla'\n```\n").html;
        assert!(html.starts_with("<pre><code>"), "{}", html);
        assert!(!html.contains("language-"));
    }

    #[test]
    fn test_fenced_code_block_configured_language() {
        let options = RenderOptions {
            languages: vec!["Klingon".to_owned()],
            ..RenderOptions::default()
        };
        let html = render_with(&options, "```klingon\nqapla'\n```\n").html;
        assert!(html.starts_with(r#"<pre><code class="language-klingon">"#), "{}", html);
    }

    #[test]
    fn test_fenced_code_block_info_string() {
        let html = render("```rust,ignore\nfn main() {}\n```\n").html;
        assert!(html.starts_with(r#"<pre><code class="language-rust">"#), "{}", html);
    }

    #[test]
    fn test_inline_html_passthrough() {
        let html = render("<div class=\"note\">raw</div>\n\ntext <kbd>C</kbd>").html;
        assert!(html.contains("<div class=\"note\">raw</div>"), "{}", html);
        assert!(html.contains("<kbd>C</kbd>"), "{}", html);
    }

    #[test]
    fn test_footnotes_moved_to_end() {
        let rendered = render("First[^1] and second[^note].\n\n[^note]: The note.\n\n[^1]: The one.\n\nAfter.");
        assert!(rendered.warnings.is_empty());
        assert_eq!(
            concat!(
                r##"<p>First<sup class="footnote-reference" id="fnref-1"><a href="/posts/a.html#fn-1">1</a></sup>"##,
                r##" and second<sup class="footnote-reference" id="fnref-note"><a href="/posts/a.html#fn-note">2</a></sup>.</p>"##,
                r##"<p>After.</p>"##,
                r##"<section class="footnotes"><ol>"##,
                r##"<li id="fn-1"><p>The one.</p><a href="#fnref-1" class="footnote-backref">&#8617;</a></li>"##,
                r##"<li id="fn-note"><p>The note.</p><a href="#fnref-note" class="footnote-backref">&#8617;</a></li>"##,
                r##"</ol></section>"##,
            ),
            rendered.html
        );
    }

    #[test]
    fn test_repeated_footnote_reference() {
        let html = render("a[^x] b[^x]\n\n[^x]: note").html;
        assert!(html.contains(r#"id="fnref-x""#), "{}", html);
        assert!(html.contains(r#"id="fnref-x-2""#), "{}", html);
    }

    #[test]
    fn test_unresolved_footnote() {
        let rendered = render("Dangling[^missing] and again[^missing].");
        assert_eq!(
            vec![RenderWarning::UnresolvedFootnote {
                path: PathBuf::from("posts/a.md"),
                marker: "missing".to_owned(),
            }],
            rendered.warnings
        );
        assert!(!rendered.html.contains("footnotes"));
        assert!(rendered.html.contains("[^missing]"));
    }

    #[test]
    fn test_summary() {
        let rendered = render("Intro.\n\n<!-- more -->\n\nRest.");
        let (summary, folded) = rendered.summary();
        assert!(folded);
        assert_eq!("<p>Intro.</p>", summary);

        let rendered = render("No fold.");
        assert_eq!(("<p>No fold.</p>", false), rendered.summary());
    }

    #[test]
    fn test_deterministic() {
        let body = "# T\n\ntext[^a]\n\n```go\nx := 1\n```\n\n[^a]: n";
        assert_eq!(render(body), render(body));
    }

    #[test]
    fn test_internal_links() {
        let mut links = Links::new();
        links.insert(Path::new("posts/b.md"), "/posts/b.html".to_owned());
        links.insert(Path::new("about.md"), "/about/".to_owned());
        let doc = document(
            "posts/a.md",
            "[b](b.md#intro) [about](../about.md) [gone](nope.md) [ext](https://x.org/y.md) [img](pic.png)",
        );
        let rendered = Renderer::new(&RenderOptions::default())
            .render(&doc, "/posts/a.html", &links)
            .unwrap();
        assert!(rendered.html.contains(r#"href="/posts/b.html#intro""#), "{}", rendered.html);
        assert!(rendered.html.contains(r#"href="/about/""#), "{}", rendered.html);
        assert!(rendered.html.contains(r#"href="nope.md""#), "{}", rendered.html);
        assert!(rendered.html.contains(r#"href="https://x.org/y.md""#), "{}", rendered.html);
        assert!(rendered.html.contains(r#"href="pic.png""#), "{}", rendered.html);
        assert_eq!(
            vec![RenderWarning::BrokenLink {
                path: PathBuf::from("posts/a.md"),
                target: "nope.md".to_owned(),
            }],
            rendered.warnings
        );
    }

    #[test]
    fn test_resolve_parent_past_root() {
        let links = Links::new();
        assert_eq!(
            LinkTarget::Broken,
            links.resolve(Path::new("a.md"), "../../b.md")
        );
        assert_eq!(
            LinkTarget::External,
            links.resolve(Path::new("a.md"), "mailto:me@example.org")
        );
    }
}
