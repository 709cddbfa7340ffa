//! Implements a custom HTML writer for [`pulldown_cmark`] events. It differs
//! from [`pulldown_cmark::html::push_html`] in three ways:
//!
//! * Footnote definitions are pulled out of the flow of the document and
//!   emitted as a numbered list at the end of the fragment, each with a link
//!   back to its first reference. Footnote reference links are prefixed with
//!   the document URL so that they keep working when the fragment is cut into
//!   a summary on an index page.
//! * Fenced code blocks only get a `language-*` class if the language is
//!   known; anything else is rendered as a plain code block.
//! * References to footnotes that are never defined are collected so the
//!   caller can report them.

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::collections::{HashMap, HashSet};
use std::io;

enum TableState {
    Head,
    Body,
}

struct Note {
    name: String,
    html: String,
}

/// Renders markdown [`Event`]s into HTML. This is largely modeled after
/// [`pulldown_cmark`]'s private `HtmlWriter` struct.
pub(crate) struct HtmlRenderer<'a> {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Languages that get a `language-*` class on fenced code blocks. Entries
    /// are lowercase.
    languages: &'a HashSet<String>,

    /// The prefix to prepend onto footnote reference links.
    footnote_prefix: &'a str,

    /// The names of every footnote defined in the document.
    defined: HashSet<String>,

    /// The rendered fragment, less footnote definitions.
    body: String,

    /// Footnote definitions in source order.
    notes: Vec<Note>,

    /// The index into `notes` while inside a footnote definition.
    in_note: Option<usize>,

    /// Footnote names in order of first reference. A footnote's number is
    /// its position here plus one.
    references: Vec<String>,
    reference_counts: HashMap<String, usize>,

    /// Names of referenced footnotes with no definition, in order of first
    /// reference.
    unresolved: Vec<String>,

    /// Titles of the images whose alt text is being written. Non-empty
    /// while inside an image.
    image_titles: Vec<String>,
}

impl<'a> HtmlRenderer<'a> {
    pub(crate) fn new(
        languages: &'a HashSet<String>,
        footnote_prefix: &'a str,
        defined: HashSet<String>,
    ) -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            languages,
            footnote_prefix,
            defined,
            body: String::new(),
            notes: Vec::new(),
            in_note: None,
            references: Vec::new(),
            reference_counts: HashMap::new(),
            unresolved: Vec::new(),
            image_titles: Vec::new(),
        }
    }

    fn out(&mut self) -> &mut String {
        match self.in_note {
            Some(i) => &mut self.notes[i].html,
            None => &mut self.body,
        }
    }

    pub(crate) fn on_event(&mut self, event: Event<'_>) -> io::Result<()> {
        if !self.image_titles.is_empty() {
            return self.on_alt_text_event(event);
        }

        match event {
            Event::Start(tag) => self.on_start(tag),
            Event::End(tag) => self.on_end(tag),
            Event::Code(code) => self.on_code(code),
            Event::FootnoteReference(name) => self.on_footnote_reference(name),
            Event::HardBreak => self.out().write_str("<br />"),
            Event::Html(html) => self.out().write_str(&html),
            Event::Rule => self.out().write_str("<hr />"),
            Event::SoftBreak => self.out().write_str("\n"),
            Event::TaskListMarker(checked) => self.on_task_list_marker(checked),
            Event::Text(text) => escape_html(self.out(), &text),
        }
    }

    /// Writes the events nested in an image as plain text for its `alt`
    /// attribute.
    fn on_alt_text_event(&mut self, event: Event<'_>) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(_, _, title)) => {
                self.image_titles.push(title.into_string());
                Ok(())
            }
            Event::End(Tag::Image(..)) => match self.image_titles.pop() {
                Some(title) if self.image_titles.is_empty() => {
                    self.out().write_str("\"")?;
                    if !title.is_empty() {
                        self.out().write_str(" title=\"")?;
                        escape_html(self.out(), &title)?;
                        self.out().write_str("\"")?;
                    }
                    self.out().write_str(" />")
                }
                _ => Ok(()),
            },
            Event::Text(text) | Event::Code(text) | Event::Html(text) => {
                escape_html(self.out(), &text)
            }
            Event::FootnoteReference(name) => {
                self.out().write_str("[")?;
                escape_html(self.out(), &name)?;
                self.out().write_str("]")
            }
            Event::SoftBreak | Event::HardBreak => self.out().write_str(" "),
            _ => Ok(()),
        }
    }

    fn on_start(&mut self, tag: Tag<'_>) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => self.out().write_str("<blockquote>"),
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => match self.language(&info) {
                Some(lang) => write!(self.out(), r#"<pre><code class="language-{}">"#, lang),
                None => self.out().write_str("<pre><code>"),
            },
            Tag::CodeBlock(CodeBlockKind::Indented) => self.out().write_str("<pre><code>"),
            Tag::Emphasis => self.out().write_str("<em>"),
            Tag::FootnoteDefinition(name) => {
                self.notes.push(Note {
                    name: name.into_string(),
                    html: String::new(),
                });
                self.in_note = Some(self.notes.len() - 1);
                Ok(())
            }
            Tag::Heading(level) => write!(self.out(), "<h{}>", level),
            Tag::Image(_link_type, dest, title) => {
                self.out().write_str("<img src=\"")?;
                escape_href(self.out(), &dest)?;
                self.out().write_str("\" alt=\"")?;
                self.image_titles.push(title.into_string());
                Ok(())
            }
            Tag::Item => self.out().write_str("<li>"),
            Tag::Link(link_type, dest, title) => {
                self.out().write_str("<a href=\"")?;
                if link_type == LinkType::Email {
                    self.out().write_str("mailto:")?;
                }
                escape_href(self.out(), &dest)?;
                if !title.is_empty() {
                    self.out().write_str("\" title=\"")?;
                    escape_html(self.out(), &title)?;
                }
                self.out().write_str("\">")
            }
            Tag::List(None) => self.out().write_str("<ul>"),
            Tag::List(Some(1)) => self.out().write_str("<ol>"),
            Tag::List(Some(start)) => write!(self.out(), r#"<ol start="{}">"#, start),
            Tag::Paragraph => self.out().write_str("<p>"),
            Tag::Strikethrough => self.out().write_str("<del>"),
            Tag::Strong => self.out().write_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                self.out().write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                self.out().write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                self.out().write_str("<tr>")
            }
            Tag::TableCell => {
                let cell = match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                };
                let align = match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                };
                write!(self.out(), "<{}{}>", cell, align)
            }
        }
    }

    fn on_end(&mut self, tag: Tag<'_>) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => self.out().write_str("</blockquote>"),
            Tag::CodeBlock(_) => self.out().write_str("</code></pre>"),
            Tag::Emphasis => self.out().write_str("</em>"),
            Tag::FootnoteDefinition(_) => {
                self.in_note = None;
                Ok(())
            }
            Tag::Heading(level) => write!(self.out(), "</h{}>", level),
            // closed in `on_alt_text_event`
            Tag::Image(..) => Ok(()),
            Tag::Item => self.out().write_str("</li>"),
            Tag::Link(..) => self.out().write_str("</a>"),
            Tag::List(Some(_)) => self.out().write_str("</ol>"),
            Tag::List(None) => self.out().write_str("</ul>"),
            Tag::Paragraph => self.out().write_str("</p>"),
            Tag::Strikethrough => self.out().write_str("</del>"),
            Tag::Strong => self.out().write_str("</strong>"),
            Tag::Table(_) => self.out().write_str("</tbody></table>"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                self.out().write_str("</tr></thead><tbody>")
            }
            Tag::TableRow => self.out().write_str("</tr>"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                match self.table_state {
                    TableState::Head => self.out().write_str("</th>"),
                    TableState::Body => self.out().write_str("</td>"),
                }
            }
        }
    }

    /// The language of a fenced code block, if it's one we know. The info
    /// string's first word is the language (`rust,ignore` and `go {linenos}`
    /// both count).
    fn language<'i>(&self, info: &'i str) -> Option<&'i str> {
        let lang = info
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .next()
            .unwrap_or_default();
        match self.languages.contains(&lang.to_ascii_lowercase()) {
            true => Some(lang),
            false => None,
        }
    }

    fn on_code(&mut self, code: CowStr<'_>) -> io::Result<()> {
        self.out().write_str("<code>")?;
        escape_html(self.out(), &code)?;
        self.out().write_str("</code>")
    }

    fn on_footnote_reference(&mut self, name: CowStr<'_>) -> io::Result<()> {
        if !self.defined.contains(&*name) {
            if !self.unresolved.iter().any(|n| n == &*name) {
                self.unresolved.push(name.to_string());
            }
            self.out()
                .write_str(r#"<sup class="footnote-reference footnote-unresolved">[^"#)?;
            escape_html(self.out(), &name)?;
            return self.out().write_str("]</sup>");
        }

        let number = match self.references.iter().position(|n| n == &*name) {
            Some(i) => i + 1,
            None => {
                self.references.push(name.to_string());
                self.references.len()
            }
        };
        let count = {
            let count = self.reference_counts.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let id = escaped(&name)?;
        let prefix = escaped(self.footnote_prefix)?;
        match count {
            1 => write!(self.out(), r#"<sup class="footnote-reference" id="fnref-{}">"#, id)?,
            n => write!(
                self.out(),
                r#"<sup class="footnote-reference" id="fnref-{}-{}">"#,
                id, n
            )?,
        }
        write!(
            self.out(),
            r##"<a href="{}#fn-{}">{}</a></sup>"##,
            prefix, id, number
        )
    }

    fn on_task_list_marker(&mut self, checked: bool) -> io::Result<()> {
        write!(
            self.out(),
            r#"<input disabled="" type="checkbox" {}/>"#,
            match checked {
                true => r#"checked="" "#,
                false => "",
            }
        )
    }

    /// Appends the footnotes section and returns the fragment along with the
    /// names of footnotes that were referenced but never defined.
    pub(crate) fn finish(mut self) -> io::Result<(String, Vec<String>)> {
        if self.notes.is_empty() {
            return Ok((self.body, self.unresolved));
        }

        // Referenced notes first, in reference order, then the rest in
        // source order.
        let mut order: Vec<(usize, usize)> = self
            .notes
            .iter()
            .enumerate()
            .map(|(i, note)| {
                let rank = self
                    .references
                    .iter()
                    .position(|n| n == &note.name)
                    .filter(|_| self.notes.iter().position(|n| n.name == note.name) == Some(i))
                    .unwrap_or(usize::MAX);
                (rank, i)
            })
            .collect();
        order.sort();

        let mut section = String::from(r#"<section class="footnotes"><ol>"#);
        for (rank, i) in order {
            let note = &self.notes[i];
            let id = escaped(&note.name)?;
            write!(section, r#"<li id="fn-{}">"#, id)?;
            section.write_str(&note.html)?;
            if rank != usize::MAX {
                write!(
                    section,
                    r##"<a href="#fnref-{}" class="footnote-backref">&#8617;</a>"##,
                    id
                )?;
            }
            section.write_str("</li>")?;
        }
        section.write_str("</ol></section>")?;

        self.body.push_str(&section);
        Ok((self.body, self.unresolved))
    }
}

fn escaped(s: &str) -> io::Result<String> {
    let mut out = String::with_capacity(s.len());
    escape_html(&mut out, s)?;
    Ok(out)
}
