//! The library code for the `quill` static site generator. The architecture
//! can be generally broken down into two distinct steps:
//!
//! 1. Loading documents (markdown files with YAML front matter) from the
//!    content directory ([`crate::document`], [`crate::permalink`])
//! 2. Converting the documents into output files on disk ([`crate::build`])
//!
//! Of the two, the second step is the more involved. It is itself composed of
//! four distinct sub-steps:
//!
//! 1. Rendering each document's markdown to an HTML fragment, in parallel
//!    ([`crate::markdown`])
//! 2. Wrapping each fragment in its layout ([`crate::layout`],
//!    [`crate::write`])
//! 3. Building index pages
//! 4. Writing all pages and assets to disk
//!
//! The third sub-step waits for every document to be rendered, because the
//! index for each tag is folded from all documents' tags ([`crate::tag`]).
//! An index (the main index of dated documents, or the documents for one
//! tag) is paginated--converted into groups of pages based on a configurable
//! number of documents per index page.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod document;
pub mod entry;
pub mod feed;
mod htmlrenderer;
pub mod layout;
pub mod markdown;
pub mod permalink;
pub mod tag;
pub mod write;
