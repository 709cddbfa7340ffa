//! Defines [`Layouts`], the set of named templates rendered pages are wrapped
//! in. Each `<name>.html` file in the layouts directory is a layout named
//! `<name>`. Files in `partials/` are prepended to every layout so they can
//! share `{{ define "..." }}` blocks.

use gtmpl::{Context, Template, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const LAYOUT_EXTENSION: &str = "html";
const PARTIALS_DIRECTORY: &str = "partials";

/// The parsed layout templates for a site.
pub struct Layouts {
    templates: BTreeMap<String, Template>,
}

impl Layouts {
    /// Loads and parses every layout in `dir`. A missing directory yields an
    /// empty set of layouts (every document will then fail with
    /// [`Error::MissingLayout`]).
    pub fn load(dir: &Path) -> Result<Layouts> {
        let mut templates = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Layouts { templates });
        }

        let partials = read_partials(&dir.join(PARTIALS_DIRECTORY))?;
        for path in html_files(dir)? {
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_owned(),
                None => continue,
            };
            let contents = fs::read_to_string(&path).map_err(|err| Error::Open {
                path: path.clone(),
                err,
            })?;
            let template = parse_template(&format!("{} {}", partials, contents))
                .map_err(|err| Error::Parse { path, err })?;
            debug!(layout = %name, "loaded layout");
            templates.insert(name, template);
        }
        Ok(Layouts { templates })
    }

    /// Parses layouts from in-memory sources. Used where layouts don't live
    /// on disk.
    pub fn from_sources<'a, I>(sources: I) -> Result<Layouts>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut templates = BTreeMap::new();
        for (name, source) in sources {
            let template = parse_template(source).map_err(|err| Error::Parse {
                path: PathBuf::from(format!("{}.{}", name, LAYOUT_EXTENSION)),
                err,
            })?;
            templates.insert(name.to_owned(), template);
        }
        Ok(Layouts { templates })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// The names of every layout, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Executes the layout `name` with `value` as the template's `.`.
    /// `origin` names the page being rendered for error messages.
    pub fn render(&self, name: &str, value: Value, origin: &str) -> Result<Vec<u8>> {
        let template = self.templates.get(name).ok_or_else(|| Error::MissingLayout {
            layout: name.to_owned(),
            origin: origin.to_owned(),
        })?;
        let context = Context::from(value).map_err(|err| Error::Execute {
            layout: name.to_owned(),
            origin: origin.to_owned(),
            err,
        })?;
        let mut out = Vec::new();
        template
            .execute(&mut out, &context)
            .map_err(|err| Error::Execute {
                layout: name.to_owned(),
                origin: origin.to_owned(),
                err,
            })?;
        Ok(out)
    }
}

fn parse_template(contents: &str) -> std::result::Result<Template, String> {
    let mut template = Template::default();
    template.parse(contents)?;
    Ok(template)
}

/// The `*.html` files directly inside `dir`, sorted by name.
fn html_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let open_err = |err| Error::Open {
        path: dir.to_owned(),
        err,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(open_err)? {
        let entry = entry.map_err(open_err)?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == LAYOUT_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// Concatenates the partial templates so they can be prepended to each
// layout.
fn read_partials(dir: &Path) -> Result<String> {
    let mut contents = String::new();
    if !dir.is_dir() {
        return Ok(contents);
    }
    for path in html_files(dir)? {
        let partial = fs::read_to_string(&path).map_err(|err| Error::Open {
            path: path.clone(),
            err,
        })?;
        contents.push_str(&partial);
        contents.push(' ');
    }
    Ok(contents)
}

/// The result of a layout operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading or executing a layout.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a page references a layout that doesn't exist.
    #[error("{origin}: layout `{layout}` is not defined")]
    MissingLayout { layout: String, origin: String },

    /// Returned for I/O problems reading layout files.
    #[error("reading layout `{}`: {err}", path.display())]
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when a layout isn't a valid template.
    #[error("parsing layout `{}`: {err}", path.display())]
    Parse { path: PathBuf, err: String },

    /// Returned when executing a layout fails.
    #[error("{origin}: executing layout `{layout}`: {err}")]
    Execute {
        layout: String,
        origin: String,
        err: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn page(title: &str) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(title.to_owned()));
        Value::Object(m)
    }

    #[test]
    fn test_render() -> Result<()> {
        let layouts = Layouts::from_sources(vec![("post", "<h1>{{ .title }}</h1>")])?;
        assert!(layouts.contains("post"));
        assert_eq!(b"<h1>Hello</h1>".to_vec(), layouts.render("post", page("Hello"), "a.md")?);
        Ok(())
    }

    #[test]
    fn test_missing_layout() -> Result<()> {
        let layouts = Layouts::from_sources(vec![("post", "{{ .title }}")])?;
        match layouts.render("page", page("x"), "about.md") {
            Err(Error::MissingLayout { layout, origin }) => {
                assert_eq!("page", layout);
                assert_eq!("about.md", origin);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn test_load_with_partials() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        std::fs::write(
            dir.path().join("partials/head.html"),
            r#"{{ define "head" }}<title>{{ .title }}</title>{{ end }}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("page.html"),
            r#"{{ template "head" . }}<main></main>"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let layouts = Layouts::load(dir.path())?;
        assert_eq!(vec!["page"], layouts.names().collect::<Vec<_>>());
        let out = layouts.render("page", page("About"), "about.md")?;
        assert_eq!(
            "<title>About</title><main></main>",
            String::from_utf8(out).unwrap().trim()
        );
        Ok(())
    }

    #[test]
    fn test_missing_directory_is_empty() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let layouts = Layouts::load(&dir.path().join("nope"))?;
        assert_eq!(0, layouts.names().count());
        Ok(())
    }
}
