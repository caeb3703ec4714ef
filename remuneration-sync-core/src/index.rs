//! Index document generation for local spreadsheet directories.
//!
//! The processing pipeline discovers spreadsheets by crawling an HTML index
//! page. When the spreadsheets live on local disk there is no such page, so
//! [`generate_index`] renders one: a single table row with one link per
//! directory entry, each link addressed as `file://<directory>/<entry>`.
//!
//! # Locators
//! Locators are built by plain concatenation. Entry names are not
//! percent-encoded, so a name containing `#`, `?` or a space yields a locator
//! that is not a well-formed URL. Consumers of the index must treat
//! `file://` locators as raw paths (see `crawl`). Markup escaping still
//! applies, so `&` in a name is rendered as `&amp;` inside the attribute.
//!
//! # Lifetime
//! The document is written to a uniquely named `index-*.html` file and
//! removed when the [`IndexDocument`] is dropped or [`IndexDocument::remove`]d.
//! Use [`IndexDocument::persist`] to keep it.

use maud::{html, Markup, DOCTYPE};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info};

/// Scheme prefix of locators pointing at local files.
pub const LOCAL_SCHEME: &str = "file://";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to list directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot render {name:?} from {path}: not valid UTF-8")]
    Template { path: PathBuf, name: OsString },
    #[error("failed to write index document to {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve absolute path of {path}: {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rendered index page on disk.
#[derive(Debug)]
pub struct IndexDocument {
    file: NamedTempFile,
    path: PathBuf,
    links: Vec<String>,
}

impl IndexDocument {
    /// Absolute path of the rendered page.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `file://` locator of the page itself.
    pub fn locator(&self) -> String {
        format!("{LOCAL_SCHEME}{}", self.path.display())
    }

    /// Locators listed by the page, in rendered order.
    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Deletes the page now, reporting failures instead of ignoring them on drop.
    pub fn remove(self) -> std::io::Result<()> {
        debug!(path = %self.path.display(), "Removing index document");
        self.file.close()
    }

    /// Moves the page to `target` and keeps it there. Returns the absolute target path.
    ///
    /// `target` must be on the same file system as the directory the page was
    /// generated in.
    pub fn persist(self, target: impl AsRef<Path>) -> Result<PathBuf, IndexError> {
        let target = target.as_ref();
        self.file.persist(target).map_err(|e| {
            error!(error = ?e.error, target = %target.display(), "Failed to persist index document");
            IndexError::FileWrite {
                path: target.to_path_buf(),
                source: e.error,
            }
        })?;
        std::path::absolute(target).map_err(|source| IndexError::PathResolution {
            path: target.to_path_buf(),
            source,
        })
    }
}

/// Lists `directory` and renders an index page for it inside `output_dir`.
///
/// Entries are listed in the order the file system returns them, without
/// recursing. An empty directory yields a page with no links.
pub fn generate_index(directory: &Path, output_dir: &Path) -> Result<IndexDocument, IndexError> {
    info!(directory = %directory.display(), output_dir = %output_dir.display(), "Generating index document");

    let links = list_locators(directory)?;
    let markup = render(&links).into_string();

    let write_error = |source| IndexError::FileWrite {
        path: output_dir.to_path_buf(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("index-")
        .suffix(".html")
        .tempfile_in(output_dir)
        .map_err(write_error)?;
    // On failure `file` is dropped here, which deletes the partial page.
    file.write_all(markup.as_bytes())
        .and_then(|_| file.flush())
        .map_err(write_error)?;

    let path = std::path::absolute(file.path()).map_err(|source| IndexError::PathResolution {
        path: file.path().to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), links = links.len(), "Index document written");
    Ok(IndexDocument { file, path, links })
}

fn list_locators(directory: &Path) -> Result<Vec<String>, IndexError> {
    let read_error = |source| IndexError::DirectoryRead {
        path: directory.to_path_buf(),
        source,
    };
    let entries = fs::read_dir(directory).map_err(|e| {
        error!(error = ?e, directory = %directory.display(), "Failed to list spreadsheets directory");
        read_error(e)
    })?;

    let prefix = directory.to_str().ok_or_else(|| IndexError::Template {
        path: directory.to_path_buf(),
        name: directory.as_os_str().to_os_string(),
    })?;

    let mut links = Vec::new();
    for entry in entries {
        let name = entry.map_err(read_error)?.file_name();
        let Some(name) = name.to_str() else {
            error!(name = ?name, "Directory entry is not valid UTF-8");
            return Err(IndexError::Template {
                path: directory.to_path_buf(),
                name,
            });
        };
        let link = format!("{LOCAL_SCHEME}{prefix}/{name}");
        debug!(link = %link, "Listed entry");
        links.push(link);
    }
    Ok(links)
}

fn render(links: &[String]) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="UTF-8";
                title { "Spreadsheets" }
            }
            body {
                table {
                    tr {
                        @for link in links {
                            td {
                                a href=(link) target="_blank" rel="alternate noopener" { (link) }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn render_places_every_link_in_a_single_row() {
        let links = vec!["file:///a/x.csv".to_string(), "file:///a/y.csv".to_string()];
        let html = render(&links).into_string();

        assert_eq!(html.matches("<tr>").count(), 1);
        assert_eq!(html.matches("<td>").count(), 2);
        assert!(html.contains(r#"href="file:///a/x.csv""#));
        assert!(html.contains(r#"href="file:///a/y.csv""#));
    }

    #[test]
    fn render_escapes_markup_but_not_url_characters() {
        let links = vec!["file:///a/R&D #1?.csv".to_string()];
        let html = render(&links).into_string();

        assert!(html.contains(r#"href="file:///a/R&amp;D #1?.csv""#));
    }

    #[test]
    fn remove_deletes_the_page() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let doc = generate_index(src.path(), out.path()).unwrap();
        let path = doc.path().to_path_buf();
        assert!(path.exists());

        doc.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn persist_keeps_the_page_at_target() {
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.csv"), "x").unwrap();
        let out = tempdir().unwrap();
        let target = out.path().join("index.html");

        let doc = generate_index(src.path(), out.path()).unwrap();
        let kept = doc.persist(&target).unwrap();

        assert_eq!(kept, target);
        let html = fs::read_to_string(&target).unwrap();
        assert!(html.contains("a.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_entry_is_a_template_error() {
        use std::os::unix::ffi::OsStrExt;

        let src = tempdir().unwrap();
        let name = std::ffi::OsStr::from_bytes(b"bad-\xff.csv");
        if fs::write(src.path().join(name), "x").is_err() {
            // Some file systems refuse non-UTF-8 names outright.
            return;
        }
        let out = tempdir().unwrap();

        let err = generate_index(src.path(), out.path()).unwrap_err();
        assert!(matches!(err, IndexError::Template { .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
