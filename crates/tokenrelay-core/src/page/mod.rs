//! Page sources the balance reader captures markup from

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Something that can produce the current markup of a platform page
pub trait PageSource: Send + Sync {
    /// Capture the page as it is right now
    fn capture(&self) -> Result<String>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// A page saved to disk (e.g. by a browser helper), re-read on every capture
pub struct FilePage {
    path: PathBuf,
}

impl FilePage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageSource for FilePage {
    fn capture(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read page file: {:?}", self.path))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A page fetched over HTTP on every capture
pub struct HttpPage {
    url: String,
    agent: ureq::Agent,
}

impl HttpPage {
    /// `timeout` bounds the whole fetch, connect through body
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl PageSource for HttpPage {
    fn capture(&self) -> Result<String> {
        let mut response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("Failed to fetch page: {}", self.url))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            bail!("page fetch returned HTTP {}: {}", status, self.url);
        }

        response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("Failed to read page body: {}", self.url))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// In-memory page whose markup can be swapped at runtime
pub struct StaticPage {
    markup: RwLock<Option<String>>,
}

impl StaticPage {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: RwLock::new(Some(markup.into())),
        }
    }

    /// A page that fails every capture until [`StaticPage::set`] is called
    pub fn unavailable() -> Self {
        Self {
            markup: RwLock::new(None),
        }
    }

    /// Replace the markup returned by subsequent captures
    pub fn set(&self, markup: impl Into<String>) {
        *self.markup.write() = Some(markup.into());
    }

    /// Make subsequent captures fail
    pub fn clear(&self) {
        *self.markup.write() = None;
    }
}

impl PageSource for StaticPage {
    fn capture(&self) -> Result<String> {
        match self.markup.read().as_ref() {
            Some(markup) => Ok(markup.clone()),
            None => bail!("page not available"),
        }
    }

    fn describe(&self) -> String {
        "static page".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_page_rereads_each_capture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<b>1</b>").unwrap();
        let page = FilePage::new(file.path());
        assert_eq!(page.capture().unwrap(), "<b>1</b>");

        std::fs::write(file.path(), "<b>2</b>").unwrap();
        assert_eq!(page.capture().unwrap(), "<b>2</b>");
    }

    #[test]
    fn test_file_page_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let page = FilePage::new(dir.path().join("missing.html"));
        let err = page.capture().unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read page file"));
    }

    #[test]
    fn test_http_page_times_out_on_silent_server() {
        // Accepted by the kernel backlog, never answered
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/room", listener.local_addr().unwrap());
        let page = HttpPage::new(url, Duration::from_millis(300));

        let started = std::time::Instant::now();
        assert!(page.capture().is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_static_page_set_and_clear() {
        let page = StaticPage::unavailable();
        assert!(page.capture().is_err());
        page.set("<i>9</i>");
        assert_eq!(page.capture().unwrap(), "<i>9</i>");
        page.clear();
        assert!(page.capture().is_err());
    }
}
