use anyhow::{Context, Result, bail};

/// Hands a URL to something that can show it.
pub trait Opener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs in the platform's default browser.
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            bail!("refusing to open non-http URL: {url}");
        }

        // Detached so the TUI never waits on the browser.
        open::that_detached(url).with_context(|| format!("failed to launch browser for {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        let err = SystemOpener.open("file:///etc/passwd").unwrap_err();
        assert!(err.to_string().contains("non-http"));

        let err = SystemOpener.open("javascript:alert(1)").unwrap_err();
        assert!(err.to_string().contains("non-http"));
    }
}
