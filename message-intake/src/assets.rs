//! Fixed set of front-end files served over `GET`.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

/// Request path to file name, relative to the asset root.
pub const DEFAULT_ROUTES: &[(&str, &str)] = &[
    ("/", "index.html"),
    ("/message.html", "message.html"),
    ("/style.css", "style.css"),
    ("/logo.png", "logo.png"),
];

#[derive(Debug, Clone)]
pub struct Asset {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssetCatalog {
    root: PathBuf,
    routes: Vec<(String, String)>,
}

impl AssetCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_routes(root, DEFAULT_ROUTES.iter().copied())
    }

    pub fn with_routes<'a>(
        root: impl Into<PathBuf>,
        routes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            root: root.into(),
            routes: routes
                .into_iter()
                .map(|(route, file)| (route.to_string(), file.to_string()))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads the file registered for `route`.
    ///
    /// Returns `None` for unregistered routes and for registered routes
    /// whose file cannot be read.
    pub async fn load(&self, route: &str) -> Option<Asset> {
        let file = self.file_for(route)?;
        let path = self.root.join(file);

        match fs::read(&path).await {
            Ok(bytes) => Some(Asset {
                content_type: content_type_for(file),
                bytes,
            }),
            Err(error) => {
                warn!(path = %path.display(), %error, "registered asset is unreadable");
                None
            }
        }
    }

    fn file_for(&self, route: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(registered, _)| registered == route)
            .map(|(_, file)| file.as_str())
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("index.html"), "text/html");
        assert_eq!(content_type_for("style.css"), "text/css");
        assert_eq!(content_type_for("logo.png"), "image/png");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[tokio::test]
    async fn unknown_route_and_missing_file_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").expect("seed asset");
        let catalog = AssetCatalog::new(dir.path());

        let index = catalog.load("/").await.expect("index is registered");
        assert_eq!(index.content_type, "text/html");
        assert_eq!(index.bytes, b"<h1>hi</h1>");

        assert!(catalog.load("/secret.txt").await.is_none());
        assert!(catalog.load("/style.css").await.is_none());
    }
}
