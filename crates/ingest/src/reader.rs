use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

use crate::document::Document;
use crate::generate_doc_id;

pub struct FileReader;

impl FileReader {
    fn is_supported(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        )
    }

    pub async fn read_file(path: &Path) -> Result<Document> {
        if !Self::is_supported(path) {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        let path_str = path.to_string_lossy().to_string();
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());

        Ok(Document::new(generate_doc_id(&path_str), content)
            .with_attribute("title", title)
            .with_attribute("source", path_str))
    }

    /// Read every `.txt`/`.md` file below `dir`, in path order.
    pub async fn read_directory(dir: &Path) -> Result<Vec<Document>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.context(format!("Failed to walk directory: {:?}", dir))?;
            if entry.file_type().is_file() && Self::is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(Self::read_file(&path).await?);
        }

        Ok(documents)
    }
}
