use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{AssistantError, Result};
use crate::models::{FileRecord, InputSource};

/// Number of characters of encoded or decoded content kept per file.
pub const CONTENT_PREFIX_CHARS: usize = 1000;

/// Read every source in order and turn it into a [`FileRecord`].
///
/// Stops at the first source that cannot be read; no records are returned in
/// that case.
pub async fn ingest(sources: &[InputSource]) -> Result<Vec<FileRecord>> {
    let mut records = Vec::with_capacity(sources.len());
    for source in sources {
        records.push(ingest_one(source).await?);
    }
    info!(files = records.len(), "ingested input files");
    Ok(records)
}

pub async fn ingest_one(source: &InputSource) -> Result<FileRecord> {
    match source {
        InputSource::LocalPath { path, media_type } => {
            let bytes = read_local(path).await?;
            let media_type = media_type
                .clone()
                .unwrap_or_else(|| media_type_for_name(&path.to_string_lossy()).to_string());
            Ok(encode_record(source.display_name(), media_type, &bytes))
        }
        InputSource::Uploaded {
            name,
            media_type,
            bytes,
        } => {
            let media_type = if media_type.trim().is_empty() {
                media_type_for_name(name).to_string()
            } else {
                media_type.clone()
            };
            Ok(encode_record(name.clone(), media_type, bytes))
        }
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(AssistantError::FileNotFound(path.to_path_buf()))
        }
        Err(source) => Err(AssistantError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Images become base64 text; everything else is decoded as UTF-8 with
/// invalid sequences replaced. Both are cut to [`CONTENT_PREFIX_CHARS`].
pub fn encode_record(name: String, media_type: String, bytes: &[u8]) -> FileRecord {
    let content = if is_image(&media_type) {
        truncate_chars(&STANDARD.encode(bytes), CONTENT_PREFIX_CHARS)
    } else {
        truncate_chars(&String::from_utf8_lossy(bytes), CONTENT_PREFIX_CHARS)
    };
    debug!(%name, %media_type, size = bytes.len(), kept = content.chars().count(), "encoded file");

    FileRecord {
        name,
        media_type,
        content,
        size: bytes.len() as u64,
    }
}

pub fn is_image(media_type: &str) -> bool {
    media_type.trim().to_ascii_lowercase().starts_with("image")
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Media type for the accepted upload extensions.
pub fn media_type_for_name(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => "text/csv",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn text_content_is_cut_to_prefix() {
        let long = "Glucosa: 120 mg/dL\n".repeat(200);
        let source = InputSource::uploaded("labs.txt", "text/plain", long.clone().into_bytes());
        let records = ingest(&[source]).await.unwrap();

        assert_eq!(records[0].content.chars().count(), CONTENT_PREFIX_CHARS);
        assert!(long.starts_with(&records[0].content));
        assert_eq!(records[0].size, long.len() as u64);
    }

    #[tokio::test]
    async fn image_content_is_base64_prefix() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let record = ingest_one(&InputSource::uploaded("scan.png", "image/png", bytes.clone()))
            .await
            .unwrap();

        let full = STANDARD.encode(&bytes);
        assert_eq!(record.content.len(), CONTENT_PREFIX_CHARS);
        assert_eq!(record.content, full[..CONTENT_PREFIX_CHARS]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let record = ingest_one(&InputSource::uploaded(
            "labs.csv",
            "text/csv",
            vec![b'H', b'b', 0xFF, b':', b'1', b'4'],
        ))
        .await
        .unwrap();
        assert_eq!(record.content, "Hb\u{FFFD}:14");
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let text = "ñ".repeat(CONTENT_PREFIX_CHARS + 5);
        let record = encode_record("n.txt".into(), "text/plain".into(), text.as_bytes());
        assert_eq!(record.content.chars().count(), CONTENT_PREFIX_CHARS);
    }

    #[tokio::test]
    async fn local_files_keep_order_and_infer_type() {
        let mut csv = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(csv, "analito,valor\nGlucosa,120").unwrap();
        let mut txt = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(txt, "Colesterol: 210 mg/dL").unwrap();

        let records = ingest(&[
            InputSource::local(txt.path()),
            InputSource::local(csv.path()),
        ])
        .await
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].media_type, "text/plain");
        assert_eq!(records[1].media_type, "text/csv");
        assert!(records[1].content.contains("Glucosa,120"));
    }

    #[tokio::test]
    async fn missing_local_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sample_data.csv");
        let err = ingest(&[InputSource::local(&missing)]).await.unwrap_err();
        assert!(matches!(err, AssistantError::FileNotFound(path) if path == missing));
    }

    #[test]
    fn empty_upload_type_falls_back_to_extension() {
        assert_eq!(media_type_for_name("photo.JPG"), "image/jpeg");
        assert!(media_type_for_name("panel.xlsx").starts_with("application/vnd"));
        assert_eq!(media_type_for_name("README"), "application/octet-stream");
    }
}
