use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Broad document category, used for display and for deciding whether a file
/// can be stored as-is or must go through the processor first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Word,
    Spreadsheet,
    Image,
    Markdown,
    Text,
    #[default]
    Other,
}

impl DocumentKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "application/pdf" => Self::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/rtf" => Self::Word,
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "text/csv" => Self::Spreadsheet,
            "text/markdown" => Self::Markdown,
            m if m.starts_with("image/") => Self::Image,
            m if m.starts_with("text/") || m == "application/json" => Self::Text,
            _ => Self::Other,
        }
    }

    /// Plain-text kinds are stored directly; everything else is extracted by
    /// the processing endpoint.
    pub fn is_plain_text(self) -> bool {
        matches!(self, Self::Text | Self::Markdown)
    }
}

#[must_use]
pub fn detect_mime(data: &[u8]) -> Option<String> {
    infer::get(data).map(|info| info.mime_type().to_string())
}

#[must_use]
pub fn detect_mime_from_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    match ext.to_lowercase().as_str() {
        "pdf" => Some("application/pdf".into()),
        "doc" => Some("application/msword".into()),
        "docx" => Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".into(),
        ),
        "rtf" => Some("application/rtf".into()),
        "xls" => Some("application/vnd.ms-excel".into()),
        "xlsx" => {
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".into())
        }
        "csv" => Some("text/csv".into()),
        "md" | "markdown" => Some("text/markdown".into()),
        "txt" | "text" | "log" => Some("text/plain".into()),
        "json" => Some("application/json".into()),
        "jpg" | "jpeg" => Some("image/jpeg".into()),
        "png" => Some("image/png".into()),
        _ => None,
    }
}

/// Magic bytes first, then the file extension.
#[must_use]
pub fn detect_document_type(data: &[u8], filename: &str) -> (String, DocumentKind) {
    let mime = detect_mime(data)
        .or_else(|| detect_mime_from_extension(filename))
        .unwrap_or_else(|| "application/octet-stream".into());
    let kind = DocumentKind::from_mime(&mime);
    (mime, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic_bytes_win_over_extension() {
        let pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
        let (mime, kind) = detect_document_type(pdf, "notes.txt");
        assert_eq!(mime, "application/pdf");
        assert_eq!(kind, DocumentKind::Pdf);
    }

    #[test]
    fn plain_text_falls_back_to_extension() {
        let (mime, kind) = detect_document_type(b"# Goals\n- run", "goals.md");
        assert_eq!(mime, "text/markdown");
        assert_eq!(kind, DocumentKind::Markdown);
        assert!(kind.is_plain_text());
    }

    #[test]
    fn unknown_files_are_octet_streams() {
        let (mime, kind) = detect_document_type(&[0x00, 0x11, 0x22], "blob");
        assert_eq!(mime, "application/octet-stream");
        assert_eq!(kind, DocumentKind::Other);
        assert!(!kind.is_plain_text());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(
            detect_mime_from_extension("Budget.XLSX").as_deref(),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        );
        assert!(detect_mime_from_extension("README").is_none());
    }
}
