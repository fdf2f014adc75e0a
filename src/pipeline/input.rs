//! Input validation: check uploads and name the students.
//!
//! Uploads arrive as byte buffers (browser multipart or files read by the
//! CLI). We validate the PDF magic bytes (`%PDF`) before handing anything to
//! pdfium so callers get a meaningful error rather than a parser failure.

use crate::error::GraderError;
use crate::output::UploadedPdf;
use std::collections::HashSet;
use tracing::debug;

/// Reject uploads that are empty or lack the `%PDF` signature.
pub fn validate_pdf(upload: &UploadedPdf) -> Result<(), GraderError> {
    let bytes = &upload.bytes;
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(GraderError::NotAPdf {
            name: upload.file_name.clone(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    debug!("Validated PDF upload: {} ({} bytes)", upload.file_name, bytes.len());
    Ok(())
}

/// Derive a student name from an uploaded file name.
///
/// Strips any directory part and a trailing `.pdf` (any case).
/// `"uploads/Jane Doe.PDF"` → `"Jane Doe"`.
pub fn student_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let has_pdf_ext = base
        .len()
        .checked_sub(4)
        .and_then(|i| base.get(i..))
        .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"));
    let stem = if has_pdf_ext {
        &base[..base.len() - 4]
    } else {
        base
    };
    if stem.is_empty() {
        "Student".to_string()
    } else {
        stem.to_string()
    }
}

/// Name every upload, suffixing duplicates with ` (2)`, ` (3)`, ….
///
/// `manual_name` replaces the derived name when exactly one file is uploaded.
/// The returned names are unique even when a suffixed name was itself an
/// uploaded file name.
pub fn name_students(uploads: &[UploadedPdf], manual_name: Option<&str>) -> Vec<String> {
    let manual = manual_name.map(str::trim).filter(|n| !n.is_empty());
    let mut taken: HashSet<String> = HashSet::with_capacity(uploads.len());

    uploads
        .iter()
        .map(|u| {
            let base = match manual {
                Some(name) if uploads.len() == 1 => name.to_string(),
                _ => student_name(&u.file_name),
            };
            let mut name = base.clone();
            let mut n = 2;
            while taken.contains(&name) {
                name = format!("{} ({})", base, n);
                n += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> UploadedPdf {
        UploadedPdf::new(name, bytes.to_vec())
    }

    #[test]
    fn accepts_pdf_magic() {
        assert!(validate_pdf(&upload("a.pdf", b"%PDF-1.7\n...")).is_ok());
    }

    #[test]
    fn rejects_non_pdf() {
        let err = validate_pdf(&upload("notes.txt", b"hello")).unwrap_err();
        match err {
            GraderError::NotAPdf { name, magic } => {
                assert_eq!(name, "notes.txt");
                assert_eq!(magic, b"hell".to_vec());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_upload() {
        assert!(matches!(
            validate_pdf(&upload("empty.pdf", b"")),
            Err(GraderError::NotAPdf { .. })
        ));
    }

    #[test]
    fn student_name_strips_extension_and_dirs() {
        assert_eq!(student_name("alice.pdf"), "alice");
        assert_eq!(student_name("Bob Smith.PDF"), "Bob Smith");
        assert_eq!(student_name("C:\\scans\\carol.pdf"), "carol");
        assert_eq!(student_name("scans/dave"), "dave");
        assert_eq!(student_name(".pdf"), "Student");
        assert_eq!(student_name("José"), "José");
    }

    #[test]
    fn duplicate_names_are_suffixed() {
        let uploads = vec![
            upload("a/alice.pdf", b"%PDF"),
            upload("b/alice.pdf", b"%PDF"),
            upload("bob.pdf", b"%PDF"),
            upload("c/alice.pdf", b"%PDF"),
        ];
        assert_eq!(
            name_students(&uploads, None),
            vec!["alice", "alice (2)", "bob", "alice (3)"]
        );

        // A real "alice (2)" must not collide with a generated suffix.
        let uploads = vec![
            upload("alice.pdf", b"%PDF"),
            upload("x/alice.pdf", b"%PDF"),
            upload("alice (2).pdf", b"%PDF"),
        ];
        assert_eq!(
            name_students(&uploads, None),
            vec!["alice", "alice (2)", "alice (2) (2)"]
        );

        let uploads = vec![
            upload("alice (2).pdf", b"%PDF"),
            upload("alice.pdf", b"%PDF"),
            upload("b/alice.pdf", b"%PDF"),
        ];
        assert_eq!(
            name_students(&uploads, None),
            vec!["alice (2)", "alice", "alice (3)"]
        );
    }

    #[test]
    fn manual_name_only_applies_to_single_upload() {
        let one = vec![upload("scan0001.pdf", b"%PDF")];
        assert_eq!(name_students(&one, Some(" Erin ")), vec!["Erin"]);

        let two = vec![upload("x.pdf", b"%PDF"), upload("y.pdf", b"%PDF")];
        assert_eq!(name_students(&two, Some("Erin")), vec!["x", "y"]);

        assert_eq!(name_students(&one, Some("   ")), vec!["scan0001"]);
    }
}
