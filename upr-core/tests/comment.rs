use std::io::Write;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use tempfile::NamedTempFile;
use upr_core::collect::UploadGroup;
use upr_core::comment::{assemble, read_summary, CommentError, CommentMeta};

fn meta(summary: &str) -> CommentMeta {
    CommentMeta {
        commit_id: None,
        title: None,
        summary: summary.to_string(),
    }
}

#[test]
fn summary_only_comment_has_no_upload_section() {
    let body = assemble(&meta("Build passed."), &UploadGroup::new(), None).unwrap();

    assert!(body.contains("Build passed."));
    assert!(!body.contains("Uploads"));
    assert!(!body.contains("Commit"));
    assert!(!body.contains("###"));
}

#[test]
fn title_and_commit_are_rendered_when_supplied() {
    let meta = CommentMeta {
        commit_id: Some("abc123".into()),
        title: Some("Nightly build".into()),
        summary: "All green.".into(),
    };
    let body = assemble(&meta, &UploadGroup::new(), None).unwrap();

    assert!(body.contains("### Nightly build"));
    assert!(body.contains("`abc123`"));
    let title_at = body.find("Nightly build").unwrap();
    let summary_at = body.find("All green.").unwrap();
    assert!(title_at < summary_at);
}

#[test]
fn uploads_are_listed_per_directory_with_failures_marked() {
    let mut uploads = UploadGroup::new();
    let ok = uploads.insert(PathBuf::from("dist/app.tar.gz")).unwrap();
    uploads.insert(PathBuf::from("dist/app.sig")).unwrap();
    let log = uploads.insert(PathBuf::from("logs/build.log")).unwrap();
    uploads.set_url(ok, "https://s3.example.com/ci/dist/app.tar.gz".into());
    uploads.set_url(log, "https://s3.example.com/ci/logs/build.log".into());

    let body = assemble(&meta("Done."), &uploads, None).unwrap();

    assert!(body.contains("#### Uploads"));
    assert!(body.contains("**dist**"));
    assert!(body.contains("**logs**"));
    assert!(body.contains("[app.tar.gz](https://s3.example.com/ci/dist/app.tar.gz)"));
    assert!(body.contains("[build.log](https://s3.example.com/ci/logs/build.log)"));
    assert!(body.contains("app.sig _(upload failed)_"));
    assert!(body.find("**dist**").unwrap() < body.find("**logs**").unwrap());
    assert!(!body.contains("available until"));
}

#[test]
fn expiry_date_is_shown_with_uploads() {
    let mut uploads = UploadGroup::new();
    let id = uploads.insert(PathBuf::from("report.html")).unwrap();
    uploads.set_url(id, "https://swift.example.com/v1/AUTH_ci/ci/report.html".into());
    let expires = Utc.with_ymd_and_hms(2024, 3, 18, 0, 0, 0).unwrap();

    let body = assemble(&meta("Done."), &uploads, Some(expires)).unwrap();

    assert!(body.contains("available until 2024-03-18"));
}

#[test]
fn markdown_in_the_summary_is_not_escaped() {
    let summary = "**bold** <details>`code` & more</details>";
    let body = assemble(&meta(summary), &UploadGroup::new(), None).unwrap();
    assert!(body.contains(summary));
}

#[test]
fn read_summary_returns_file_contents_verbatim() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "line one\nline two\n").unwrap();
    assert_eq!(read_summary(file.path()).unwrap(), "line one\nline two\n");
}

#[test]
fn missing_summary_file_is_an_error() {
    let err = read_summary(std::path::Path::new("no/such/summary.md")).unwrap_err();
    assert!(matches!(err, CommentError::ReadSummary { .. }));
    assert!(err.to_string().contains("no/such/summary.md"));
}
