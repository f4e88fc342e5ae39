//! S3-style XML listing serialization.
//!
//! The only XML document the gateway produces is the `ListBucketResult`
//! for bucket-root listings, following the AWS RestXml conventions:
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Timestamps: ISO 8601 with milliseconds and `Z` suffix
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`
//!
//! Error responses are plain text and never go through this module.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use portico_core::backend::ListEntry;

/// The S3 XML namespace.
const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Storage class reported for every listed object.
const STORAGE_CLASS: &str = "STANDARD";

/// Serialize a bucket listing as a `ListBucketResult` document.
///
/// An empty `entries` slice produces a document with no `Contents`
/// elements.
///
/// # Errors
///
/// Returns `io::Error` if XML writing fails (writing to a `Vec` cannot
/// fail in practice).
pub fn list_bucket_result(bucket: &str, entries: &[ListEntry]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element("ListBucketResult")
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| {
            write_text_element(w, "Name", bucket)?;
            write_text_element(w, "IsTruncated", "false")?;
            for entry in entries {
                w.create_element("Contents").write_inner_content(|c| {
                    write_text_element(c, "Key", &entry.key)?;
                    if let Some(modified) = &entry.last_modified {
                        write_text_element(c, "LastModified", &format_timestamp(modified))?;
                    }
                    if let Some(etag) = &entry.etag {
                        write_text_element(c, "ETag", &format!("\"{etag}\""))?;
                    }
                    write_text_element(c, "Size", &entry.size.to_string())?;
                    write_text_element(c, "StorageClass", STORAGE_CLASS)?;
                    Ok(())
                })?;
            }
            Ok(())
        })?;

    Ok(buf)
}

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

/// Format a timestamp as ISO 8601 with milliseconds and `Z` suffix.
fn format_timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
