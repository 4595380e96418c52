//! EPUB fixtures for backend tests.

use std::io::Write;
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Serializes a minimal EPUB with the given Dublin Core fields.
pub(crate) fn epub_bytes(title: &str, authors: &[&str], tags: &[&str]) -> Vec<u8> {
    let creators: String =
        authors.iter().map(|a| format!("<dc:creator>{a}</dc:creator>")).collect();
    let subjects: String = tags.iter().map(|t| format!("<dc:subject>{t}</dc:subject>")).collect();
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/" version="3.0">
  <metadata><dc:title>{title}</dc:title>{creators}{subjects}</metadata>
  <manifest/>
  <spine/>
</package>"#
    );

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(CONTAINER_XML.as_bytes()).unwrap();
    zip.start_file("OEBPS/content.opf", options).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Writes a minimal EPUB file directly into a library root.
pub(crate) fn write_epub(path: &Path, title: &str, authors: &[&str], tags: &[&str]) {
    std::fs::write(path, epub_bytes(title, authors, tags)).unwrap();
}
