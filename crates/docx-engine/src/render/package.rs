//! In-memory OOXML package handling
//!
//! A `.docx` file is a zip archive of XML parts. The package is read fully
//! into memory, edited part by part, and written back to a fresh buffer.
//! Output is deterministic: entries keep their original order, new entries
//! are appended in insertion order, and every entry gets the same fixed
//! timestamp.

use std::io::{Cursor, Read, Write};

use lazy_static::lazy_static;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::drawing::image_relationship;
use crate::context::{ImageKind, InlineImage};
use crate::error::PipelineError;

/// Main document part
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const EMPTY_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
);

lazy_static! {
    /// Parts that may carry template tags
    static ref RENDERABLE_PART: Regex =
        Regex::new(r"^word/(?:document|header\d*|footer\d*|footnotes|endnotes)\.xml$").unwrap();
}

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
}

/// An image stored in the package, shared by every part that shows it
#[derive(Debug, Clone)]
pub struct EmbeddedMedia<'a> {
    /// Context key the image is rendered for
    pub key: &'a str,
    /// Target relative to `word/` (what relationships point at)
    pub target: String,
    pub image: &'a InlineImage,
}

/// A docx package held in memory
#[derive(Debug, Clone)]
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
}

impl DocxPackage {
    /// Read a package from bytes
    pub fn read(bytes: &[u8]) -> Result<Self, PipelineError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            PipelineError::RenderError(format!("template is not a valid docx package: {}", e))
        })?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
            });
        }

        let package = Self { entries };
        if !package.contains(MAIN_DOCUMENT_PART) {
            return Err(PipelineError::RenderError(format!(
                "template has no {} part",
                MAIN_DOCUMENT_PART
            )));
        }
        Ok(package)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// A part decoded as UTF-8 text
    pub fn text(&self, name: &str) -> Result<Option<String>, PipelineError> {
        match self.get(name) {
            None => Ok(None),
            Some(data) => String::from_utf8(data.to_vec()).map(Some).map_err(|_| {
                PipelineError::RenderError(format!("part {} is not valid UTF-8", name))
            }),
        }
    }

    /// Replace a part, or append it if it does not exist yet
    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(PackageEntry {
                name: name.to_string(),
                data,
                compression: CompressionMethod::Deflated,
            }),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Names of the parts that can hold template tags, in package order
    pub fn renderable_parts(&self) -> Vec<String> {
        self.names()
            .filter(|name| RENDERABLE_PART.is_match(name))
            .map(str::to_string)
            .collect()
    }

    /// Store each image once under `word/media/`
    pub fn add_media<'a>(
        &mut self,
        images: impl IntoIterator<Item = (&'a str, &'a InlineImage)>,
    ) -> Vec<EmbeddedMedia<'a>> {
        let mut media = Vec::new();
        let mut counter = 0u32;

        for (key, image) in images {
            let target = loop {
                counter += 1;
                let target = format!("media/docgen_image{}.{}", counter, image.kind().extension());
                if !self.contains(&format!("word/{}", target)) {
                    break target;
                }
            };
            self.entries.push(PackageEntry {
                name: format!("word/{}", target),
                data: image.data().to_vec(),
                compression: CompressionMethod::Stored,
            });
            media.push(EmbeddedMedia { key, target, image });
        }

        media
    }

    /// Add one image relationship per media entry to a part's `.rels` file
    ///
    /// Returns the relationship ids, in the same order as `media`.
    pub fn add_image_relationships(
        &mut self,
        part: &str,
        media: &[EmbeddedMedia<'_>],
    ) -> Result<Vec<String>, PipelineError> {
        let rels_name = relationships_part_for(part);
        let mut rels = self
            .text(&rels_name)?
            .unwrap_or_else(|| EMPTY_RELATIONSHIPS.to_string());

        let mut ids = Vec::with_capacity(media.len());
        let mut additions = String::new();
        let mut counter = 0u32;

        for item in media {
            let id = loop {
                counter += 1;
                let id = format!("rIdDocgen{}", counter);
                if !rels.contains(&format!("Id=\"{}\"", id)) {
                    break id;
                }
            };
            additions.push_str(&image_relationship(&id, &item.target));
            ids.push(id);
        }

        let close = rels.rfind("</Relationships>").ok_or_else(|| {
            PipelineError::RenderError(format!("{} has no closing Relationships tag", rels_name))
        })?;
        rels.insert_str(close, &additions);
        self.set(&rels_name, rels.into_bytes());

        Ok(ids)
    }

    /// Declare default content types for the given image kinds
    pub fn ensure_image_content_types(
        &mut self,
        kinds: impl IntoIterator<Item = ImageKind>,
    ) -> Result<(), PipelineError> {
        let mut types = self.text(CONTENT_TYPES_PART)?.ok_or_else(|| {
            PipelineError::RenderError(format!("template has no {} part", CONTENT_TYPES_PART))
        })?;

        for kind in kinds {
            let lowered = types.to_ascii_lowercase();
            if lowered.contains(&format!("extension=\"{}\"", kind.extension())) {
                continue;
            }
            let close = types.rfind("</Types>").ok_or_else(|| {
                PipelineError::RenderError(format!("{} has no closing Types tag", CONTENT_TYPES_PART))
            })?;
            types.insert_str(
                close,
                &format!(
                    r#"<Default Extension="{}" ContentType="{}"/>"#,
                    kind.extension(),
                    kind.content_type()
                ),
            );
        }

        self.set(CONTENT_TYPES_PART, types.into_bytes());
        Ok(())
    }

    /// Serialize the package to a new in-memory buffer
    pub fn write(&self) -> Result<Vec<u8>, PipelineError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let method = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .last_modified_time(zip::DateTime::default());
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(&entry.data)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
fn relationships_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}
