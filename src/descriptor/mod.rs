//! Descriptor Reader (4.C): tolerant XML parse of a sidecar, hash
//! computation, field extraction.

use crate::error::DescriptorError;
use md5::{Digest, Md5};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::Path;

/// Fields extracted from a sidecar's direct children. `title_sort` already
/// has the title fallback applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorFields {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub aired: Option<String>,
    pub title_sort: Option<String>,
}

/// Read and parse the sidecar at `path`, returning its extracted fields
/// and the MD5 hash of its raw bytes.
pub fn read(path: &Path) -> Result<(DescriptorFields, String), DescriptorError> {
    let bytes = std::fs::read(path).map_err(|source| DescriptorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let hash = hex::encode(Md5::digest(&bytes));
    let fields = parse_fields(&bytes, path)?;

    Ok((fields, hash))
}

fn parse_fields(bytes: &[u8], path: &Path) -> Result<DescriptorFields, DescriptorError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut fields = DescriptorFields::default();
    let mut depth: u32 = 0;
    let mut current_tag: Option<String> = None;
    let mut saw_any_element = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => {
                saw_any_element = true;
                depth += 1;
                if depth == 2 {
                    current_tag = Some(String::from_utf8_lossy(tag.local_name().as_ref()).into_owned());
                } else {
                    current_tag = None;
                }
            }
            Ok(Event::Empty(_)) => {
                saw_any_element = true;
            }
            Ok(Event::Text(text)) => {
                if let Some(tag) = current_tag.as_deref() {
                    let value = text.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        assign_field(&mut fields, tag, value);
                    }
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            // A lenient read: skip anything unparseable rather than aborting,
            // matching the source's `recover=True` XML parser.
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_any_element {
        return Err(DescriptorError::Parse {
            path: path.to_path_buf(),
            reason: "no XML elements found".to_string(),
        });
    }

    if fields.title_sort.is_none() {
        fields.title_sort = fields.title.clone();
    }

    Ok(fields)
}

fn assign_field(fields: &mut DescriptorFields, tag: &str, value: String) {
    match tag {
        "title" => fields.title = Some(value),
        "plot" => fields.summary = Some(value),
        "aired" => fields.aired = Some(value),
        "titleSort" => fields.title_sort = Some(value),
        _ => {}
    }
}
