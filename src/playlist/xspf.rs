//! XSPF read/write (§4.D), preserving any XML extension element the writer
//! does not own — both at `<playlist>` level and per-`<track>` — so a
//! round trip never drops data a foreign tool wrote.
//!
//! No teacher module parses XML; this is built directly from the spec's
//! contract using `quick-xml`'s event reader/writer, the same low-level
//! event API `other_examples`' Subsonic-shaped servers use for their wire
//! formats (see DESIGN.md). A typed `serde`-only (de)serializer was
//! rejected: it would silently drop any element under a namespace it
//! doesn't know about, which the round-trip invariant (§8) forbids.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::model::ForeignExtension;

pub const MEZIANTOU_NS: &str = "http://meziantou.net/xspf-extension/1/";
const XSPF_NS: &str = "http://xspf.org/ns/0/";

#[derive(Debug, Clone, Default)]
pub struct XspfTrack {
    pub location: String,
    pub added_at: Option<String>,
    pub extensions: Vec<ForeignExtension>,
}

#[derive(Debug, Clone, Default)]
pub struct XspfDocument {
    pub title: Option<String>,
    pub annotation: Option<String>,
    pub tracks: Vec<XspfTrack>,
    pub extensions: Vec<ForeignExtension>,
}

pub fn parse(xml: &str) -> Result<XspfDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = XspfDocument::default();
    let mut in_track_list = false;
    let mut current_track: Option<XspfTrack> = None;

    loop {
        match reader.read_event().map_err(Error::from)? {
            Event::Start(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "playlist" => {}
                    "trackList" => in_track_list = true,
                    "track" if in_track_list => current_track = Some(XspfTrack::default()),
                    "title" if !in_track_list => {
                        doc.title = Some(read_text(&mut reader)?);
                    }
                    "annotation" if !in_track_list => {
                        doc.annotation = Some(read_text(&mut reader)?);
                    }
                    "location" if current_track.is_some() => {
                        let text = read_text(&mut reader)?;
                        if let Some(track) = current_track.as_mut() {
                            track.location = text;
                        }
                    }
                    "addedAt" if current_track.is_some() => {
                        let text = read_text(&mut reader)?;
                        if let Some(track) = current_track.as_mut() {
                            track.added_at = Some(text);
                        }
                    }
                    _ => {
                        let raw = capture_raw_element(&mut reader, &e)?;
                        let ext = ForeignExtension { raw_xml: raw };
                        match current_track.as_mut() {
                            Some(track) => track.extensions.push(ext),
                            None => doc.extensions.push(ext),
                        }
                    }
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if name == "location" {
                    if let Some(track) = current_track.as_mut() {
                        track.location = String::new();
                    }
                } else {
                    let raw = String::from_utf8_lossy(&e.to_vec()).into_owned();
                    let ext = ForeignExtension {
                        raw_xml: format!("<{raw}/>"),
                    };
                    match current_track.as_mut() {
                        Some(track) => track.extensions.push(ext),
                        None => doc.extensions.push(ext),
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "track" => {
                        if let Some(track) = current_track.take() {
                            doc.tracks.push(track);
                        }
                    }
                    "trackList" => in_track_list = false,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

pub fn serialize(doc: &XspfDocument) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<playlist version=\"1\" xmlns=\"{XSPF_NS}\" xmlns:meziantou=\"{MEZIANTOU_NS}\">\n"
    ));

    if let Some(title) = &doc.title {
        out.push_str(&format!("  <title>{}</title>\n", escape(title)));
    }
    if let Some(annotation) = &doc.annotation {
        out.push_str(&format!("  <annotation>{}</annotation>\n", escape(annotation)));
    }
    for ext in &doc.extensions {
        out.push_str("  ");
        out.push_str(&ext.raw_xml);
        out.push('\n');
    }

    out.push_str("  <trackList>\n");
    for track in &doc.tracks {
        out.push_str("    <track>\n");
        out.push_str(&format!("      <location>{}</location>\n", escape(&track.location)));
        if let Some(added_at) = &track.added_at {
            out.push_str(&format!(
                "      <meziantou:addedAt>{}</meziantou:addedAt>\n",
                escape(added_at)
            ));
        }
        for ext in &track.extensions {
            out.push_str("      ");
            out.push_str(&ext.raw_xml);
            out.push('\n');
        }
        out.push_str("    </track>\n");
    }
    out.push_str("  </trackList>\n");
    out.push_str("</playlist>\n");
    out
}

fn local_name(e: &BytesStart) -> String {
    let qname = e.name();
    let (local, _) = split_qname(qname);
    local
}

fn split_qname(qname: QName) -> (String, Option<String>) {
    let raw = String::from_utf8_lossy(qname.as_ref()).into_owned();
    match raw.split_once(':') {
        Some((prefix, local)) => (local.to_string(), Some(prefix.to_string())),
        None => (raw, None),
    }
}

fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    match reader.read_event().map_err(Error::from)? {
        Event::Text(t) => Ok(t.unescape().map_err(Error::from)?.into_owned()),
        Event::End(_) => Ok(String::new()),
        other => {
            // Unexpected nested markup inside a leaf element; keep going
            // rather than failing the whole parse.
            let _ = other;
            Ok(String::new())
        }
    }
}

/// Re-emit `start` and every event up to its matching `End`, verbatim, so
/// the caller can store the whole element (including nested content) as an
/// opaque string.
fn capture_raw_element(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Start(start.to_owned()))
        .map_err(Error::from)?;

    let mut depth = 1;
    loop {
        let event = reader.read_event().map_err(Error::from)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(&event).map_err(Error::from)?;
        if depth == 0 {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned())
}
