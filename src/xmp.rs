//! XMP Packet Model
//!
//! Namespace URI -> property -> value. Ordered maps keep serialized packets
//! deterministic.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
pub const NS_XMP_MM: &str = "http://ns.adobe.com/xap/1.0/mm/";
pub const NS_PHOTOSHOP: &str = "http://ns.adobe.com/photoshop/1.0/";
pub const NS_CAMERA_RAW: &str = "http://ns.adobe.com/camera-raw-settings/1.0/";
pub const NS_EXIF: &str = "http://ns.adobe.com/exif/1.0/";
pub const NS_TIFF: &str = "http://ns.adobe.com/tiff/1.0/";

pub const DOCUMENT_ANCESTORS: &str = "DocumentAncestors";

const KNOWN_PREFIXES: [(&str, &str); 7] = [
    (NS_DC, "dc"),
    (NS_XMP, "xmp"),
    (NS_XMP_MM, "xmpMM"),
    (NS_PHOTOSHOP, "photoshop"),
    (NS_CAMERA_RAW, "crs"),
    (NS_EXIF, "exif"),
    (NS_TIFF, "tiff"),
];

const PACKET_HEADER: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n";
const PACKET_TRAILER: &str = "\n<?xpacket end=\"w\"?>";

#[derive(Debug, Error)]
#[error("XMP serialization failed: {0}")]
pub struct XmpError(String);

fn xml_err(e: impl std::fmt::Display) -> XmpError {
    XmpError(e.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct XmpPacket {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl XmpPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, namespace: &str, property: &str, value: impl Into<String>) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(property.to_string(), value.into());
    }

    pub fn get(&self, namespace: &str, property: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|props| props.get(property))
            .map(String::as_str)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(BTreeMap::is_empty)
    }

    pub fn remove_all(&mut self) {
        self.namespaces.clear();
    }

    pub fn remove_namespace(&mut self, namespace: &str) {
        self.namespaces.remove(namespace);
    }

    pub fn delete_property(&mut self, namespace: &str, property: &str) {
        if let Some(props) = self.namespaces.get_mut(namespace) {
            props.remove(property);
            if props.is_empty() {
                self.namespaces.remove(namespace);
            }
        }
    }

    /// Serializes to an `x:xmpmeta` packet with one `rdf:Description`.
    pub fn to_xml(&self) -> Result<Vec<u8>, XmpError> {
        let mut prefixes = Vec::new();
        let mut unknown = 0;
        for namespace in self.namespaces.keys() {
            let prefix = match KNOWN_PREFIXES.iter().find(|(ns, _)| *ns == namespace.as_str()) {
                Some((_, prefix)) => prefix.to_string(),
                None => {
                    unknown += 1;
                    format!("ns{}", unknown)
                }
            };
            prefixes.push((namespace.as_str(), prefix));
        }

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);

        let mut meta = BytesStart::new("x:xmpmeta");
        meta.push_attribute(("xmlns:x", "adobe:ns:meta/"));
        writer.write_event(Event::Start(meta)).map_err(xml_err)?;

        let mut rdf = BytesStart::new("rdf:RDF");
        rdf.push_attribute(("xmlns:rdf", NS_RDF));
        writer.write_event(Event::Start(rdf)).map_err(xml_err)?;

        let mut description = BytesStart::new("rdf:Description");
        description.push_attribute(("rdf:about", ""));
        for (namespace, prefix) in &prefixes {
            description.push_attribute((format!("xmlns:{}", prefix).as_str(), *namespace));
        }
        for (namespace, prefix) in &prefixes {
            for (property, value) in &self.namespaces[*namespace] {
                description.push_attribute((format!("{}:{}", prefix, property).as_str(), value.as_str()));
            }
        }
        writer.write_event(Event::Empty(description)).map_err(xml_err)?;

        writer.write_event(Event::End(BytesEnd::new("rdf:RDF"))).map_err(xml_err)?;
        writer.write_event(Event::End(BytesEnd::new("x:xmpmeta"))).map_err(xml_err)?;

        let body = writer.into_inner();
        let mut packet = Vec::with_capacity(PACKET_HEADER.len() + body.len() + PACKET_TRAILER.len());
        packet.extend_from_slice(PACKET_HEADER.as_bytes());
        packet.extend_from_slice(&body);
        packet.extend_from_slice(PACKET_TRAILER.as_bytes());
        Ok(packet)
    }
}
