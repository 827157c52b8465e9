//! GPX document model and XML reader/writer.
//!
//! GPX files are handled at the XML level with `quick-xml` because the summit
//! tooling relies on a custom waypoint extension (`<rr:dobih_number>`) that
//! schema-bound GPX parsers discard. The reader matches elements by local name
//! so any prefix bound to the running-routes namespace is accepted; the writer
//! always emits the `rr` prefix and declares the namespace on the root element
//! when at least one waypoint carries a DoBIH number.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, RouteToolError};
use crate::GpsPoint;

/// Namespace for the running-routes waypoint extensions.
pub const RR_NAMESPACE: &str = "http://thomasturrell.github.io/running-routes/schema/v1";

/// Schema location for the running-routes extension XSD.
pub const RR_SCHEMA: &str = "https://thomasturrell.github.io/running-routes/schema/v1/gpx-extension.xsd";

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const GPX_SCHEMA: &str = "https://www.topografix.com/GPX/1/1/gpx.xsd";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Creator string written to generated GPX files.
pub const DEFAULT_CREATOR: &str = "fell-routes";

/// A GPX waypoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    /// DoBIH hill number from the `rr:dobih_number` extension
    pub dobih_number: Option<u32>,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }

    /// Whether this waypoint is marked as a summit (case-insensitive, trimmed).
    pub fn is_summit(&self) -> bool {
        self.symbol
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("summit"))
            .unwrap_or(false)
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A single point of a track segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A contiguous run of track points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSegment {
    pub points: Vec<TrackPoint>,
}

/// A GPX track (one leg of a route in the source files).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<TrackSegment>,
}

impl Track {
    pub fn total_points(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }
}

/// An in-memory GPX document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpxFile {
    pub creator: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub waypoints: Vec<Waypoint>,
    pub tracks: Vec<Track>,
}

impl GpxFile {
    /// All track points across tracks and segments, in file order.
    pub fn track_points(&self) -> Vec<GpsPoint> {
        self.tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .flat_map(|s| s.points.iter())
            .map(|p| p.point())
            .collect()
    }

    pub fn has_track_points(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.segments.iter().any(|s| !s.points.is_empty()))
    }
}

fn gpx_err(message: impl Into<String>) -> RouteToolError {
    RouteToolError::Gpx {
        message: message.into(),
    }
}

fn parse_coord(raw: &[u8], what: &str) -> Result<f64> {
    let text = String::from_utf8_lossy(raw);
    text.trim()
        .parse::<f64>()
        .map_err(|_| gpx_err(format!("invalid {} attribute: '{}'", what, text)))
}

fn lat_lon_attrs(e: &BytesStart<'_>, element: &str) -> Result<(f64, f64)> {
    let mut lat = None;
    let mut lon = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| gpx_err(format!("bad attribute on <{}>: {}", element, err)))?;
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_coord(&attr.value, "lat")?),
            b"lon" => lon = Some(parse_coord(&attr.value, "lon")?),
            _ => {}
        }
    }
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => Err(gpx_err(format!("<{}> missing lat/lon attributes", element))),
    }
}

/// Parse a GPX document from a string.
pub fn parse_str(xml: &str) -> Result<GpxFile> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut gpx = GpxFile::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut cur_wpt: Option<Waypoint> = None;
    let mut cur_trk: Option<Track> = None;
    let mut cur_seg: Option<TrackSegment> = None;
    let mut cur_pt: Option<TrackPoint> = None;
    let mut in_metadata = false;
    let mut in_wpt_extensions = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"gpx" => {
                        for attr in e.attributes() {
                            let attr = attr
                                .map_err(|err| gpx_err(format!("bad attribute on <gpx>: {}", err)))?;
                            if attr.key.as_ref() == b"creator" {
                                gpx.creator =
                                    Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"metadata" => in_metadata = true,
                    b"wpt" => {
                        let (lat, lon) = lat_lon_attrs(&e, "wpt")?;
                        cur_wpt = Some(Waypoint::new(lat, lon));
                    }
                    b"trk" => cur_trk = Some(Track::default()),
                    b"trkseg" => cur_seg = Some(TrackSegment::default()),
                    b"trkpt" => {
                        let (lat, lon) = lat_lon_attrs(&e, "trkpt")?;
                        cur_pt = Some(TrackPoint::new(lat, lon));
                    }
                    b"extensions" if cur_wpt.is_some() => in_wpt_extensions = true,
                    _ => {}
                }
                stack.push(local);
            }
            Ok(Event::Empty(e)) => {
                // Self-closing points carry everything in attributes
                match e.local_name().as_ref() {
                    b"wpt" => {
                        let (lat, lon) = lat_lon_attrs(&e, "wpt")?;
                        gpx.waypoints.push(Waypoint::new(lat, lon));
                    }
                    b"trkpt" => {
                        let (lat, lon) = lat_lon_attrs(&e, "trkpt")?;
                        if let Some(seg) = cur_seg.as_mut() {
                            seg.points.push(TrackPoint::new(lat, lon));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|err| gpx_err(format!("bad text content: {}", err)))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let current = stack.last().map(|n| n.as_slice()).unwrap_or(b"");
                match current {
                    b"ele" => {
                        let value = text.parse::<f64>().ok();
                        if let Some(pt) = cur_pt.as_mut() {
                            pt.elevation = value;
                        } else if let Some(wpt) = cur_wpt.as_mut() {
                            wpt.elevation = value;
                        }
                    }
                    b"name" => {
                        if let Some(wpt) = cur_wpt.as_mut() {
                            wpt.name = Some(text.to_string());
                        } else if let Some(trk) = cur_trk.as_mut() {
                            trk.name = Some(text.to_string());
                        } else if in_metadata {
                            gpx.name = Some(text.to_string());
                        }
                    }
                    b"desc" => {
                        if in_metadata && cur_wpt.is_none() {
                            gpx.description = Some(text.to_string());
                        }
                    }
                    b"sym" => {
                        if let Some(wpt) = cur_wpt.as_mut() {
                            wpt.symbol = Some(text.to_string());
                        }
                    }
                    b"dobih_number" => {
                        if in_wpt_extensions {
                            if let Some(wpt) = cur_wpt.as_mut() {
                                wpt.dobih_number = text.parse::<u32>().ok();
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"metadata" => in_metadata = false,
                    b"extensions" => in_wpt_extensions = false,
                    b"wpt" => {
                        if let Some(wpt) = cur_wpt.take() {
                            gpx.waypoints.push(wpt);
                        }
                    }
                    b"trkpt" => {
                        if let (Some(pt), Some(seg)) = (cur_pt.take(), cur_seg.as_mut()) {
                            seg.points.push(pt);
                        }
                    }
                    b"trkseg" => {
                        if let (Some(seg), Some(trk)) = (cur_seg.take(), cur_trk.as_mut()) {
                            trk.segments.push(seg);
                        }
                    }
                    b"trk" => {
                        if let Some(trk) = cur_trk.take() {
                            gpx.tracks.push(trk);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(gpx_err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    err
                )))
            }
        }
    }

    Ok(gpx)
}

/// Read and parse a GPX file.
pub fn read_file(path: &Path) -> Result<GpxFile> {
    let xml = fs::read_to_string(path).map_err(|err| RouteToolError::Io {
        message: format!("cannot read {}: {}", path.display(), err),
    })?;
    parse_str(&xml)
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn format_float(value: f64) -> String {
    // Shortest representation that round-trips
    format!("{}", value)
}

/// Serialize a GPX document to XML.
pub fn to_xml(gpx: &GpxFile) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let has_dobih = gpx.waypoints.iter().any(|w| w.dobih_number.is_some());

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute((
        "creator",
        gpx.creator.as_deref().unwrap_or(DEFAULT_CREATOR),
    ));
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    if has_dobih {
        root.push_attribute(("xmlns:rr", RR_NAMESPACE));
    }
    root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    let schema_location = if has_dobih {
        format!(
            "{} {} {} {}",
            GPX_NAMESPACE, GPX_SCHEMA, RR_NAMESPACE, RR_SCHEMA
        )
    } else {
        format!("{} {}", GPX_NAMESPACE, GPX_SCHEMA)
    };
    root.push_attribute(("xsi:schemaLocation", schema_location.as_str()));
    writer.write_event(Event::Start(root))?;

    if gpx.name.is_some() || gpx.description.is_some() {
        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        if let Some(name) = &gpx.name {
            write_text_element(&mut writer, "name", name)?;
        }
        if let Some(desc) = &gpx.description {
            write_text_element(&mut writer, "desc", desc)?;
        }
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
    }

    for wpt in &gpx.waypoints {
        let mut start = BytesStart::new("wpt");
        start.push_attribute(("lat", format_float(wpt.latitude).as_str()));
        start.push_attribute(("lon", format_float(wpt.longitude).as_str()));
        writer.write_event(Event::Start(start))?;
        if let Some(ele) = wpt.elevation {
            write_text_element(&mut writer, "ele", &format_float(ele))?;
        }
        if let Some(name) = &wpt.name {
            write_text_element(&mut writer, "name", name)?;
        }
        if let Some(sym) = &wpt.symbol {
            write_text_element(&mut writer, "sym", sym)?;
        }
        if let Some(number) = wpt.dobih_number {
            writer.write_event(Event::Start(BytesStart::new("extensions")))?;
            write_text_element(&mut writer, "rr:dobih_number", &number.to_string())?;
            writer.write_event(Event::End(BytesEnd::new("extensions")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("wpt")))?;
    }

    for trk in &gpx.tracks {
        writer.write_event(Event::Start(BytesStart::new("trk")))?;
        if let Some(name) = &trk.name {
            write_text_element(&mut writer, "name", name)?;
        }
        for seg in &trk.segments {
            writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
            for pt in &seg.points {
                let mut start = BytesStart::new("trkpt");
                start.push_attribute(("lat", format_float(pt.latitude).as_str()));
                start.push_attribute(("lon", format_float(pt.longitude).as_str()));
                if let Some(ele) = pt.elevation {
                    writer.write_event(Event::Start(start))?;
                    write_text_element(&mut writer, "ele", &format_float(ele))?;
                    writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
                } else {
                    writer.write_event(Event::Empty(start))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("trk")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;

    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|err| gpx_err(format!("invalid UTF-8 in output: {}", err)))
}

/// Serialize and write a GPX document to a file.
pub fn write_file(path: &Path, gpx: &GpxFile) -> Result<()> {
    let xml = to_xml(gpx)?;
    fs::write(path, xml).map_err(|err| RouteToolError::Io {
        message: format!("cannot write {}: {}", path.display(), err),
    })
}
