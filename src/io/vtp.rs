//! VTK XML PolyData (`.vtp`).
//!
//! Reading goes through `quick_xml::de` into a thin document model; writing
//! streams elements with `quick_xml::Writer`. Only the `Points`, `Polys` and
//! `PointData` sections are interpreted. `Verts`, `Lines`, `Strips`,
//! `CellData` and `FieldData` are ignored on read and not written.
//!
//! Arrays may be `ascii`, inline `binary`, or `appended` to a base64
//! `AppendedData` block, zlib-compressed or not. Raw appended data is not
//! valid text and is rejected. Files are always written as ASCII.
//!
//! The `Normals` and `Vectors` attributes of `PointData` name the arrays
//! that get [`AttributeRole::Normals`] and [`AttributeRole::Vectors`].

use std::io::Write;

use quick_xml::Writer;
use quick_xml::de::from_str;
use quick_xml::events::{BytesDecl, BytesText, Event};
use serde::Deserialize;

use super::vtk_binary::BinaryLayout;
use super::{MeshIoError, MeshIoResult};
use crate::geom::{AttributeRole, PointDataArray, SurfaceMesh};

#[derive(Debug, Deserialize)]
struct VtkFileDoc {
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "@byte_order", default)]
    byte_order: Option<String>,
    #[serde(rename = "@header_type", default)]
    header_type: Option<String>,
    #[serde(rename = "@compressor", default)]
    compressor: Option<String>,
    #[serde(rename = "PolyData")]
    poly_data: PolyDataDoc,
    #[serde(rename = "AppendedData", default)]
    appended: Option<AppendedDoc>,
}

#[derive(Debug, Deserialize)]
struct AppendedDoc {
    #[serde(rename = "@encoding", default)]
    encoding: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PolyDataDoc {
    #[serde(rename = "Piece", default)]
    pieces: Vec<PieceDoc>,
}

#[derive(Debug, Deserialize)]
struct PieceDoc {
    #[serde(rename = "@NumberOfPoints")]
    number_of_points: usize,
    #[serde(rename = "@NumberOfPolys", default)]
    number_of_polys: usize,
    #[serde(rename = "PointData", default)]
    point_data: Option<SectionDoc>,
    #[serde(rename = "Points")]
    points: SectionDoc,
    #[serde(rename = "Polys", default)]
    polys: Option<SectionDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SectionDoc {
    #[serde(rename = "@Normals", default)]
    normals: Option<String>,
    #[serde(rename = "@Vectors", default)]
    vectors: Option<String>,
    #[serde(rename = "DataArray", default)]
    arrays: Vec<DataArrayDoc>,
}

impl SectionDoc {
    fn role_of(&self, name: &str) -> AttributeRole {
        if self.normals.as_deref() == Some(name) {
            AttributeRole::Normals
        } else if self.vectors.as_deref() == Some(name) {
            AttributeRole::Vectors
        } else {
            AttributeRole::Scalars
        }
    }
}

/// Where binary array payloads come from.
struct DataSource {
    layout: BinaryLayout,
    /// Base64 appended stream with the leading `_` and whitespace removed.
    appended: Option<String>,
}

impl DataSource {
    fn new(doc: &VtkFileDoc) -> MeshIoResult<Self> {
        let layout = BinaryLayout::from_attributes(
            doc.byte_order.as_deref(),
            doc.header_type.as_deref(),
            doc.compressor.as_deref(),
        )?;
        let appended = match &doc.appended {
            None => None,
            Some(block) => {
                match block.encoding.as_deref() {
                    Some("base64") => {}
                    other => {
                        return Err(MeshIoError::UnsupportedFormat(format!(
                            "appended encoding {}",
                            other.unwrap_or("raw")
                        )));
                    }
                }
                let stream: String = block.text.split_ascii_whitespace().collect();
                let stream = stream
                    .strip_prefix('_')
                    .ok_or_else(|| MeshIoError::MalformedVtp("AppendedData must start with `_`".to_owned()))?;
                Some(stream.to_owned())
            }
        };
        Ok(Self { layout, appended })
    }
}

#[derive(Debug, Deserialize)]
struct DataArrayDoc {
    #[serde(rename = "@type")]
    data_type: String,
    #[serde(rename = "@Name", default)]
    name: Option<String>,
    #[serde(rename = "@NumberOfComponents", default)]
    components: Option<usize>,
    #[serde(rename = "@format", default)]
    format: Option<String>,
    #[serde(rename = "@offset", default)]
    offset: Option<usize>,
    #[serde(rename = "$text", default)]
    text: String,
}

impl DataArrayDoc {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn is_ascii(&self) -> bool {
        matches!(self.format.as_deref(), None | Some("ascii"))
    }

    /// Decode a `binary` or `appended` payload.
    fn binary_values(&self, source: &DataSource) -> MeshIoResult<Vec<f64>> {
        match self.format.as_deref() {
            Some("binary") => {
                let stream: String = self.text.split_ascii_whitespace().collect();
                source.layout.decode_values(&stream, &self.data_type)
            }
            Some("appended") => {
                let appended = source.appended.as_deref().ok_or_else(|| {
                    MeshIoError::MalformedVtp(format!("array `{}` is appended but the file has no AppendedData", self.label()))
                })?;
                let offset = self.offset.ok_or_else(|| {
                    MeshIoError::MalformedVtp(format!("appended array `{}` has no offset", self.label()))
                })?;
                let stream = appended.get(offset..).ok_or_else(|| {
                    MeshIoError::MalformedVtp(format!("array `{}`: offset {offset} is past the appended data", self.label()))
                })?;
                source.layout.decode_values(stream, &self.data_type)
            }
            other => Err(MeshIoError::UnsupportedFormat(other.unwrap_or("ascii").to_owned())),
        }
    }

    fn floats(&self, source: &DataSource) -> MeshIoResult<Vec<f64>> {
        if !self.is_ascii() {
            return self.binary_values(source);
        }
        self.text
            .split_ascii_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|e| {
                    MeshIoError::MalformedVtp(format!("array `{}`: bad value `{token}`: {e}", self.label()))
                })
            })
            .collect()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn indices(&self, source: &DataSource) -> MeshIoResult<Vec<u64>> {
        if !self.is_ascii() {
            return self
                .binary_values(source)?
                .into_iter()
                .map(|v| {
                    if v >= 0.0 && v.fract() == 0.0 && v < 2f64.powi(53) {
                        Ok(v as u64)
                    } else {
                        Err(MeshIoError::MalformedVtp(format!("array `{}`: bad index {v}", self.label())))
                    }
                })
                .collect();
        }
        self.text
            .split_ascii_whitespace()
            .map(|token| {
                token.parse::<u64>().map_err(|e| {
                    MeshIoError::MalformedVtp(format!("array `{}`: bad index `{token}`: {e}", self.label()))
                })
            })
            .collect()
    }
}

/// Parse a `.vtp` document.
pub fn parse_str(input: &str) -> MeshIoResult<SurfaceMesh> {
    let doc: VtkFileDoc = from_str(input)?;
    if let Some(kind) = doc.kind.as_deref() {
        if kind != "PolyData" {
            return Err(MeshIoError::MalformedVtp(format!("expected PolyData, found `{kind}`")));
        }
    }
    let source = DataSource::new(&doc)?;

    let mut pieces = doc.poly_data.pieces.into_iter();
    let piece = pieces
        .next()
        .ok_or_else(|| MeshIoError::MalformedVtp("no Piece element".to_owned()))?;
    if pieces.next().is_some() {
        return Err(MeshIoError::MalformedVtp("multi-piece files are not supported".to_owned()));
    }

    let positions = read_points(&piece, &source)?;
    let faces = match &piece.polys {
        Some(polys) => read_polys(polys, positions.len(), &source)?,
        None => Vec::new(),
    };
    if faces.len() != piece.number_of_polys {
        return Err(MeshIoError::MalformedVtp(format!(
            "NumberOfPolys is {} but {} polygons were read",
            piece.number_of_polys,
            faces.len()
        )));
    }

    let mut mesh = SurfaceMesh::new(positions, faces);
    if let Some(section) = &piece.point_data {
        for array in &section.arrays {
            let name = array
                .name
                .clone()
                .ok_or_else(|| MeshIoError::MalformedVtp("PointData array without Name".to_owned()))?;
            let components = array.components.unwrap_or(1).max(1);
            let values = array.floats(&source)?;
            if values.len() != components * piece.number_of_points {
                return Err(MeshIoError::MalformedVtp(format!(
                    "PointData `{name}` has {} values, expected {}",
                    values.len(),
                    components * piece.number_of_points
                )));
            }
            let role = section.role_of(&name);
            mesh.point_data
                .push(PointDataArray::new(name, array.data_type.clone(), components, values).with_role(role));
        }
    }
    Ok(mesh)
}

fn read_points(piece: &PieceDoc, source: &DataSource) -> MeshIoResult<Vec<[f64; 3]>> {
    let array = piece
        .points
        .arrays
        .first()
        .ok_or_else(|| MeshIoError::MalformedVtp("Points section has no DataArray".to_owned()))?;
    if array.components.unwrap_or(3) != 3 {
        return Err(MeshIoError::MalformedVtp("Points must have 3 components".to_owned()));
    }
    let values = array.floats(source)?;
    if values.len() != 3 * piece.number_of_points {
        return Err(MeshIoError::MalformedVtp(format!(
            "NumberOfPoints is {} but {} coordinates were read",
            piece.number_of_points,
            values.len()
        )));
    }
    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn read_polys(section: &SectionDoc, vertex_count: usize, source: &DataSource) -> MeshIoResult<Vec<Vec<u32>>> {
    let find = |name: &str| {
        section
            .arrays
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .ok_or_else(|| MeshIoError::MalformedVtp(format!("Polys section has no `{name}` array")))
    };
    let connectivity = find("connectivity")?.indices(source)?;
    let offsets = find("offsets")?.indices(source)?;

    let mut faces = Vec::with_capacity(offsets.len());
    let mut start = 0usize;
    for &end in &offsets {
        let end = usize::try_from(end)
            .map_err(|_| MeshIoError::MalformedVtp("offset exceeds address space".to_owned()))?;
        if end < start || end > connectivity.len() {
            return Err(MeshIoError::MalformedVtp(format!(
                "offset {end} out of order or beyond connectivity length {}",
                connectivity.len()
            )));
        }
        let face = connectivity[start..end]
            .iter()
            .map(|&index| {
                u32::try_from(index)
                    .ok()
                    .filter(|&i| (i as usize) < vertex_count)
                    .ok_or_else(|| {
                        MeshIoError::MalformedVtp(format!(
                            "connectivity index {index} out of range for {vertex_count} points"
                        ))
                    })
            })
            .collect::<MeshIoResult<Vec<u32>>>()?;
        faces.push(face);
        start = end;
    }
    if start != connectivity.len() {
        return Err(MeshIoError::MalformedVtp(
            "connectivity has entries past the last offset".to_owned(),
        ));
    }
    Ok(faces)
}

/// Write a mesh as an ASCII `.vtp` document.
pub fn write<W: Write>(w: W, mesh: &SurfaceMesh) -> MeshIoResult<()> {
    let mut writer = Writer::new_with_indent(w, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

    let number_of_points = mesh.vertex_count().to_string();
    let number_of_polys = mesh.face_count().to_string();

    writer
        .create_element("VTKFile")
        .with_attributes([
            ("type", "PolyData"),
            ("version", "1.0"),
            ("byte_order", "LittleEndian"),
            ("header_type", "UInt64"),
        ])
        .write_inner_content(|w| {
            w.create_element("PolyData").write_inner_content(|w| {
                w.create_element("Piece")
                    .with_attributes([
                        ("NumberOfPoints", number_of_points.as_str()),
                        ("NumberOfVerts", "0"),
                        ("NumberOfLines", "0"),
                        ("NumberOfStrips", "0"),
                        ("NumberOfPolys", number_of_polys.as_str()),
                    ])
                    .write_inner_content(|w| write_piece(w, mesh))?;
                Ok::<(), quick_xml::Error>(())
            })?;
            Ok::<(), quick_xml::Error>(())
        })?;

    let mut inner = writer.into_inner();
    inner.write_all(b"\n")?;
    Ok(())
}

fn write_piece<W: Write>(w: &mut Writer<W>, mesh: &SurfaceMesh) -> quick_xml::Result<()> {
    if !mesh.point_data.is_empty() {
        let active = |role: AttributeRole| {
            mesh.point_data
                .iter()
                .find(|a| a.effective_role() == role)
                .map(|a| a.name.as_str())
        };
        let mut roles = Vec::new();
        if let Some(name) = active(AttributeRole::Normals) {
            roles.push(("Normals", name));
        }
        if let Some(name) = active(AttributeRole::Vectors) {
            roles.push(("Vectors", name));
        }
        w.create_element("PointData").with_attributes(roles).write_inner_content(|w| {
            for array in &mesh.point_data {
                let width = array.components.max(1);
                let components = width.to_string();
                let text = if array.is_integral() {
                    format_tuples(array.values.chunks(width), |v: f64| format!("{}", v.round() as i64))
                } else {
                    format_tuples(array.values.chunks(width), |v: f64| format!("{v}"))
                };
                w.create_element("DataArray")
                    .with_attributes([
                        ("type", array.data_type.as_str()),
                        ("Name", array.name.as_str()),
                        ("NumberOfComponents", components.as_str()),
                        ("format", "ascii"),
                    ])
                    .write_text_content(BytesText::new(&text))?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;
    }

    w.create_element("Points").write_inner_content(|w| {
        let text = format_tuples(mesh.positions.iter().map(|p| p.as_slice()), |v: f64| format!("{v}"));
        w.create_element("DataArray")
            .with_attributes([
                ("type", "Float64"),
                ("Name", "Points"),
                ("NumberOfComponents", "3"),
                ("format", "ascii"),
            ])
            .write_text_content(BytesText::new(&text))?;
        Ok::<(), quick_xml::Error>(())
    })?;

    w.create_element("Polys").write_inner_content(|w| {
        let connectivity = format_tuples(mesh.faces.iter().map(Vec::as_slice), |i: u32| i.to_string());
        let mut offsets = Vec::with_capacity(mesh.faces.len());
        let mut end = 0usize;
        for face in &mesh.faces {
            end += face.len();
            offsets.push(end.to_string());
        }
        w.create_element("DataArray")
            .with_attributes([("type", "Int64"), ("Name", "connectivity"), ("format", "ascii")])
            .write_text_content(BytesText::new(&connectivity))?;
        w.create_element("DataArray")
            .with_attributes([("type", "Int64"), ("Name", "offsets"), ("format", "ascii")])
            .write_text_content(BytesText::new(&offsets.join(" ")))?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(())
}

/// One tuple per line, values space-separated.
fn format_tuples<'a, T, I, F>(tuples: I, fmt: F) -> String
where
    T: Copy + 'a,
    I: IntoIterator<Item = &'a [T]>,
    F: Fn(T) -> String,
{
    tuples
        .into_iter()
        .map(|tuple| tuple.iter().map(|&v| fmt(v)).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::test_fixtures::create_unit_cube;

    const TRIANGLE_VTP: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="4" NumberOfVerts="0" NumberOfLines="0" NumberOfStrips="0" NumberOfPolys="2">
      <PointData Scalars="InsertionID">
        <DataArray type="Int64" Name="InsertionID" format="ascii" RangeMin="0" RangeMax="2">
          0 2 0 1
        </DataArray>
      </PointData>
      <CellData>
      </CellData>
      <Points>
        <DataArray type="Float32" Name="Points" NumberOfComponents="3" format="ascii">
          0 0 0 1 0 0
          1 1 0 0 1 0.5
        </DataArray>
      </Points>
      <Polys>
        <DataArray type="Int64" Name="connectivity" format="ascii">
          0 1 2 0 2 3
        </DataArray>
        <DataArray type="Int64" Name="offsets" format="ascii">
          3 6
        </DataArray>
      </Polys>
    </Piece>
  </PolyData>
</VTKFile>
"#;

    #[test]
    fn test_parse_vtk_written_document() {
        let mesh = parse_str(TRIANGLE_VTP).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.positions[3], [0.0, 1.0, 0.5]);
        assert_eq!(mesh.faces, vec![vec![0, 1, 2], vec![0, 2, 3]]);
        assert_eq!(mesh.point_data.len(), 1);
        let ids = &mesh.point_data[0];
        assert_eq!(ids.name, "InsertionID");
        assert_eq!(ids.data_type, "Int64");
        assert_eq!(ids.values, vec![0.0, 2.0, 0.0, 1.0]);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_write_then_parse_is_exact() {
        let mut cube = create_unit_cube();
        cube.positions[6] = [1.0 / 3.0, 0.1 + 0.2, -1e-17];
        cube.faces.push(vec![0, 1, 2, 3]);
        let mut buf = Vec::new();
        write(&mut buf, &cube).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#"NumberOfPolys="13""#));
        assert_eq!(parse_str(&text).unwrap(), cube);
    }

    const BINARY_VTP: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="BigEndian">
  <PolyData>
    <Piece NumberOfPoints="4" NumberOfPolys="2">
      <PointData>
        <DataArray type="Int32" Name="InsertionID" format="binary">
          AAAAEAAAAAAAAAACAAAAAAAAAAE=
        </DataArray>
      </PointData>
      <Points>
        <DataArray type="Float64" Name="Points" NumberOfComponents="3" format="binary">
          AAAAYAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAD/wAAAAAAAAAAAAAAAAAAAAAAAAAAAAAD/wAAAAAAAAP/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAP/AAAAAAAAA/4AAAAAAAAA==
        </DataArray>
      </Points>
      <Polys>
        <DataArray type="Int32" Name="connectivity" format="binary">
          AAAAGAAAAAAAAAABAAAAAgAAAAAAAAACAAAAAw==
        </DataArray>
        <DataArray type="Int32" Name="offsets" format="binary">
          AAAACAAAAAMAAAAG
        </DataArray>
      </Polys>
    </Piece>
  </PolyData>
</VTKFile>
"#;

    const APPENDED_VTP: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/cube_appended.vtp"));

    #[test]
    fn test_reads_inline_binary_arrays() {
        let binary = parse_str(BINARY_VTP).unwrap();
        let ascii = parse_str(TRIANGLE_VTP).unwrap();
        assert_eq!(binary.positions, ascii.positions);
        assert_eq!(binary.faces, ascii.faces);
        assert_eq!(binary.point_data[0].values, ascii.point_data[0].values);
    }

    #[test]
    fn test_reads_compressed_appended_file() {
        let mesh = parse_str(APPENDED_VTP).unwrap();
        let cube = create_unit_cube();
        assert_eq!(mesh.positions, cube.positions);
        assert_eq!(mesh.faces, cube.faces);

        let ids = &mesh.point_data[0];
        assert_eq!((ids.name.as_str(), ids.role), ("InsertionID", AttributeRole::Scalars));
        assert_eq!(ids.values, vec![0.0, 1.0, 1.0, 0.0, 2.0, 2.0, 0.0, 0.0]);

        let normals = &mesh.point_data[1];
        assert_eq!(normals.role, AttributeRole::Normals);
        for (read, computed) in normals.vectors().unwrap().iter().zip(cube.vertex_normals()) {
            assert!((*read - computed.unwrap()).length() < 1e-6);
        }
        mesh.validate().unwrap();
    }

    #[test]
    fn test_rejects_raw_and_unknown_encodings() {
        let raw = APPENDED_VTP.replace(r#"encoding="base64""#, r#"encoding="raw""#);
        assert!(matches!(parse_str(&raw), Err(MeshIoError::UnsupportedFormat(_))));

        let odd = TRIANGLE_VTP.replace(r#"NumberOfComponents="3" format="ascii""#, r#"NumberOfComponents="3" format="hex""#);
        assert!(matches!(parse_str(&odd), Err(MeshIoError::UnsupportedFormat(f)) if f == "hex"));

        let orphan = BINARY_VTP.replace(r#"format="binary">
          AAAACAAAAAMAAAAG"#, r#"format="appended" offset="0">"#);
        assert!(matches!(parse_str(&orphan), Err(MeshIoError::MalformedVtp(_))));
    }

    #[test]
    fn test_write_keeps_attribute_roles() {
        let cube = create_unit_cube();
        let normals = cube
            .vertex_normals()
            .into_iter()
            .flat_map(|n| n.unwrap_or_default().to_array())
            .collect();
        let cube = cube
            .with_point_data(PointDataArray::new("InsertionID", "Int64", 1, vec![1.0; 8]))
            .with_point_data(PointDataArray::new("Normals", "Float32", 3, normals).with_role(AttributeRole::Normals));
        let mut buf = Vec::new();
        write(&mut buf, &cube).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#"<PointData Normals="Normals">"#));
        assert_eq!(parse_str(&text).unwrap(), cube);
    }

    #[test]
    fn test_write_tolerates_zero_components() {
        let mut array = PointDataArray::new("Broken", "Float32", 1, vec![0.5; 8]);
        array.components = 0;
        let cube = create_unit_cube().with_point_data(array);
        let mut buf = Vec::new();
        write(&mut buf, &cube).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains(r#"NumberOfComponents="1""#));
    }

    #[test]
    fn test_rejects_inconsistent_counts() {
        let short = TRIANGLE_VTP.replace(r#"NumberOfPoints="4""#, r#"NumberOfPoints="5""#);
        assert!(matches!(parse_str(&short), Err(MeshIoError::MalformedVtp(_))));

        let bad_index = TRIANGLE_VTP.replace("0 1 2 0 2 3", "0 1 2 0 2 9");
        assert!(matches!(parse_str(&bad_index), Err(MeshIoError::MalformedVtp(_))));

        let bad_offsets = TRIANGLE_VTP.replace("3 6", "3 5");
        assert!(matches!(parse_str(&bad_offsets), Err(MeshIoError::MalformedVtp(_))));
    }

    #[test]
    fn test_rejects_other_dataset_types() {
        let grid = TRIANGLE_VTP.replace(r#"type="PolyData""#, r#"type="UnstructuredGrid""#);
        assert!(parse_str(&grid).is_err());
    }
}
