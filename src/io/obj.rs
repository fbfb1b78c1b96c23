//! Wavefront OBJ geometry (`v` and `f` records only).

use std::io::Write;

use super::{MeshIoError, MeshIoResult};
use crate::geom::SurfaceMesh;

/// Parse OBJ text into a mesh.
///
/// Face tokens may be `v`, `v/vt`, `v//vn` or `v/vt/vn`; only the vertex
/// index is used. Negative indices count back from the latest vertex.
/// Texture coordinates, normals, groups and materials are skipped.
pub fn parse_str(text: &str) -> MeshIoResult<SurfaceMesh> {
    let mut positions: Vec<[f64; 3]> = Vec::new();
    let mut faces: Vec<Vec<u32>> = Vec::new();

    for (line_idx, raw) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        let mut tokens = line.split_whitespace();
        let Some(tag) = tokens.next() else {
            continue;
        };
        match tag {
            "v" => {
                let mut coords = [0.0; 3];
                for coord in &mut coords {
                    let token = tokens.next().ok_or_else(|| malformed(line_no, "vertex needs 3 coordinates"))?;
                    *coord = token
                        .parse()
                        .map_err(|e| malformed(line_no, &format!("bad coordinate `{token}`: {e}")))?;
                }
                positions.push(coords);
            }
            "f" => {
                let face = tokens
                    .map(|token| resolve_index(token, positions.len(), line_no))
                    .collect::<MeshIoResult<Vec<u32>>>()?;
                if face.len() < 3 {
                    return Err(malformed(line_no, "face needs at least 3 vertices"));
                }
                faces.push(face);
            }
            _ => {}
        }
    }

    Ok(SurfaceMesh::new(positions, faces))
}

fn resolve_index(token: &str, vertex_count: usize, line_no: usize) -> MeshIoResult<u32> {
    let head = token.split('/').next().unwrap_or_default();
    let raw: i64 = head
        .parse()
        .map_err(|e| malformed(line_no, &format!("bad face index `{token}`: {e}")))?;
    let zero_based = match raw {
        0 => return Err(malformed(line_no, "face index 0 is invalid (OBJ is 1-based)")),
        r if r > 0 => r - 1,
        r => vertex_count as i64 + r,
    };
    if zero_based < 0 || zero_based >= vertex_count as i64 {
        return Err(malformed(
            line_no,
            &format!("face index {raw} out of range for {vertex_count} vertices"),
        ));
    }
    u32::try_from(zero_based).map_err(|_| malformed(line_no, "face index exceeds u32"))
}

fn malformed(line: usize, message: &str) -> MeshIoError {
    MeshIoError::MalformedObj {
        line,
        message: message.to_owned(),
    }
}

/// Write vertex positions and polygon faces as OBJ text.
pub fn write<W: Write>(w: &mut W, mesh: &SurfaceMesh) -> MeshIoResult<()> {
    writeln!(w, "# mesh-augment")?;
    for p in mesh.positions.iter().copied() {
        writeln!(w, "v {} {} {}", p[0], p[1], p[2])?;
    }
    for face in &mesh.faces {
        write!(w, "f")?;
        for &index in face {
            write!(w, " {}", index + 1)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::test_fixtures::create_unit_cube;

    #[test]
    fn test_parse_mixed_face_tokens() {
        let text = "\
# quad with attributes
o quad
v 0 0 0
v 1 0 0
v 1 1 0   # trailing comment
v 0 1 0
vt 0 0
vn 0 0 1
f 1/1/1 2//1 3/1 4
f -4 -3 -2
";
        let mesh = parse_str(text).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![vec![0, 1, 2, 3], vec![0, 1, 2]]);
        assert_eq!(mesh.triangle_count(), 3);
    }

    #[test]
    fn test_write_then_parse_keeps_order() {
        let cube = create_unit_cube();
        let mut buf = Vec::new();
        write(&mut buf, &cube).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("f 1 3 2"));

        let parsed = parse_str(&text).unwrap();
        assert_eq!(parsed.positions, cube.positions);
        assert_eq!(parsed.faces, cube.faces);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_str("v 0 0 0\nv 1 0\n").unwrap_err();
        assert!(matches!(err, MeshIoError::MalformedObj { line: 2, .. }));

        let err = parse_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n").unwrap_err();
        assert!(matches!(err, MeshIoError::MalformedObj { line: 4, .. }));

        let err = parse_str("v 0 0 0\nf 0 1 1\n").unwrap_err();
        assert!(matches!(err, MeshIoError::MalformedObj { line: 2, .. }));

        let err = parse_str("v 0 0 x\n").unwrap_err();
        assert!(err.to_string().contains("bad coordinate `x`"));
    }
}
