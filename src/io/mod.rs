//! Reading and writing surface meshes.
//!
//! Two formats are supported, chosen by file extension:
//! VTK XML PolyData (`.vtp`; ASCII, binary or base64-appended data arrays)
//! and Wavefront OBJ (`.obj`).
//! Both preserve vertex order and polygon connectivity; only `.vtp` carries
//! point-data arrays.

pub mod obj;
mod vtk_binary;
pub mod vtp;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::SurfaceMesh;

/// Result type for mesh I/O.
pub type MeshIoResult<T> = Result<T, MeshIoError>;

/// Errors raised while reading or writing mesh files.
#[derive(Debug, Error)]
pub enum MeshIoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),
    #[error("unsupported mesh file extension `{0}` (expected .vtp or .obj)")]
    UnsupportedExtension(String),
    #[error("unsupported VTK data encoding: {0}")]
    UnsupportedFormat(String),
    #[error("malformed VTK PolyData: {0}")]
    MalformedVtp(String),
    #[error("OBJ line {line}: {message}")]
    MalformedObj { line: usize, message: String },
}

/// Supported on-disk mesh formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Vtp,
    Obj,
}

impl MeshFormat {
    /// Format implied by the extension of `path` (case-insensitive).
    pub fn from_path(path: &Path) -> MeshIoResult<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "vtp" => Ok(Self::Vtp),
            "obj" => Ok(Self::Obj),
            _ => Err(MeshIoError::UnsupportedExtension(ext)),
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vtp => "vtp",
            Self::Obj => "obj",
        }
    }
}

/// Read a mesh, picking the parser from the file extension.
pub fn read_mesh(path: &Path) -> MeshIoResult<SurfaceMesh> {
    let format = MeshFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let mesh = match format {
        MeshFormat::Vtp => vtp::parse_str(&text)?,
        MeshFormat::Obj => obj::parse_str(&text)?,
    };
    log::debug!(
        "read {} vertices / {} faces from {}",
        mesh.vertex_count(),
        mesh.face_count(),
        path.display()
    );
    Ok(mesh)
}

/// Write a mesh, picking the format from the file extension.
pub fn write_mesh(path: &Path, mesh: &SurfaceMesh) -> MeshIoResult<()> {
    write_mesh_as(path, mesh, MeshFormat::from_path(path)?)
}

/// Write a mesh in an explicit format, replacing any existing file.
pub fn write_mesh_as(path: &Path, mesh: &SurfaceMesh, format: MeshFormat) -> MeshIoResult<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    match format {
        MeshFormat::Vtp => vtp::write(&mut w, mesh)?,
        MeshFormat::Obj => obj::write(&mut w, mesh)?,
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PointDataArray;
    use crate::geom::test_fixtures::create_unit_cube;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MeshFormat::from_path(Path::new("a/b/mesh.vtp")).unwrap(), MeshFormat::Vtp);
        assert_eq!(MeshFormat::from_path(Path::new("MESH.OBJ")).unwrap(), MeshFormat::Obj);
        assert!(matches!(
            MeshFormat::from_path(Path::new("mesh.stl")),
            Err(MeshIoError::UnsupportedExtension(ext)) if ext == "stl"
        ));
        assert!(MeshFormat::from_path(Path::new("mesh")).is_err());
    }

    #[test]
    fn test_file_round_trip_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let ids = PointDataArray::new("InsertionID", "Int64", 1, vec![0.0, 1.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0]);
        let cube = create_unit_cube().with_point_data(ids);

        let vtp_path = dir.path().join("cube.vtp");
        write_mesh(&vtp_path, &cube).unwrap();
        assert_eq!(read_mesh(&vtp_path).unwrap(), cube);

        let obj_path = dir.path().join("cube.obj");
        write_mesh(&obj_path, &cube).unwrap();
        let from_obj = read_mesh(&obj_path).unwrap();
        assert_eq!(from_obj.positions, cube.positions);
        assert_eq!(from_obj.faces, cube.faces);
        assert!(from_obj.point_data.is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_mesh(&dir.path().join("absent.vtp")).unwrap_err();
        assert!(matches!(err, MeshIoError::Io(_)));
    }
}
