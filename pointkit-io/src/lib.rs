//! I/O operations for point clouds
//!
//! This crate reads and writes PCD files for the point types of
//! `pointkit-core`, and parses the plain-text path lists used to name
//! template files.

pub mod error;
pub mod pcd;

pub use error::*;
pub use pcd::{
    PcdDataFormat, PcdField, PcdFieldType, PcdHeader, PcdPointType, PcdValue, PcdWriteOptions,
    RobustPcdReader, RobustPcdWriter,
};

use pointkit_core::{ColoredPoint3f, NormalPoint3f, Point3f, PointCloud};
use std::path::{Path, PathBuf};

/// Supported point cloud file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudFormat {
    Pcd,
}

impl CloudFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("pcd") => Ok(CloudFormat::Pcd),
            other => Err(IoError::InvalidFormat {
                format: format!("unsupported point cloud extension {:?}", other),
            }),
        }
    }
}

/// Read a point cloud of any supported point type, detecting the format
pub fn read_cloud<T: PcdPointType, P: AsRef<Path>>(path: P) -> Result<PointCloud<T>> {
    let path = path.as_ref();
    let format = CloudFormat::from_path(path)?;
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let cloud = match format {
        CloudFormat::Pcd => RobustPcdReader::read_point_cloud(path)?,
    };
    log::debug!("read {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

/// Auto-detect format and read point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    read_cloud(path)
}

/// Read a cloud with colours; points without colour fields are white
pub fn read_colored_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
    read_cloud(path)
}

/// Read a cloud with `normal_x`, `normal_y`, `normal_z` fields
pub fn read_normal_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
    read_cloud(path)
}

/// Write a point cloud in binary layout, detecting the format from the extension
pub fn write_point_cloud<T: PcdPointType, P: AsRef<Path>>(cloud: &PointCloud<T>, path: P) -> Result<()> {
    write_point_cloud_with_format(cloud, path, PcdDataFormat::Binary)
}

/// Write a point cloud with an explicit data layout
pub fn write_point_cloud_with_format<T: PcdPointType, P: AsRef<Path>>(
    cloud: &PointCloud<T>,
    path: P,
    data_format: PcdDataFormat,
) -> Result<()> {
    let path = path.as_ref();
    match CloudFormat::from_path(path)? {
        CloudFormat::Pcd => {
            let options = PcdWriteOptions {
                data_format,
                ..Default::default()
            };
            RobustPcdWriter::write_point_cloud(cloud, path, &options)?;
        }
    }
    log::debug!("wrote {} points to {}", cloud.len(), path.display());
    Ok(())
}

/// Parse a list of file paths, one per line.
///
/// Surrounding whitespace is trimmed; blank lines and lines starting with `#`
/// are skipped. Relative paths are returned as written.
pub fn read_path_list<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IoError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => IoError::Io(e),
    })?;
    Ok(parse_path_list(&content))
}

fn parse_path_list(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointkit_core::{UnitQuaternion, Vector3f};
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pointkit_io_{}_{}", std::process::id(), name))
    }

    fn sample_cloud() -> PointCloud<Point3f> {
        PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, -2.5, 0.125),
            Point3f::new(0.1, 0.2, 0.3),
            Point3f::new(-7.75, 1e-3, 42.0),
        ])
    }

    #[test]
    fn test_pcd_roundtrip_binary() {
        let temp_file = temp_path("binary.pcd");
        let cloud = sample_cloud();

        write_point_cloud(&cloud, &temp_file).unwrap();
        let loaded = read_point_cloud(&temp_file).unwrap();

        assert_eq!(loaded.len(), cloud.len());
        assert_eq!(loaded.points, cloud.points);

        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn test_pcd_roundtrip_ascii() {
        let temp_file = temp_path("ascii.pcd");
        let cloud = sample_cloud();

        write_point_cloud_with_format(&cloud, &temp_file, PcdDataFormat::Ascii).unwrap();
        let content = fs::read_to_string(&temp_file).unwrap();
        assert!(content.contains("DATA ascii"));

        let loaded = read_point_cloud(&temp_file).unwrap();
        assert_eq!(loaded.points, cloud.points);

        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn test_normals_and_viewpoint_roundtrip() {
        let temp_file = temp_path("normals.pcd");
        let cloud = PointCloud::from_points(vec![NormalPoint3f {
            position: Point3f::new(1.0, 2.0, 3.0),
            normal: Vector3f::new(0.0, 0.0, -1.0),
            curvature: 0.25,
        }])
        .with_sensor_pose(Point3f::new(0.5, 0.0, -1.0), UnitQuaternion::identity());

        write_point_cloud_with_format(&cloud, &temp_file, PcdDataFormat::Ascii).unwrap();
        let loaded = read_normal_point_cloud(&temp_file).unwrap();
        assert_eq!(loaded.points, cloud.points);
        assert_eq!(loaded.sensor_origin, cloud.sensor_origin);

        // The positions alone can be read back as a plain cloud
        let plain = read_point_cloud(&temp_file).unwrap();
        assert_eq!(plain[0], Point3f::new(1.0, 2.0, 3.0));

        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn test_missing_file_and_unknown_extension() {
        let missing = temp_path("does_not_exist.pcd");
        assert!(matches!(read_point_cloud(&missing), Err(IoError::FileNotFound { .. })));
        assert!(matches!(read_point_cloud("cloud.xyz"), Err(IoError::InvalidFormat { .. })));
        assert!(matches!(
            write_point_cloud(&sample_cloud(), temp_path("cloud.ply")),
            Err(IoError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_read_colored_cloud_without_colors() {
        let temp_file = temp_path("uncolored.pcd");
        write_point_cloud(&sample_cloud(), &temp_file).unwrap();
        let colored = read_colored_point_cloud(&temp_file).unwrap();
        assert_eq!(colored.len(), 4);
        assert!(colored.iter().all(|p| p.color == [255, 255, 255, 255]));
        let _ = fs::remove_file(temp_file);
    }

    #[test]
    fn test_path_list_parsing() {
        let content = "\
# templates
object_templates/template_0.pcd

   object_templates/template_1.pcd
#object_templates/disabled.pcd
";
        assert_eq!(
            parse_path_list(content),
            vec![
                PathBuf::from("object_templates/template_0.pcd"),
                PathBuf::from("object_templates/template_1.pcd"),
            ]
        );

        let temp_file = temp_path("list.txt");
        fs::write(&temp_file, content).unwrap();
        assert_eq!(read_path_list(&temp_file).unwrap().len(), 2);
        let _ = fs::remove_file(&temp_file);
        assert!(matches!(read_path_list(&temp_file), Err(IoError::FileNotFound { .. })));
    }
}
