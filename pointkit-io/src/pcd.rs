//! PCD (Point Cloud Data) format support
//!
//! This module reads PCD v0.7 files in ASCII and binary layout with any of the
//! numeric field types, and writes clouds of the point types implementing
//! [`PcdPointType`]. The `VIEWPOINT` header entry maps to the cloud's sensor
//! pose in both directions.

use crate::error::{IoError, Result};
use nalgebra::{Quaternion, UnitQuaternion};
use pointkit_core::{ColoredPoint3f, NormalPoint3f, Point3f, PointCloud, Vector3f};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// PCD data format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdDataFormat {
    Ascii,
    Binary,
    BinaryCompressed,
}

/// PCD field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdFieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PcdFieldType {
    fn from_declaration(type_str: &str, size: usize) -> Result<Self> {
        match (type_str, size) {
            ("I", 1) => Ok(PcdFieldType::I8),
            ("I", 2) => Ok(PcdFieldType::I16),
            ("I", 4) => Ok(PcdFieldType::I32),
            ("U", 1) => Ok(PcdFieldType::U8),
            ("U", 2) => Ok(PcdFieldType::U16),
            ("U", 4) => Ok(PcdFieldType::U32),
            ("F", 4) => Ok(PcdFieldType::F32),
            ("F", 8) => Ok(PcdFieldType::F64),
            _ => Err(IoError::parse(format!(
                "Unknown field type/size combination: {}/{}",
                type_str, size
            ))),
        }
    }

    /// Size in bytes of one value
    pub fn size(self) -> usize {
        match self {
            PcdFieldType::I8 | PcdFieldType::U8 => 1,
            PcdFieldType::I16 | PcdFieldType::U16 => 2,
            PcdFieldType::I32 | PcdFieldType::U32 | PcdFieldType::F32 => 4,
            PcdFieldType::F64 => 8,
        }
    }

    fn type_char(self) -> &'static str {
        match self {
            PcdFieldType::I8 | PcdFieldType::I16 | PcdFieldType::I32 => "I",
            PcdFieldType::U8 | PcdFieldType::U16 | PcdFieldType::U32 => "U",
            PcdFieldType::F32 | PcdFieldType::F64 => "F",
        }
    }
}

/// PCD field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcdField {
    pub name: String,
    pub field_type: PcdFieldType,
    pub count: usize,
}

impl PcdField {
    pub fn new(name: &str, field_type: PcdFieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            count: 1,
        }
    }
}

/// PCD header information
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<PcdField>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: [f64; 7], // tx, ty, tz, qw, qx, qy, qz
    pub data_format: PcdDataFormat,
}

impl PcdHeader {
    pub fn point_count(&self) -> usize {
        self.width * self.height
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Sensor origin and orientation from `VIEWPOINT`
    pub fn sensor_pose(&self) -> (Point3f, UnitQuaternion<f32>) {
        let v = self.viewpoint.map(|x| x as f32);
        let q = Quaternion::new(v[3], v[4], v[5], v[6]);
        let orientation = if q.norm() > f32::EPSILON {
            UnitQuaternion::from_quaternion(q)
        } else {
            UnitQuaternion::identity()
        };
        (Point3f::new(v[0], v[1], v[2]), orientation)
    }
}

/// PCD field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PcdValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl PcdValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            PcdValue::I8(v) => v as f64,
            PcdValue::U8(v) => v as f64,
            PcdValue::I16(v) => v as f64,
            PcdValue::U16(v) => v as f64,
            PcdValue::I32(v) => v as f64,
            PcdValue::U32(v) => v as f64,
            PcdValue::F32(v) => v as f64,
            PcdValue::F64(v) => v,
        }
    }

    /// Raw 32 bits of the value, as used by packed `rgb`/`rgba` fields
    fn packed_bits(&self) -> Option<u32> {
        match *self {
            PcdValue::U32(v) => Some(v),
            PcdValue::I32(v) => Some(v as u32),
            PcdValue::F32(v) => Some(v.to_bits()),
            _ => None,
        }
    }

    fn parse(field_type: PcdFieldType, text: &str) -> Result<Self> {
        let invalid = || IoError::parse(format!("Invalid {:?} value: {}", field_type, text));
        Ok(match field_type {
            PcdFieldType::I8 => PcdValue::I8(text.parse().map_err(|_| invalid())?),
            PcdFieldType::U8 => PcdValue::U8(text.parse().map_err(|_| invalid())?),
            PcdFieldType::I16 => PcdValue::I16(text.parse().map_err(|_| invalid())?),
            PcdFieldType::U16 => PcdValue::U16(text.parse().map_err(|_| invalid())?),
            PcdFieldType::I32 => PcdValue::I32(text.parse().map_err(|_| invalid())?),
            PcdFieldType::U32 => PcdValue::U32(text.parse().map_err(|_| invalid())?),
            PcdFieldType::F32 => PcdValue::F32(text.parse().map_err(|_| invalid())?),
            PcdFieldType::F64 => PcdValue::F64(text.parse().map_err(|_| invalid())?),
        })
    }

    fn read_le<R: Read>(reader: &mut R, field_type: PcdFieldType) -> Result<Self> {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..field_type.size()];
        reader.read_exact(bytes)?;
        Ok(match field_type {
            PcdFieldType::I8 => PcdValue::I8(bytes[0] as i8),
            PcdFieldType::U8 => PcdValue::U8(bytes[0]),
            PcdFieldType::I16 => PcdValue::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
            PcdFieldType::U16 => PcdValue::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            PcdFieldType::I32 => PcdValue::I32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PcdFieldType::U32 => PcdValue::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PcdFieldType::F32 => PcdValue::F32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PcdFieldType::F64 => PcdValue::F64(f64::from_le_bytes(buf)),
        })
    }

    fn write_le<W: Write>(&self, writer: &mut W) -> Result<()> {
        match *self {
            PcdValue::I8(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::U8(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::I16(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::U16(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::I32(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::U32(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::F32(v) => writer.write_all(&v.to_le_bytes())?,
            PcdValue::F64(v) => writer.write_all(&v.to_le_bytes())?,
        }
        Ok(())
    }

    fn write_ascii<W: Write>(&self, writer: &mut W) -> Result<()> {
        match *self {
            PcdValue::I8(v) => write!(writer, "{}", v)?,
            PcdValue::U8(v) => write!(writer, "{}", v)?,
            PcdValue::I16(v) => write!(writer, "{}", v)?,
            PcdValue::U16(v) => write!(writer, "{}", v)?,
            PcdValue::I32(v) => write!(writer, "{}", v)?,
            PcdValue::U32(v) => write!(writer, "{}", v)?,
            PcdValue::F32(v) => write!(writer, "{}", v)?,
            PcdValue::F64(v) => write!(writer, "{}", v)?,
        }
        Ok(())
    }
}

/// Values of one point: one entry per header field, each holding `count` values
pub type PcdRecord = Vec<Vec<PcdValue>>;

/// Point types that can be stored in PCD files
pub trait PcdPointType: Sized {
    /// Fields written for this point type, in order
    fn fields() -> Vec<PcdField>;

    /// Values of this point in the order of [`fields`](Self::fields)
    fn to_values(&self) -> Vec<PcdValue>;

    /// Build a point from a record laid out according to `header`
    fn from_record(header: &PcdHeader, record: &PcdRecord) -> Result<Self>;
}

fn optional_value<'a>(header: &PcdHeader, record: &'a PcdRecord, name: &str) -> Option<&'a PcdValue> {
    header
        .field_index(name)
        .and_then(|i| record.get(i))
        .and_then(|values| values.first())
}

fn required_scalar(header: &PcdHeader, record: &PcdRecord, name: &str) -> Result<f32> {
    optional_value(header, record, name)
        .map(|v| v.as_f64() as f32)
        .ok_or_else(|| IoError::parse(format!("Missing {} field in PCD point", name)))
}

fn read_position(header: &PcdHeader, record: &PcdRecord) -> Result<Point3f> {
    Ok(Point3f::new(
        required_scalar(header, record, "x")?,
        required_scalar(header, record, "y")?,
        required_scalar(header, record, "z")?,
    ))
}

fn position_values(p: &Point3f) -> Vec<PcdValue> {
    vec![PcdValue::F32(p.x), PcdValue::F32(p.y), PcdValue::F32(p.z)]
}

fn xyz_fields() -> Vec<PcdField> {
    ["x", "y", "z"]
        .iter()
        .map(|name| PcdField::new(name, PcdFieldType::F32))
        .collect()
}

impl PcdPointType for Point3f {
    fn fields() -> Vec<PcdField> {
        xyz_fields()
    }

    fn to_values(&self) -> Vec<PcdValue> {
        position_values(self)
    }

    fn from_record(header: &PcdHeader, record: &PcdRecord) -> Result<Self> {
        read_position(header, record)
    }
}

impl PcdPointType for NormalPoint3f {
    fn fields() -> Vec<PcdField> {
        let mut fields = xyz_fields();
        for name in ["normal_x", "normal_y", "normal_z", "curvature"] {
            fields.push(PcdField::new(name, PcdFieldType::F32));
        }
        fields
    }

    fn to_values(&self) -> Vec<PcdValue> {
        let mut values = position_values(&self.position);
        values.extend([
            PcdValue::F32(self.normal.x),
            PcdValue::F32(self.normal.y),
            PcdValue::F32(self.normal.z),
            PcdValue::F32(self.curvature),
        ]);
        values
    }

    fn from_record(header: &PcdHeader, record: &PcdRecord) -> Result<Self> {
        let normal = Vector3f::new(
            required_scalar(header, record, "normal_x")?,
            required_scalar(header, record, "normal_y")?,
            required_scalar(header, record, "normal_z")?,
        );
        let curvature = optional_value(header, record, "curvature")
            .map(|v| v.as_f64() as f32)
            .unwrap_or(0.0);
        Ok(NormalPoint3f {
            position: read_position(header, record)?,
            normal,
            curvature,
        })
    }
}

impl PcdPointType for ColoredPoint3f {
    fn fields() -> Vec<PcdField> {
        let mut fields = xyz_fields();
        fields.push(PcdField::new("rgba", PcdFieldType::U32));
        fields
    }

    fn to_values(&self) -> Vec<PcdValue> {
        let [r, g, b, a] = self.color.map(u32::from);
        let mut values = position_values(&self.position);
        values.push(PcdValue::U32(a << 24 | r << 16 | g << 8 | b));
        values
    }

    /// Colour comes from a packed `rgba` or `rgb` field (`0xAARRGGBB`); `rgb`
    /// is fully opaque, and points without either field are white
    fn from_record(header: &PcdHeader, record: &PcdRecord) -> Result<Self> {
        let position = read_position(header, record)?;
        let color = if let Some(bits) = optional_value(header, record, "rgba").and_then(PcdValue::packed_bits) {
            let [b, g, r, a] = bits.to_le_bytes();
            [r, g, b, a]
        } else if let Some(bits) = optional_value(header, record, "rgb").and_then(PcdValue::packed_bits) {
            let [b, g, r, _] = bits.to_le_bytes();
            [r, g, b, 255]
        } else {
            ColoredPoint3f::default().color
        };
        Ok(ColoredPoint3f { position, color })
    }
}

/// Options for writing PCD files
#[derive(Debug, Clone)]
pub struct PcdWriteOptions {
    pub data_format: PcdDataFormat,
    pub version: String,
    /// Overrides the viewpoint taken from the cloud's sensor pose
    pub viewpoint: Option<[f64; 7]>,
}

impl Default for PcdWriteOptions {
    fn default() -> Self {
        Self {
            data_format: PcdDataFormat::Binary,
            version: "0.7".to_string(),
            viewpoint: None,
        }
    }
}

/// PCD reader for ASCII and binary files
pub struct RobustPcdReader;

impl RobustPcdReader {
    /// Read PCD file and return header and point data
    pub fn read_pcd_file<P: AsRef<Path>>(path: P) -> Result<(PcdHeader, Vec<PcdRecord>)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_pcd_data(&mut reader)
    }

    /// Read PCD data from a reader
    pub fn read_pcd_data<R: BufRead>(reader: &mut R) -> Result<(PcdHeader, Vec<PcdRecord>)> {
        let header = Self::read_header(reader)?;
        let records = match header.data_format {
            PcdDataFormat::Ascii => Self::read_ascii_records(reader, &header)?,
            PcdDataFormat::Binary => Self::read_binary_records(reader, &header)?,
            PcdDataFormat::BinaryCompressed => {
                return Err(IoError::InvalidFormat {
                    format: "PCD binary_compressed".to_string(),
                })
            }
        };
        Ok((header, records))
    }

    /// Read a typed point cloud; the sensor pose is taken from `VIEWPOINT`
    pub fn read_point_cloud<T: PcdPointType, P: AsRef<Path>>(path: P) -> Result<PointCloud<T>> {
        let (header, records) = Self::read_pcd_file(path)?;
        Self::to_point_cloud(&header, &records)
    }

    /// Convert parsed records to a typed point cloud
    pub fn to_point_cloud<T: PcdPointType>(header: &PcdHeader, records: &[PcdRecord]) -> Result<PointCloud<T>> {
        let points = records
            .iter()
            .map(|record| T::from_record(header, record))
            .collect::<Result<Vec<T>>>()?;
        let (origin, orientation) = header.sensor_pose();
        Ok(PointCloud::from_points(points).with_sensor_pose(origin, orientation))
    }

    fn read_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
        let mut version = None;
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut types: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut width = None;
        let mut height = None;
        let mut viewpoint = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let mut points = None;
        let mut data_format = None;

        let mut line = String::new();
        while data_format.is_none() {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(IoError::parse("Unexpected end of file in PCD header"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            let values = &parts[1..];
            match parts[0] {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" | "COLUMNS" => names = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = parse_list(values, "SIZE")?,
                "TYPE" => types = values.iter().map(|v| v.to_string()).collect(),
                "COUNT" => counts = parse_list(values, "COUNT")?,
                "WIDTH" => width = Some(parse_single(values, "WIDTH")?),
                "HEIGHT" => height = Some(parse_single(values, "HEIGHT")?),
                "POINTS" => points = Some(parse_single(values, "POINTS")?),
                "VIEWPOINT" => {
                    if values.len() != 7 {
                        return Err(IoError::parse("VIEWPOINT needs 7 values"));
                    }
                    for (slot, text) in viewpoint.iter_mut().zip(values) {
                        *slot = text
                            .parse::<f64>()
                            .map_err(|_| IoError::parse(format!("Invalid VIEWPOINT value: {}", text)))?;
                    }
                }
                "DATA" => {
                    data_format = Some(match values.first().copied() {
                        Some("ascii") => PcdDataFormat::Ascii,
                        Some("binary") => PcdDataFormat::Binary,
                        Some("binary_compressed") => PcdDataFormat::BinaryCompressed,
                        other => {
                            return Err(IoError::parse(format!("Unknown DATA format: {:?}", other)))
                        }
                    })
                }
                _ => {
                    // Ignore unknown header entries
                }
            }
        }

        if names.is_empty() {
            return Err(IoError::parse("Missing FIELDS in PCD header"));
        }
        if counts.is_empty() {
            counts = vec![1; names.len()];
        }
        if sizes.len() != names.len() || types.len() != names.len() || counts.len() != names.len() {
            return Err(IoError::parse(
                "Mismatch between FIELDS, SIZE, TYPE, and COUNT declarations",
            ));
        }

        let fields = names
            .into_iter()
            .zip(types.iter().zip(sizes.iter().zip(counts.iter())))
            .map(|(name, (type_str, (&size, &count)))| {
                Ok(PcdField {
                    name,
                    field_type: PcdFieldType::from_declaration(type_str, size)?,
                    count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let width = match (width, points) {
            (Some(w), _) => w,
            (None, Some(p)) => p,
            (None, None) => return Err(IoError::parse("Missing WIDTH in PCD header")),
        };
        let height = height.unwrap_or(1);
        let total = width.checked_mul(height).ok_or_else(|| {
            IoError::parse(format!("WIDTH ({}) * HEIGHT ({}) overflows", width, height))
        })?;
        if let Some(points) = points {
            if points != total {
                return Err(IoError::parse(format!(
                    "POINTS ({}) doesn't match WIDTH * HEIGHT ({})",
                    points, total
                )));
            }
        }

        Ok(PcdHeader {
            version: version.unwrap_or_else(|| "0.7".to_string()),
            fields,
            width,
            height,
            viewpoint,
            data_format: data_format.unwrap_or(PcdDataFormat::Ascii),
        })
    }

    fn read_ascii_records<R: BufRead>(reader: &mut R, header: &PcdHeader) -> Result<Vec<PcdRecord>> {
        let expected = header.point_count();
        let mut records = Vec::with_capacity(expected.min(MAX_PREALLOCATED_POINTS));
        let mut line = String::new();

        while records.len() < expected {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(IoError::parse(format!(
                    "PCD data ended after {} of {} points",
                    records.len(),
                    expected
                )));
            }
            let values: Vec<&str> = line.split_whitespace().collect();
            if values.is_empty() {
                continue;
            }

            let mut tokens = values.into_iter();
            let mut record = Vec::with_capacity(header.fields.len());
            for field in &header.fields {
                let mut field_values = Vec::new();
                for _ in 0..field.count {
                    let token = tokens
                        .next()
                        .ok_or_else(|| IoError::parse("Not enough values in ASCII PCD line"))?;
                    field_values.push(PcdValue::parse(field.field_type, token)?);
                }
                record.push(field_values);
            }
            records.push(record);
        }
        Ok(records)
    }

    fn read_binary_records<R: Read>(reader: &mut R, header: &PcdHeader) -> Result<Vec<PcdRecord>> {
        let expected = header.point_count();
        let mut records = Vec::with_capacity(expected.min(MAX_PREALLOCATED_POINTS));

        for _ in 0..expected {
            let mut record = Vec::with_capacity(header.fields.len());
            for field in &header.fields {
                let values = (0..field.count)
                    .map(|_| PcdValue::read_le(reader, field.field_type))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| match e {
                        IoError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                            IoError::parse(format!("PCD data ended after {} of {} points", records.len(), expected))
                        }
                        other => other,
                    })?;
                record.push(values);
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// Records reserved up front; header counts are not trusted beyond this
const MAX_PREALLOCATED_POINTS: usize = 1 << 16;

fn parse_single(values: &[&str], key: &str) -> Result<usize> {
    values
        .first()
        .and_then(|v| v.parse::<usize>().ok())
        .ok_or_else(|| IoError::parse(format!("Invalid {} value: {:?}", key, values.first())))
}

fn parse_list(values: &[&str], key: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| IoError::parse(format!("Invalid {} value: {}", key, v)))
        })
        .collect()
}

/// Whether `format` is written as text; compressed output is not supported
fn writes_ascii(format: PcdDataFormat) -> Result<bool> {
    match format {
        PcdDataFormat::Ascii => Ok(true),
        PcdDataFormat::Binary => Ok(false),
        PcdDataFormat::BinaryCompressed => Err(IoError::InvalidFormat {
            format: "PCD binary_compressed output".to_string(),
        }),
    }
}

/// PCD writer for ASCII and binary files
pub struct RobustPcdWriter;

impl RobustPcdWriter {
    /// Write point cloud to PCD file with options
    pub fn write_point_cloud<T: PcdPointType, P: AsRef<Path>>(
        cloud: &PointCloud<T>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        writes_ascii(options.data_format)?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_point_cloud_to_writer(cloud, &mut writer, options)?;
        writer.flush()?;
        Ok(())
    }

    /// Write point cloud to writer with options
    pub fn write_point_cloud_to_writer<T: PcdPointType, W: Write>(
        cloud: &PointCloud<T>,
        writer: &mut W,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let ascii = writes_ascii(options.data_format)?;
        let viewpoint = options.viewpoint.unwrap_or_else(|| {
            let o = cloud.sensor_origin;
            let q = cloud.sensor_orientation;
            [o.x, o.y, o.z, q.w, q.i, q.j, q.k].map(f64::from)
        });
        let header = PcdHeader {
            version: options.version.clone(),
            fields: T::fields(),
            width: cloud.len(),
            height: 1,
            viewpoint,
            data_format: options.data_format,
        };

        Self::write_header(writer, &header)?;

        if ascii {
            for point in cloud.iter() {
                for (i, value) in point.to_values().iter().enumerate() {
                    if i > 0 {
                        write!(writer, " ")?;
                    }
                    value.write_ascii(writer)?;
                }
                writeln!(writer)?;
            }
        } else {
            for point in cloud.iter() {
                for value in point.to_values() {
                    value.write_le(writer)?;
                }
            }
        }
        Ok(())
    }

    fn write_header<W: Write>(writer: &mut W, header: &PcdHeader) -> Result<()> {
        let join = |f: &dyn Fn(&PcdField) -> String| {
            header.fields.iter().map(f).collect::<Vec<_>>().join(" ")
        };

        writeln!(writer, "# .PCD v{} - Point Cloud Data file format", header.version)?;
        writeln!(writer, "VERSION {}", header.version)?;
        writeln!(writer, "FIELDS {}", join(&|f| f.name.clone()))?;
        writeln!(writer, "SIZE {}", join(&|f| f.field_type.size().to_string()))?;
        writeln!(writer, "TYPE {}", join(&|f| f.field_type.type_char().to_string()))?;
        writeln!(writer, "COUNT {}", join(&|f| f.count.to_string()))?;
        writeln!(writer, "WIDTH {}", header.width)?;
        writeln!(writer, "HEIGHT {}", header.height)?;
        let v = header.viewpoint;
        writeln!(writer, "VIEWPOINT {} {} {} {} {} {} {}", v[0], v[1], v[2], v[3], v[4], v[5], v[6])?;
        writeln!(writer, "POINTS {}", header.point_count())?;

        let data_str = match header.data_format {
            PcdDataFormat::Ascii => "ascii",
            PcdDataFormat::Binary => "binary",
            PcdDataFormat::BinaryCompressed => "binary_compressed",
        };
        writeln!(writer, "DATA {}", data_str)?;
        Ok(())
    }
}
