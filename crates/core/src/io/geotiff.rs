//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for TIFF I/O and handles the GeoTIFF georeferencing
//! tags directly:
//!
//! | Tag | Id | Use |
//! |---|---|---|
//! | ModelPixelScale | 33550 | cell size |
//! | ModelTiepoint | 33922 | origin |
//! | ModelTransformation | 34264 | rotated grids |
//! | GeoKeyDirectory | 34735 | EPSG code |
//! | GDAL_NODATA | 42113 | no-data value |
//!
//! Written files carry reduced-resolution overview images (2x averaging)
//! after the full-resolution image, flagged with NewSubfileType = 1.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Lzw, Uncompressed};
use tiff::encoder::{TiffEncoder, TiffKindStandard, TiffValue};
use tiff::tags::Tag;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

/// Known ids decode to named variants, never to `Tag::Unknown(id)`
fn geo_tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// Compression applied to every image of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Lzw,
    Deflate,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    pub compression: Compression,
    /// Write 2x-downsampled overview images
    pub overviews: bool,
    /// Stop generating overviews once both dimensions are at most this size
    pub overview_min_size: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Lzw,
            overviews: true,
            overview_min_size: 256,
        }
    }
}

/// Pixel types the writer can encode
pub trait TiffPixel: RasterElement
where
    [Self]: TiffValue,
{
    type Color: ColorType<Inner = Self>;
}

impl TiffPixel for u8 {
    type Color = colortype::Gray8;
}

impl TiffPixel for u16 {
    type Color = colortype::Gray16;
}

impl TiffPixel for u32 {
    type Color = colortype::Gray32;
}

impl TiffPixel for f32 {
    type Color = colortype::Gray32Float;
}

impl TiffPixel for f64 {
    type Color = colortype::Gray64Float;
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    macro_rules! cast_all {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
                .collect::<Vec<T>>()
        };
    }

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::U8(buf) => cast_all!(buf),
        DecodingResult::U16(buf) => cast_all!(buf),
        DecodingResult::U32(buf) => cast_all!(buf),
        DecodingResult::U64(buf) => cast_all!(buf),
        DecodingResult::I8(buf) => cast_all!(buf),
        DecodingResult::I16(buf) => cast_all!(buf),
        DecodingResult::I32(buf) => cast_all!(buf),
        DecodingResult::I64(buf) => cast_all!(buf),
        DecodingResult::F32(buf) => cast_all!(buf),
        DecodingResult::F64(buf) => cast_all!(buf),
    };

    // Multi-band images decode interleaved; only single-band rasters are supported
    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected a single-band image of {}x{}, got {} samples",
            cols,
            rows,
            data.len()
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    if let Ok(text) = decoder.get_tag_ascii_string(geo_tag(TAG_GDAL_NODATA)) {
        let parsed = text.trim_matches(char::from(0)).trim().parse::<f64>();
        if let Ok(nd) = parsed {
            raster.set_nodata(num_traits::cast(nd));
        }
    }

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(geo_tag(TAG_MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            // Row-major 4x4 matrix: x = m0*col + m1*row + m3, y = m4*col + m5*row + m7
            return Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder
        .get_tag_f64_vec(geo_tag(TAG_MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(TAG_MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder
        .get_tag_u16_vec(geo_tag(TAG_GEO_KEY_DIRECTORY))
        .ok()?;
    if keys.len() < 4 {
        return None;
    }

    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .find(|entry| entry[0] == KEY_PROJECTED_CS_TYPE || entry[0] == KEY_GEOGRAPHIC_TYPE)
        .map(|entry| entry[3])
        // 32767 is "user-defined", which cannot be expressed as an EPSG code
        .filter(|&code| code != 0 && code != 32767)
        .map(|code| CRS::from_epsg(code as u32))
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: TiffPixel,
    [T]: TiffValue,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer, &options.unwrap_or_default())?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: TiffPixel,
    [T]: TiffValue,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: TiffPixel,
    [T]: TiffValue,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;

    let mut level = raster.data().clone();
    let mut level_index = 0u32;

    loop {
        let transform = overview_transform(raster.transform(), level_index);
        match options.compression {
            Compression::None => {
                write_image(&mut encoder, &level, raster, &transform, level_index, Uncompressed)?
            }
            Compression::Lzw => {
                write_image(&mut encoder, &level, raster, &transform, level_index, Lzw::default())?
            }
            Compression::Deflate => {
                write_image(&mut encoder, &level, raster, &transform, level_index, Deflate::default())?
            }
        }

        let (rows, cols) = level.dim();
        let done = !options.overviews
            || (rows <= options.overview_min_size && cols <= options.overview_min_size)
            || rows < 2
            || cols < 2;
        if done {
            break;
        }

        level = downsample(&level, raster.nodata());
        level_index += 1;
    }

    Ok(())
}

fn write_image<T, W, D>(
    encoder: &mut TiffEncoder<W, TiffKindStandard>,
    data: &Array2<T>,
    raster: &Raster<T>,
    transform: &GeoTransform,
    level_index: u32,
    compression: D,
) -> Result<()>
where
    T: TiffPixel,
    [T]: TiffValue,
    W: Write + Seek,
    D: TiffCompression,
{
    let (rows, cols) = data.dim();
    let mut image =
        encoder.new_image_with_compression::<T::Color, D>(cols as u32, rows as u32, compression)?;

    let dir = image.encoder();
    if level_index > 0 {
        dir.write_tag(geo_tag(TAG_NEW_SUBFILE_TYPE), 1u32)?;
    }

    if transform.row_rotation == 0.0 && transform.col_rotation == 0.0 {
        let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
        dir.write_tag(geo_tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
        let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
        dir.write_tag(geo_tag(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let t = transform;
        let matrix = [
            t.pixel_width, t.row_rotation, 0.0, t.origin_x,
            t.col_rotation, t.pixel_height, 0.0, t.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(geo_tag(TAG_MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let geokeys = geo_key_directory(raster.crs());
    dir.write_tag(geo_tag(TAG_GEO_KEY_DIRECTORY), &geokeys[..])?;

    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = format_nodata(nd);
        dir.write_tag(geo_tag(TAG_GDAL_NODATA), text.as_str())?;
    }

    let samples: Vec<T> = data.iter().copied().collect();
    image.write_data(&samples)?;
    Ok(())
}

/// GeoKeyDirectory with model type, raster type and (when known) the EPSG code
fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).filter(|&c| c <= u16::MAX as u32);
    // EPSG 4000-4999 are geographic 2D systems
    let geographic = epsg.is_some_and(|c| (4000..5000).contains(&c));

    let mut keys: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 }],
        [KEY_RASTER_TYPE, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic { KEY_GEOGRAPHIC_TYPE } else { KEY_PROJECTED_CS_TYPE };
        keys.push([key, 0, 1, code as u16]);
    }

    let mut dir = vec![1, 1, 0, keys.len() as u16];
    dir.extend(keys.iter().flatten());
    dir
}

fn format_nodata(nd: f64) -> String {
    if nd.fract() == 0.0 && nd.abs() < 1e15 {
        format!("{}", nd as i64)
    } else {
        format!("{}", nd)
    }
}

fn overview_transform(base: &GeoTransform, level: u32) -> GeoTransform {
    let factor = f64::from(1u32 << level.min(31));
    GeoTransform {
        pixel_width: base.pixel_width * factor,
        pixel_height: base.pixel_height * factor,
        row_rotation: base.row_rotation * factor,
        col_rotation: base.col_rotation * factor,
        ..*base
    }
}

/// Halve a level by averaging 2x2 blocks of valid cells
fn downsample<T: RasterElement>(data: &Array2<T>, nodata: Option<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let out_rows = rows.div_ceil(2);
    let out_cols = cols.div_ceil(2);
    let fill = nodata.unwrap_or_else(T::default_nodata);

    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let mut sum = 0.0;
        let mut n = 0usize;
        for rr in (2 * r)..(2 * r + 2).min(rows) {
            for cc in (2 * c)..(2 * c + 2).min(cols) {
                let v = data[(rr, cc)];
                if v.is_nodata(nodata) {
                    continue;
                }
                if let Some(f) = v.to_f64() {
                    sum += f;
                    n += 1;
                }
            }
        }
        if n == 0 {
            return fill;
        }
        T::from_f64_saturating(sum / n as f64).unwrap_or(fill)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster<u16> {
        let mut raster: Raster<u16> = Raster::new(40, 30);
        for r in 0..40 {
            for c in 0..30 {
                raster.set(r, c, (r * 30 + c) as u16).unwrap();
            }
        }
        raster.set(0, 0, 65535).unwrap();
        raster.set_transform(GeoTransform::new(-72.5, -33.0, 0.00025, -0.00025));
        raster.set_crs(Some(CRS::wgs84()));
        raster.set_nodata(Some(65535));
        raster
    }

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let raster = sample_raster();
        let options = GeoTiffOptions {
            overview_min_size: 8,
            ..Default::default()
        };
        let bytes = write_geotiff_to_buffer(&raster, Some(options)).unwrap();
        let back: Raster<u16> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (40, 30));
        assert_eq!(back.get(3, 7).unwrap(), 97);
        assert_eq!(back.nodata(), Some(65535));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(4326));

        let gt = back.transform();
        assert!((gt.origin_x - -72.5).abs() < 1e-12);
        assert!((gt.pixel_height - -0.00025).abs() < 1e-15);
    }

    #[test]
    fn test_file_roundtrip_projected_deflate() {
        let mut raster: Raster<f32> = Raster::filled(12, 9, 3.5);
        raster.set_crs(Some(CRS::from_epsg(32719)));
        raster.set_transform(GeoTransform::new(350000.0, 6300000.0, 30.0, -30.0));

        let tmp = tempfile::NamedTempFile::new().unwrap();
        let options = GeoTiffOptions {
            compression: Compression::Deflate,
            overviews: false,
            ..Default::default()
        };
        write_geotiff(&raster, tmp.path(), Some(options)).unwrap();

        let back: Raster<f64> = read_geotiff(tmp.path()).unwrap();
        assert_eq!(back.shape(), (12, 9));
        assert_eq!(back.get(11, 8).unwrap(), 3.5);
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32719));
        assert!(back.nodata().is_none());
    }

    #[test]
    fn test_projected_f64_keeps_transform_crs_and_negative_nodata() {
        let mut raster: Raster<f64> = Raster::filled(8, 8, 120.0);
        raster.set(2, 3, -9999.0).unwrap();
        raster.set_transform(GeoTransform::new(500000.0, 4000000.0, 30.0, -30.0));
        raster.set_crs(Some(CRS::from_epsg(32633)));
        raster.set_nodata(Some(-9999.0));

        let options = GeoTiffOptions {
            overviews: false,
            ..Default::default()
        };
        let bytes = write_geotiff_to_buffer(&raster, Some(options)).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32633));
        assert_eq!(back.nodata(), Some(-9999.0));
        assert!(back.is_nodata(back.get(2, 3).unwrap()));
        assert!(!back.is_nodata(back.get(0, 0).unwrap()));
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let mut raster: Raster<f32> = Raster::filled(4, 5, 1.0);
        raster.set_transform(GeoTransform::from_gdal([1000.0, 10.0, 2.0, 5000.0, 1.5, -10.0]));

        let options = GeoTiffOptions {
            overviews: false,
            ..Default::default()
        };
        let bytes = write_geotiff_to_buffer(&raster, Some(options)).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&bytes).unwrap();
        assert_eq!(back.transform(), raster.transform());
    }

    #[test]
    fn test_downsample_skips_nodata() {
        let data = Array2::from_shape_vec((2, 3), vec![2u16, 4, 9, 65535, 6, 65535]).unwrap();
        let half = downsample(&data, Some(65535));
        assert_eq!(half.dim(), (1, 2));
        assert_eq!(half[(0, 0)], 4);
        assert_eq!(half[(0, 1)], 9);
    }

    #[test]
    fn test_geo_key_directory() {
        let keys = geo_key_directory(Some(&CRS::from_epsg(32633)));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(&keys[12..16], &[KEY_PROJECTED_CS_TYPE, 0, 1, 32633]);

        let keys = geo_key_directory(None);
        assert_eq!(keys[3], 2);
    }
}
