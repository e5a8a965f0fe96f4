//! Native GeoTIFF reading and writing via the `tiff` crate
//!
//! Georeferencing travels in the standard GeoTIFF tags: ModelPixelScale
//! (33550) + ModelTiepoint (33922) for the transform, the GeoKeyDirectory
//! (34735) for the EPSG code and GDAL_NODATA (42113) for the nodata value.

use std::fs::File;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::io::staged::{path_locks, StagedWriter};
use crate::raster::{GeoTransform, Raster, RasterElement};

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// Read a GeoTIFF file into a raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)
        .map_err(|e| Error::Input(format!("{}: not a TIFF file: {e}", path.display())))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Input(format!("{}: cannot read dimensions: {e}", path.display())))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Input(format!("{}: cannot read image data: {e}", path.display())))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_buffer(&buf),
        DecodingResult::F64(buf) => cast_buffer(&buf),
        DecodingResult::U8(buf) => cast_buffer(&buf),
        DecodingResult::U16(buf) => cast_buffer(&buf),
        DecodingResult::U32(buf) => cast_buffer(&buf),
        DecodingResult::I8(buf) => cast_buffer(&buf),
        DecodingResult::I16(buf) => cast_buffer(&buf),
        DecodingResult::I32(buf) => cast_buffer(&buf),
        _ => {
            return Err(Error::Input(format!(
                "{}: unsupported TIFF pixel format",
                path.display()
            )))
        }
    };
    if data.len() != rows * cols {
        return Err(Error::Input(format!(
            "{}: pixel count {} does not match {cols}x{rows}",
            path.display(),
            data.len()
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(read_geotransform(&mut decoder, path)?);
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));
    debug!(
        path = %path.display(),
        rows, cols,
        epsg = raster.crs().map(|c| c.epsg()),
        "read geotiff"
    );
    Ok(raster)
}

fn cast_buffer<T: RasterElement, S: Copy + num_traits::NumCast>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Input(format!("{}: missing ModelPixelScale tag", path.display())))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Input(format!("{}: missing ModelTiepoint tag", path.display())))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::Input(format!(
            "{}: malformed georeferencing tags",
            path.display()
        )));
    }
    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])
}

/// EPSG code from the GeoKeyDirectory, if present and supported
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<Crs> {
    let keys = decoder
        .get_tag(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|v| v.into_u16_vec().ok())?;
    // Header is [version, revision, minor, count]; entries are
    // [key, tag_location, count, value], value inline when location == 0
    for entry in keys.get(4..)?.chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location == 0 && (key == KEY_PROJECTED_CS_TYPE || key == KEY_GEOGRAPHIC_TYPE) {
            return Crs::from_epsg(value as u32).ok();
        }
    }
    None
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    let value: f64 = text.trim().trim_end_matches('\0').parse().ok()?;
    T::from_f64(value)
}

/// Write a raster as a 32-bit float GeoTIFF, staged and atomically renamed
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let lock = path_locks().for_path(path);
    let _guard = lock.lock().unwrap();

    let staged = StagedWriter::begin(path)?;
    encode_geotiff(raster, staged.create()?).map_err(|e| match e {
        Error::Write { .. } => e,
        other => Error::Write {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;
    staged.commit()?;
    Ok(())
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Input(format!("TIFF encoder error: {e}")))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Input(format!("Cannot create TIFF image: {e}")))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| Error::Input(format!("Cannot write scale tag: {e}")))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| Error::Input(format!("Cannot write tiepoint tag: {e}")))?;

    let geokeys = build_geokeys(raster.crs());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| Error::Input(format!("Cannot write geokey tag: {e}")))?;

    if let Some(nodata) = raster.nodata().and_then(RasterElement::to_f64) {
        let text = format!("{nodata}");
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| Error::Input(format!("Cannot write nodata tag: {e}")))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Input(format!("Cannot write image data: {e}")))?;
    Ok(())
}

fn build_geokeys(crs: Option<Crs>) -> Vec<u16> {
    // GTRasterTypeGeoKey = RasterPixelIsArea
    match crs {
        Some(crs) if crs.is_geographic() => vec![
            1, 1, 0, 3,
            KEY_MODEL_TYPE, 0, 1, 2,
            KEY_RASTER_TYPE, 0, 1, 1,
            KEY_GEOGRAPHIC_TYPE, 0, 1, crs.epsg() as u16,
        ],
        Some(crs) => vec![
            1, 1, 0, 3,
            KEY_MODEL_TYPE, 0, 1, 1,
            KEY_RASTER_TYPE, 0, 1, 1,
            KEY_PROJECTED_CS_TYPE, 0, 1, crs.epsg() as u16,
        ],
        None => vec![
            1, 1, 0, 2,
            KEY_MODEL_TYPE, 0, 1, 1,
            KEY_RASTER_TYPE, 0, 1, 1,
        ],
    }
}
