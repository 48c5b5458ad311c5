use std::{fs::File, io::BufReader, path::Path};

use burn::tensor::{Data, Shape};
use tiff::{
    decoder::{Decoder, DecodingResult},
    encoder::{colortype, TiffEncoder},
};

use crate::error::RasterError;

/// Reads a single band of a raster file as a `[height, width]` array.
///
/// `band` is 1-based, the way GIS tools number bands.
pub trait BandReader: Send + Sync {
    fn read_band(&self, path: &Path, band: usize) -> Result<Data<f32, 2>, RasterError>;
}

/// [`BandReader`] for GeoTIFF / TIFF chips.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffReader;

impl BandReader for TiffReader {
    fn read_band(&self, path: &Path, band: usize) -> Result<Data<f32, 2>, RasterError> {
        // The handle lives only for this call and is closed on every return path.
        let file = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(file)?;
        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        let samples = to_f32(decoder.read_image()?);

        let values = select_band(samples, height, width, band)?;

        Ok(Data::new(values, Shape::new([height, width])))
    }
}

/// Writes `data` as a single-band 32-bit float TIFF.
pub fn write_band(path: &Path, data: &Data<f32, 2>) -> Result<(), RasterError> {
    let [height, width] = data.shape.dims;
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;
    encoder.write_image::<colortype::Gray32Float>(width as u32, height as u32, &data.value)?;

    Ok(())
}

fn select_band(
    samples: Vec<f32>,
    height: usize,
    width: usize,
    band: usize,
) -> Result<Vec<f32>, RasterError> {
    let pixels = height * width;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(RasterError::Layout {
            samples: samples.len(),
            height,
            width,
        });
    }

    let available = samples.len() / pixels;
    if band == 0 || band > available {
        return Err(RasterError::BandOutOfRange { band, available });
    }

    if available == 1 {
        return Ok(samples);
    }

    // pixel-interleaved: every `available`-th sample belongs to the same band
    Ok(samples
        .into_iter()
        .skip(band - 1)
        .step_by(available)
        .collect())
}

fn to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_written_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b02.tif");
        let values: Vec<f32> = (0..12).map(|v| v as f32 * 0.5).collect();
        write_band(&path, &Data::new(values.clone(), Shape::new([3, 4]))).unwrap();

        let band = TiffReader.read_band(&path, 1).unwrap();

        assert_eq!(band.shape.dims, [3, 4]);
        assert_eq!(band.value, values);
    }

    #[test]
    fn integer_samples_are_widened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::Gray8>(2, 2, &[0u8, 1, 1, 255])
            .unwrap();

        let band = TiffReader.read_band(&path, 1).unwrap();

        assert_eq!(band.value, vec![0.0, 1.0, 1.0, 255.0]);
    }

    #[test]
    fn picks_requested_band_from_interleaved_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::RGB8>(2, 1, &[1u8, 2, 3, 4, 5, 6])
            .unwrap();

        assert_eq!(TiffReader.read_band(&path, 1).unwrap().value, vec![1.0, 4.0]);
        assert_eq!(TiffReader.read_band(&path, 3).unwrap().value, vec![3.0, 6.0]);
        assert!(matches!(
            TiffReader.read_band(&path, 4),
            Err(RasterError::BandOutOfRange {
                band: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TiffReader.read_band(&dir.path().join("nope.tif"), 1);

        assert!(matches!(result, Err(RasterError::Io(_))));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();

        assert!(TiffReader.read_band(&path, 1).is_err());
    }
}
