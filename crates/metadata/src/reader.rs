//! EXIF reader built on [`kamadak-exif`](exif).
//!
//! Every EXIF field is copied into the [`MetadataBag`] under a directory named
//! after the IFD it was found in. A `File` directory is always present, so a
//! readable image without any EXIF segment still yields a (small) bag rather
//! than an error.

use crate::bag::MetadataBag;
use crate::error::{ErrorKind, Result};
use crate::{Extracted, MetadataExtractor};
use exif::{Context, Exif, In, Reader, Tag, Value};
use exn::ResultExt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::instrument;

pub const FILE_DIRECTORY: &str = "File";
pub const IFD0_DIRECTORY: &str = "Exif IFD0";
pub const SUB_IFD_DIRECTORY: &str = "Exif SubIFD";
pub const GPS_DIRECTORY: &str = "GPS";
pub const INTEROP_DIRECTORY: &str = "Interoperability";
pub const THUMBNAIL_DIRECTORY: &str = "Exif Thumbnail";

/// Reads EXIF metadata and the embedded JPEG thumbnail from image files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn extract(&self, path: &Path) -> Result<Extracted> {
        let file = File::open(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        let size = file.metadata().or_raise(|| ErrorKind::Io(path.to_path_buf()))?.len();

        let mut metadata = MetadataBag::new();
        if let Some(name) = path.file_name() {
            metadata.insert(FILE_DIRECTORY, "FileName", name.to_string_lossy());
        }
        metadata.insert(FILE_DIRECTORY, "FileSize", format!("{size} bytes"));

        let mut reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(container)) => {
                tracing::debug!(container, "No EXIF segment in image");
                return Ok(Extracted { metadata, thumbnail: Vec::new() });
            },
            Err(exif::Error::Io(e)) => return Err(e).or_raise(|| ErrorKind::Io(path.to_path_buf())),
            Err(e) => return Err(e).or_raise(|| ErrorKind::UnreadableImage(path.to_path_buf())),
        };

        for field in exif.fields() {
            let value = field.display_value().with_unit(&exif).to_string();
            metadata.insert(directory_of(field.tag, field.ifd_num), field.tag.to_string(), value);
        }
        preprocess_gps(&exif, &mut metadata);
        let thumbnail = thumbnail(&exif).unwrap_or_default();
        tracing::debug!(directories = metadata.len(), thumbnail = thumbnail.len(), "Metadata extracted");
        Ok(Extracted { metadata, thumbnail })
    }
}

/// Directory name for a field, mirroring the IFD layout of the file.
fn directory_of(tag: Tag, ifd: In) -> &'static str {
    if ifd == In::THUMBNAIL {
        return THUMBNAIL_DIRECTORY;
    }
    match tag.context() {
        Context::Exif => SUB_IFD_DIRECTORY,
        Context::Gps => GPS_DIRECTORY,
        Context::Interop => INTEROP_DIRECTORY,
        _ => IFD0_DIRECTORY,
    }
}

/// The JPEG thumbnail referenced by the thumbnail IFD, sliced out of the raw
/// TIFF buffer. `None` when the image has no (or a truncated) thumbnail.
fn thumbnail(exif: &Exif) -> Option<Vec<u8>> {
    let uint = |tag| exif.get_field(tag, In::THUMBNAIL).and_then(|f| f.value.get_uint(0));
    let offset = usize::try_from(uint(Tag::JPEGInterchangeFormat)?).ok()?;
    let length = usize::try_from(uint(Tag::JPEGInterchangeFormatLength)?).ok()?;
    exif.buf().get(offset..offset.checked_add(length)?).map(<[u8]>::to_vec)
}

/// Adds decimal `Latitude`/`Longitude` tags to the GPS directory, derived from
/// the degree/minute/second rationals and their hemisphere references.
fn preprocess_gps(exif: &Exif, metadata: &mut MetadataBag) {
    if let Some(latitude) = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S') {
        metadata.insert(GPS_DIRECTORY, "Latitude", format!("{latitude:.6}"));
    }
    if let Some(longitude) = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W') {
        metadata.insert(GPS_DIRECTORY, "Longitude", format!("{longitude:.6}"));
    }
}

fn gps_coordinate(exif: &Exif, value: Tag, reference: Tag, negative: u8) -> Option<f64> {
    let Value::Rational(parts) = &exif.get_field(value, In::PRIMARY)?.value else {
        return None;
    };
    let decimal = parts.iter().zip([1.0, 60.0, 3600.0]).map(|(part, divisor)| part.to_f64() / divisor).sum::<f64>();
    if !decimal.is_finite() {
        return None;
    }
    let southern_or_western = match exif.get_field(reference, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Ascii(values)) => values.first().and_then(|v| v.first()).is_some_and(|c| c.eq_ignore_ascii_case(&negative)),
        _ => false,
    };
    Some(if southern_or_western { -decimal } else { decimal })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::{Field, Rational};
    use rstest::rstest;
    use std::io::{Cursor, Write};

    const THUMBNAIL: &[u8] = &[0xff, 0xd8, 0xff, 0xd9];

    fn ascii(tag: Tag, ifd_num: In, text: &str) -> Field {
        Field { tag, ifd_num, value: Value::Ascii(vec![text.as_bytes().to_vec()]) }
    }

    fn rationals(tag: Tag, parts: [(u32, u32); 3]) -> Field {
        Field { tag, ifd_num: In::PRIMARY, value: Value::Rational(parts.into_iter().map(Rational::from).collect()) }
    }

    /// SOI, an optional APP1 segment holding `tiff`, EOI.
    fn jpeg(tiff: Option<&[u8]>) -> Vec<u8> {
        let mut jpeg = vec![0xff, 0xd8];
        if let Some(tiff) = tiff {
            let length = u16::try_from(2 + 6 + tiff.len()).unwrap();
            jpeg.extend([0xff, 0xe1]);
            jpeg.extend(length.to_be_bytes());
            jpeg.extend(b"Exif\0\0");
            jpeg.extend(tiff);
        }
        jpeg.extend([0xff, 0xd9]);
        jpeg
    }

    /// A geotagged JPEG whose thumbnail IFD embeds [`THUMBNAIL`].
    fn geotagged_jpeg(latitude_ref: &str, longitude_ref: &str) -> Vec<u8> {
        let fields = [
            ascii(Tag::Make, In::PRIMARY, "Pixport"),
            ascii(Tag::DateTimeOriginal, In::PRIMARY, "2016:09:19 14:15:35"),
            ascii(Tag::GPSLatitudeRef, In::PRIMARY, latitude_ref),
            rationals(Tag::GPSLatitude, [(51, 1), (30, 1), (0, 1)]),
            ascii(Tag::GPSLongitudeRef, In::PRIMARY, longitude_ref),
            rationals(Tag::GPSLongitude, [(0, 1), (7, 1), (30, 1)]),
            ascii(Tag::Make, In::THUMBNAIL, "Pixport"),
        ];
        let mut writer = exif::experimental::Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        writer.set_jpeg(THUMBNAIL, In::THUMBNAIL);
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        jpeg(Some(&tiff.into_inner()))
    }

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_reads_fields_and_thumbnail() {
        let bytes = geotagged_jpeg("N", "E");
        let file = fixture(&bytes);
        let extracted = ExifExtractor.extract(file.path()).unwrap();
        let bag = &extracted.metadata;

        assert!(bag.get(IFD0_DIRECTORY, "Make").is_some_and(|make| make.contains("Pixport")));
        assert!(bag.get(SUB_IFD_DIRECTORY, "DateTimeOriginal").is_some_and(|date| date.starts_with("2016")));
        assert!(bag.contains(GPS_DIRECTORY, "GPSLatitude"));
        assert!(bag.contains(THUMBNAIL_DIRECTORY, "Make"));
        assert!(!bag.contains(IFD0_DIRECTORY, "DateTimeOriginal"));
        assert_eq!(bag.get(FILE_DIRECTORY, "FileSize"), Some(format!("{} bytes", bytes.len()).as_str()));
        assert_eq!(extracted.thumbnail, THUMBNAIL);
    }

    #[rstest]
    #[case("N", "E", "51.500000", "0.125000")]
    #[case("S", "W", "-51.500000", "-0.125000")]
    #[case("s", "w", "-51.500000", "-0.125000")]
    #[case("S", "E", "-51.500000", "0.125000")]
    fn test_gps_hemispheres(
        #[case] latitude_ref: &str,
        #[case] longitude_ref: &str,
        #[case] latitude: &str,
        #[case] longitude: &str,
    ) {
        let file = fixture(&geotagged_jpeg(latitude_ref, longitude_ref));
        let bag = ExifExtractor.extract(file.path()).unwrap().metadata;
        assert_eq!(bag.get(GPS_DIRECTORY, "Latitude"), Some(latitude));
        assert_eq!(bag.get(GPS_DIRECTORY, "Longitude"), Some(longitude));
    }

    #[test]
    fn test_jpeg_without_exif() {
        let file = fixture(&jpeg(None));
        let extracted = ExifExtractor.extract(file.path()).unwrap();
        let directories: Vec<_> = extracted.metadata.directories().map(|(name, _)| name).collect();
        assert_eq!(directories, [FILE_DIRECTORY]);
        assert_eq!(
            extracted.metadata.get(FILE_DIRECTORY, "FileName"),
            file.path().file_name().and_then(|name| name.to_str())
        );
        assert!(extracted.thumbnail.is_empty());
    }

    #[rstest]
    #[case(Tag::Make, In::PRIMARY, IFD0_DIRECTORY)]
    #[case(Tag::DateTimeOriginal, In::PRIMARY, SUB_IFD_DIRECTORY)]
    #[case(Tag::GPSLatitude, In::PRIMARY, GPS_DIRECTORY)]
    #[case(Tag::InteroperabilityIndex, In::PRIMARY, INTEROP_DIRECTORY)]
    #[case(Tag::Make, In::THUMBNAIL, THUMBNAIL_DIRECTORY)]
    fn test_directory_of(#[case] tag: Tag, #[case] ifd: In, #[case] expected: &str) {
        assert_eq!(directory_of(tag, ifd), expected);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.jpg");
        let err = ExifExtractor.extract(&path).unwrap_err();
        assert_eq!(*err, ErrorKind::Io(path));
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"definitely not an image, just some text").unwrap();
        let err = ExifExtractor.extract(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::UnreadableImage(file.path().to_path_buf()));
    }
}
