//! Embed raster images as full-page PDF image XObjects.
//!
//! Gray and RGB JPEG sources are embedded byte for byte with `DCTDecode`;
//! CMYK JPEGs are re-encoded as RGB. Everything else is stored as raw
//! samples behind `FlateDecode`. Grayscale images stay
//! single-channel. The page is sized so one pixel maps to `72 / dpi` points.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::DocumentMetadata;
use crate::error::PdfOpsError;

/// Default resolution assumed for images that carry none.
pub const DEFAULT_IMAGE_DPI: u32 = 96;

/// Quality for JPEGs that cannot be embedded as they are.
const JPEG_QUALITY: u8 = 90;

/// One page per readable image, in input order.
///
/// Unreadable images are logged and skipped. Fails when none could be
/// embedded.
pub fn images_to_pdf(
    paths: &[PathBuf],
    dpi: u32,
    metadata: Option<&DocumentMetadata>,
) -> Result<Document, PdfOpsError> {
    let dpi = dpi.max(1) as f32;
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(paths.len());
    let mut last_error = None;

    for path in paths {
        match embed_page(&mut doc, path, pages_id, dpi) {
            Ok(page_id) => kids.push(Object::Reference(page_id)),
            Err(e) => {
                warn!("Skipping image {}: {}", path.display(), e);
                last_error = Some(e);
            }
        }
    }

    if kids.is_empty() {
        return Err(last_error.unwrap_or(PdfOpsError::NoPagesCopied {
            requested: paths.len(),
        }));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(meta) = metadata.filter(|m| !m.is_empty()) {
        let info_id = doc.add_object(meta.to_info_dictionary());
        doc.trailer.set("Info", info_id);
    }
    Ok(doc)
}

fn embed_page(
    doc: &mut Document,
    path: &Path,
    pages_id: lopdf::ObjectId,
    dpi: f32,
) -> Result<lopdf::ObjectId, PdfOpsError> {
    let image_err = |detail: String| PdfOpsError::Image {
        path: path.to_path_buf(),
        detail,
    };

    let bytes = std::fs::read(path).map_err(|e| image_err(e.to_string()))?;
    let img = image::load_from_memory(&bytes).map_err(|e| image_err(e.to_string()))?;
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(image_err("image has no pixels".into()));
    }

    let xobject = match image::guess_format(&bytes) {
        Ok(ImageFormat::Jpeg) => match jpeg_components(&bytes) {
            Some(components @ (1 | 3)) => jpeg_xobject(bytes, width, height, components),
            _ => image_xobject(&img, true).map_err(image_err)?,
        },
        _ => image_xobject(&img, false).map_err(image_err)?,
    };
    let image_id = doc.add_object(xobject);

    let w_pt = width as f32 * 72.0 / dpi;
    let h_pt = height as f32 * 72.0 / dpi;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    w_pt.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    h_pt.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            w_pt.into(),
            h_pt.into(),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    debug!(
        "Embedded {} ({}x{} px, {:.0}x{:.0} pt)",
        path.display(),
        width,
        height,
        w_pt,
        h_pt
    );
    Ok(page_id)
}

/// The original JPEG stream as an image XObject.
fn jpeg_xobject(bytes: Vec<u8>, width: u32, height: u32, components: u8) -> Stream {
    let color_space = if components == 1 { "DeviceGray" } else { "DeviceRGB" };
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    Stream::new(dict, bytes).with_compression(false)
}

/// Component count from the first start-of-frame segment of a JPEG.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            return bytes.get(pos + 9).copied();
        }
        if marker == 0xDA {
            return None;
        }
        pos += 2 + len;
    }
    None
}

fn image_xobject(img: &DynamicImage, as_jpeg: bool) -> Result<Stream, String> {
    let gray = !img.color().has_color();
    let (color_space, samples) = if gray {
        ("DeviceGray", DynamicImage::ImageLuma8(img.to_luma8()))
    } else {
        ("DeviceRGB", DynamicImage::ImageRgb8(img.to_rgb8()))
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width() as i64,
        "Height" => img.height() as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    };

    if as_jpeg {
        let mut buf = Cursor::new(Vec::new());
        samples
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
            .map_err(|e| format!("JPEG encode failed: {e}"))?;
        dict.set("Filter", "DCTDecode");
        Ok(Stream::new(dict, buf.into_inner()).with_compression(false))
    } else {
        let mut stream = Stream::new(dict, samples.into_bytes());
        stream
            .compress()
            .map_err(|e| format!("Flate compression failed: {e}"))?;
        Ok(stream)
    }
}
