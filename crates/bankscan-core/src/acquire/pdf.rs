//! PDF loading, layout text, and page-image extraction using lopdf and
//! pdf-extract.

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::PageImage;
use crate::error::AcquireError;

/// A loaded statement PDF.
pub struct StatementPdf {
    document: Document,
    raw_data: Vec<u8>,
}

impl StatementPdf {
    /// Load a PDF from bytes.
    ///
    /// Bank statements are frequently "protected" with a blank owner
    /// password; those are decrypted transparently. A real password is a
    /// hard failure.
    pub fn load(data: &[u8]) -> Result<Self, AcquireError> {
        let mut doc =
            Document::load_mem(data).map_err(|e| AcquireError::Parse(e.to_string()))?;

        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(AcquireError::Encrypted);
            }
            debug!("decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes.
            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| AcquireError::Parse(format!("failed to save decrypted PDF: {e}")))?;
            decrypted
        } else {
            data.to_vec()
        };

        if doc.get_pages().is_empty() {
            return Err(AcquireError::NoPages);
        }

        Ok(Self {
            document: doc,
            raw_data,
        })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Layout-preserving text of the first `max_pages` pages, joined by
    /// newlines.
    pub fn extract_text(&self, max_pages: usize) -> Result<String, AcquireError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
            .map_err(|e| AcquireError::TextExtraction(e.to_string()))?;

        Ok(pages
            .into_iter()
            .take(max_pages)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Page images of the first `max_pages` pages, in page order.
    ///
    /// Scanned statements embed each page as a single full-resolution image
    /// object, so pulling those images stands in for rasterization. A page
    /// that fails to decode is skipped rather than aborting the document.
    pub fn page_images(&self, max_pages: usize) -> Vec<PageImage> {
        let page_numbers: Vec<u32> = self
            .document
            .get_pages()
            .keys()
            .copied()
            .take(max_pages)
            .collect();

        let mut result = Vec::new();
        for number in page_numbers {
            match self.extract_page_images(number) {
                Ok(images) if !images.is_empty() => {
                    // A page scan is one big image; if decorations are
                    // embedded alongside it, keep the largest.
                    if let Some(image) = images
                        .into_iter()
                        .max_by_key(|i| u64::from(i.width()) * u64::from(i.height()))
                    {
                        result.push(PageImage { number, image });
                    }
                }
                Ok(_) => trace!("page {number} has no image objects"),
                Err(e) => warn!("failed to extract images from page {number}: {e}"),
            }
        }

        // Some generators attach image streams without per-page resources;
        // fall back to document order in that case.
        if result.is_empty() {
            result = self
                .all_document_images()
                .into_iter()
                .take(max_pages)
                .enumerate()
                .map(|(i, image)| PageImage {
                    number: i as u32 + 1,
                    image,
                })
                .collect();
        }

        debug!("collected {} page images", result.len());
        result
    }

    /// Images referenced from one page's XObject resources.
    fn extract_page_images(&self, page: u32) -> Result<Vec<DynamicImage>, AcquireError> {
        let pages = self.document.get_pages();
        let page_id = pages
            .get(&page)
            .ok_or_else(|| AcquireError::PageExtraction(format!("no page {page}")))?;

        let mut images = Vec::new();

        if let Some(resources) = self.page_resources(*page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) =
                    self.document.dereference(xobjects)
                {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        if let Ok((_, obj)) = self.document.dereference(obj_ref) {
                            if let Some(img) = self.decode_image_object(obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        Ok(images)
    }

    /// Every decodable image stream in the document, in object order.
    fn all_document_images(&self) -> Vec<DynamicImage> {
        self.document
            .objects
            .iter()
            .filter_map(|(_, object)| self.decode_image_object(object))
            .collect()
    }

    /// Decode an image XObject stream into pixels, if it is one we can read.
    fn decode_image_object(&self, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
        let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
        trace!("found image object: {width}x{height}");

        let filter_name = dict.get(b"Filter").ok().and_then(|filter| match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        });

        match filter_name {
            Some(b"DCTDecode") => {
                // JPEG scan: the stream content is the compressed file.
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("unsupported image codec in PDF stream");
                return None;
            }
            _ => {}
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => {
                    self.document.get_object(*r).ok().and_then(|o| o.as_name().ok())
                }
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8);

        if bits != 8 {
            trace!("unsupported bits per component: {bits}");
            return None;
        }

        raw_pixels_to_image(&data, width, height, color_space)
    }

    /// Resources dictionary for a page, walking up the page tree for
    /// inherited entries.
    fn page_resources(&self, page_id: ObjectId) -> Option<lopdf::Dictionary> {
        let mut node_id = page_id;
        loop {
            let Ok(Object::Dictionary(dict)) = self.document.get_object(node_id) else {
                return None;
            };

            if let Ok(resources) = dict.get(b"Resources") {
                if let Ok((_, Object::Dictionary(res_dict))) =
                    self.document.dereference(resources)
                {
                    return Some(res_dict.clone());
                }
            }

            match dict.get(b"Parent") {
                Ok(Object::Reference(parent_id)) => node_id = *parent_id,
                _ => return None,
            }
        }
    }
}

/// Expand raw RGB or grayscale samples into an RGBA image.
fn raw_pixels_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
) -> Option<DynamicImage> {
    let pixel_count = (width as usize) * (height as usize);
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixel_count * 3 => {
            for chunk in data[..pixel_count * 3].chunks_exact(3) {
                rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
            }
        }
        b"DeviceGray" | b"G" if data.len() >= pixel_count => {
            for &gray in &data[..pixel_count] {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
        }
        _ => {
            trace!(
                "could not decode raw image: colorspace={:?}, data_len={}",
                String::from_utf8_lossy(color_space),
                data.len()
            );
            return None;
        }
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            StatementPdf::load(b"definitely not a pdf"),
            Err(AcquireError::Parse(_))
        ));
    }

    #[test]
    fn test_raw_gray_pixels_decode() {
        let data = vec![128u8; 4];
        let image = raw_pixels_to_image(&data, 2, 2, b"DeviceGray").unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
    }

    #[test]
    fn test_raw_rgb_pixels_decode() {
        let data = vec![10u8; 12];
        let image = raw_pixels_to_image(&data, 2, 2, b"DeviceRGB").unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
    }

    #[test]
    fn test_truncated_pixel_data_rejected() {
        let data = vec![10u8; 3];
        assert!(raw_pixels_to_image(&data, 2, 2, b"DeviceRGB").is_none());
    }
}
