//! Symbol-reading backends available to the CLI.

use image::GrayImage;
use log::trace;

use qrgrade_decode::{RawSymbol, SymbolReader};

/// QR decoding through the pure-Rust `rqrr` detector.
pub struct RqrrReader;

impl SymbolReader for RqrrReader {
    fn name(&self) -> &str {
        "rqrr"
    }

    fn read(&self, image: &GrayImage) -> Vec<RawSymbol> {
        let mut prepared = rqrr::PreparedImage::prepare(image.clone());
        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| {
                let (_, text) = match grid.decode() {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        trace!("rqrr grid rejected: {err}");
                        return None;
                    }
                };
                let xs = grid.bounds.map(|p| p.x);
                let ys = grid.bounds.map(|p| p.y);
                let (x0, x1) = (*xs.iter().min()?, *xs.iter().max()?);
                let (y0, y1) = (*ys.iter().min()?, *ys.iter().max()?);
                Some(RawSymbol {
                    text,
                    x: x0,
                    y: y0,
                    w: x1 - x0,
                    h: y1 - y0,
                })
            })
            .collect()
    }
}

/// Resolve backend names from the command line.
///
/// Unknown names are an error so a typo does not silently scan with nothing.
pub fn select_backends(names: &[String]) -> Result<Vec<Box<dyn SymbolReader>>, String> {
    let mut readers: Vec<Box<dyn SymbolReader>> = Vec::new();
    for name in names {
        match name.as_str() {
            "rqrr" => readers.push(Box::new(RqrrReader)),
            other => return Err(format!("unknown backend {other:?}, available: rqrr")),
        }
    }
    if readers.is_empty() {
        readers.push(Box::new(RqrrReader));
    }
    Ok(readers)
}
