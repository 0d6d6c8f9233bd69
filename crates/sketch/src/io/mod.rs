use std::path::Path;

use crate::{
    error::Result,
    pipeline::PreparedDrawing,
    report::ScoreResult,
    types::{RasterImage, ShapeSet},
};

impl ScoreResult {
    /// Export as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ShapeSet {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

impl PreparedDrawing {
    /// Write the normalized canvas as an image (format from the extension)
    pub fn save_canvas<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.canvas.save(path)?;
        Ok(())
    }
}

/// Decode every image, failing on the first one that cannot be read.
pub fn load_rasters<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RasterImage>> {
    paths.iter().map(RasterImage::open).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SketchError;

    #[test]
    fn missing_file_is_an_image_error() {
        let err = load_rasters(&["/definitely/not/here.png"]).unwrap_err();
        assert!(matches!(err, SketchError::ImageLoad(_)));
    }

    #[test]
    fn shape_set_exports_json() {
        let json = ShapeSet::empty(128, 128).to_json_string().expect("Should serialize");
        assert!(json.contains("\"canvas_width\": 128"));
    }
}
