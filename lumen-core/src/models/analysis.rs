use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Normalized rectangle locating a detected region within an image.
/// Every field is a fraction of the source image's width/height in [0, 1],
/// origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, ValidationError> {
        for (field, value) in [("x", x), ("y", y), ("width", width), ("height", height)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfRange { field, value });
            }
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

/// Normalized classifier output for one image. Immutable once produced.
///
/// `processing_time_ms` is the gateway's own wall-clock measurement of the
/// classification call, never a figure reported by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    pub processing_time_ms: u64,
}

impl AnalysisResult {
    pub fn new(
        probability: f64,
        bounding_box: Option<BoundingBox>,
        processing_time_ms: u64,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ValidationError::OutOfRange {
                field: "probability",
                value: probability,
            });
        }
        Ok(Self {
            probability,
            bounding_box,
            processing_time_ms,
        })
    }

    /// Re-check the constructor invariants. Deserialization bypasses
    /// [`AnalysisResult::new`], so boundary code revalidates parsed values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(self.probability, None, self.processing_time_ms)?;
        if let Some(b) = &self.bounding_box {
            BoundingBox::new(b.x, b.y, b.width, b.height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_accepts_unit_range() {
        let bbox = BoundingBox::new(0.0, 0.25, 0.5, 1.0);
        assert!(bbox.is_ok());
    }

    #[test]
    fn test_bounding_box_rejects_out_of_range() {
        let too_big = BoundingBox::new(0.1, 0.1, 1.5, 0.2);
        match too_big {
            Err(ValidationError::OutOfRange { field, value }) => {
                assert_eq!(field, "width");
                assert_eq!(value, 1.5);
            }
            other => panic!("Expected OutOfRange, got {:?}", other),
        }

        assert!(BoundingBox::new(-0.01, 0.0, 0.1, 0.1).is_err());
    }

    #[test]
    fn test_bounding_box_rejects_nan() {
        assert!(BoundingBox::new(f64::NAN, 0.0, 0.1, 0.1).is_err());
    }

    #[test]
    fn test_analysis_result_rejects_out_of_range_probability() {
        assert!(AnalysisResult::new(1.01, None, 0).is_err());
        assert!(AnalysisResult::new(-0.5, None, 0).is_err());
        assert!(AnalysisResult::new(0.0, None, 0).is_ok());
        assert!(AnalysisResult::new(1.0, None, 0).is_ok());
    }

    #[test]
    fn test_analysis_result_wire_shape() {
        let result = AnalysisResult::new(
            0.87,
            Some(BoundingBox::new(0.1, 0.2, 0.3, 0.4).unwrap()),
            120,
        )
        .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["probability"], 0.87);
        assert_eq!(json["boundingBox"]["x"], 0.1);
        assert_eq!(json["processingTimeMs"], 120);
    }

    #[test]
    fn test_analysis_result_omits_absent_bounding_box() {
        let result = AnalysisResult::new(0.2, None, 45).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("boundingBox").is_none());
    }
}
