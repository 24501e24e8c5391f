use crate::class_data::ClassTable;
use crate::classifier::{Classifier, ClassifierError};
use serde::Serialize;

const UNKNOWN_CLASS: &str = "Unknown Class";
const NOT_AVAILABLE: &str = "N/A";

/// Response body for a successful prediction. The serialized key names are
/// part of the public API contract consumed by the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "Predicted Disease")]
    pub disease: String,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
    #[serde(rename = "Pesticides")]
    pub pesticides: String,
    #[serde(rename = "Shop")]
    pub shop: String,
}

/// Replaces NaN and infinite scores with 0.0. This runs before the argmax,
/// so a non-finite maximum in the raw output changes which class is reported.
pub fn sanitize_scores(scores: &mut [f32]) {
    for score in scores.iter_mut() {
        if !score.is_finite() {
            *score = 0.0;
        }
    }
}

pub fn classify(
    classifier: &dyn Classifier,
    class_table: &ClassTable,
    image_data: &[u8],
) -> Result<Prediction, ClassifierError> {
    let raw_scores = classifier.scores(image_data)?;

    let mut scores = raw_scores.clone();
    sanitize_scores(&mut scores);

    let (index, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or_else(|| {
            ClassifierError::Inference("model returned an empty score vector".to_string())
        })?;

    let prediction = match class_table.get(index) {
        Some(record) => Prediction {
            disease: record.class_name.clone(),
            confidence,
            pesticides: record.pesticide.clone(),
            shop: record.shop.clone(),
        },
        None => {
            tracing::warn!(
                index,
                classes = class_table.len(),
                "predicted index has no class table entry"
            );
            Prediction {
                disease: UNKNOWN_CLASS.to_string(),
                confidence,
                pesticides: NOT_AVAILABLE.to_string(),
                shop: NOT_AVAILABLE.to_string(),
            }
        }
    };

    tracing::debug!(
        ?raw_scores,
        sanitized_scores = ?scores,
        index,
        disease = %prediction.disease,
        confidence,
        pesticides = %prediction.pesticides,
        shop = %prediction.shop,
        "prediction details"
    );

    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_data::ClassRecord;

    struct MockClassifier {
        scores: Vec<f32>,
    }

    impl Classifier for MockClassifier {
        fn scores(&self, _image_data: &[u8]) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.scores.clone())
        }
    }

    fn three_class_table() -> ClassTable {
        ClassTable::from_records(vec![
            ClassRecord {
                class_name: "A".to_string(),
                pesticide: "P1".to_string(),
                shop: "S1".to_string(),
            },
            ClassRecord {
                class_name: "B".to_string(),
                pesticide: "P2".to_string(),
                shop: "S2".to_string(),
            },
            ClassRecord {
                class_name: "C".to_string(),
                pesticide: "P3".to_string(),
                shop: "S3".to_string(),
            },
        ])
    }

    #[test]
    fn test_highest_confidence_class_wins() {
        let mock_classifier = MockClassifier {
            scores: vec![0.1, 0.2, 0.7],
        };

        let prediction = classify(&mock_classifier, &three_class_table(), &[0; 16]).unwrap();

        assert_eq!(
            prediction,
            Prediction {
                disease: "C".to_string(),
                confidence: 0.7,
                pesticides: "P3".to_string(),
                shop: "S3".to_string(),
            }
        );
    }

    #[test]
    fn test_nan_scores_are_zeroed_before_argmax() {
        let mock_classifier = MockClassifier {
            scores: vec![f32::NAN, 0.5, 0.25],
        };

        let prediction = classify(&mock_classifier, &three_class_table(), &[0; 16]).unwrap();

        assert_eq!(prediction.disease, "B");
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn test_all_non_finite_scores_report_first_class_with_zero_confidence() {
        let mock_classifier = MockClassifier {
            scores: vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY],
        };

        let prediction = classify(&mock_classifier, &three_class_table(), &[0; 16]).unwrap();

        assert_eq!(prediction.disease, "A");
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn test_confidence_is_finite_after_sanitization() {
        let mock_classifier = MockClassifier {
            scores: vec![0.3, f32::INFINITY, 0.6],
        };

        let prediction = classify(&mock_classifier, &three_class_table(), &[0; 16]).unwrap();

        assert!(prediction.confidence.is_finite());
        assert!((0.0..=1.0).contains(&prediction.confidence));
        assert_eq!(prediction.disease, "C");
    }

    #[test]
    fn test_index_beyond_table_falls_back_to_unknown_class() {
        let mock_classifier = MockClassifier {
            scores: vec![0.05, 0.05, 0.1, 0.8],
        };

        let prediction = classify(&mock_classifier, &three_class_table(), &[0; 16]).unwrap();

        assert_eq!(prediction.disease, "Unknown Class");
        assert_eq!(prediction.pesticides, "N/A");
        assert_eq!(prediction.shop, "N/A");
        assert_eq!(prediction.confidence, 0.8);
    }

    #[test]
    fn test_empty_score_vector_is_an_error() {
        let mock_classifier = MockClassifier { scores: vec![] };

        let result = classify(&mock_classifier, &three_class_table(), &[0; 16]);

        assert!(matches!(result, Err(ClassifierError::Inference(_))));
    }

    #[test]
    fn test_response_serializes_with_contract_keys() {
        let prediction = Prediction {
            disease: "C".to_string(),
            confidence: 0.7,
            pesticides: "P3".to_string(),
            shop: "S3".to_string(),
        };

        let value = serde_json::to_value(&prediction).unwrap();

        assert_eq!(value["Predicted Disease"], "C");
        assert_eq!(value["Pesticides"], "P3");
        assert_eq!(value["Shop"], "S3");
        assert!((value["Confidence"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }
}
