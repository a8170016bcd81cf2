use serde::{Deserialize, Serialize};

/// 检测候选 (单次检测输出, 不持久化)
///
/// 几何为中心点 + 宽高, 与远程推理服务的 `predictions` 字段一致。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f32,
    pub x: f32, // 中心x
    pub y: f32, // 中心y
    pub width: f32,
    pub height: f32,
}

impl DetectionCandidate {
    pub fn new(label: &str, confidence: f32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            x,
            y,
            width,
            height,
        }
    }

    pub fn xmin(&self) -> f32 {
        self.x - self.width / 2.
    }

    pub fn ymin(&self) -> f32 {
        self.y - self.height / 2.
    }

    pub fn xmax(&self) -> f32 {
        self.x + self.width / 2.
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height / 2.
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// 远程推理服务响应
#[derive(Debug, Deserialize)]
pub(crate) struct InferenceResponse {
    #[serde(default)]
    pub predictions: Vec<DetectionCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_from_center() {
        let c = DetectionCandidate::new("gun", 0.9, 100., 50., 40., 20.);
        assert_eq!(c.xmin(), 80.);
        assert_eq!(c.ymin(), 40.);
        assert_eq!(c.xmax(), 120.);
        assert_eq!(c.ymax(), 60.);
        assert_eq!(c.area(), 800.);
    }

    #[test]
    fn test_parse_predictions() {
        let json = r#"{"time": 0.02, "predictions": [
            {"x": 123, "y": 219.2, "width": 96, "height": 173, "class": "gun", "confidence": 0.73}
        ]}"#;
        let resp: InferenceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.predictions.len(), 1);
        assert_eq!(resp.predictions[0].label, "gun");
        assert!((resp.predictions[0].confidence - 0.73).abs() < 1e-6);

        let empty: InferenceResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.predictions.is_empty());
    }
}
