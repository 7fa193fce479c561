use serde::{Deserialize, Serialize};

/// Normalised bounding box, all values 0.0 to 1.0 of the frame
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// A single object reported by the inference backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub class_label: String,
    pub confidence: f64,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    pub fn new(class_label: impl Into<String>, confidence: f64, bounding_box: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bounding_box,
        }
    }
}

/// Handle to the rendered frame a detection belongs to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrameRef {
    pub sequence: u64,
    #[serde(default)]
    pub uri: Option<String>,
}

/// One inference result unit. Never mutated after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Media time in milliseconds
    pub timestamp: u64,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub frame: Option<FrameRef>,
}

impl DetectionEvent {
    pub fn new(timestamp: u64, objects: Vec<DetectedObject>) -> Self {
        Self {
            timestamp,
            objects,
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: FrameRef) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// A detection event as handed out by a stream connection
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    pub event: DetectionEvent,
    /// Delivered behind an event with a later timestamp
    pub out_of_order: bool,
}
