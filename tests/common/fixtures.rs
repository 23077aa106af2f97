use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use spraywall::HoldAnnotator;
use spraywall::core::store::FsRouteStore;
use spraywall::detection::{DetectionService, HoldDetector, RawPrediction};
use spraywall::error::{PipelineError, Result};
use spraywall::models::{BoundingBox, Detection, HoldColor, RenderRole, Rendering, RouteImage};
use spraywall::route::{
    ComparatorReply, DuplicateMatcher, MatchPolicy, RouteComparator, RouteRenderer,
    SelectionOrchestrator,
};
use spraywall::worker::WorkerPool;
use tempfile::TempDir;

pub const WALL_SIZE: u32 = 256;

/// Grey wall with three textured holds: red, green and blue.
pub fn wall_image() -> DynamicImage {
    let mut img = RgbImage::from_pixel(WALL_SIZE, WALL_SIZE, Rgb([120, 120, 120]));
    for (bbox, base) in hold_boxes().iter().zip([[200, 30, 30], [30, 170, 40], [30, 50, 200]]) {
        for y in bbox.y1..bbox.y2 {
            for x in bbox.x1..bbox.x2 {
                let shade = [-25i16, -12, 12, 0][((x + y) % 4) as usize];
                let px = base.map(|c: i16| (c + shade).clamp(0, 255) as u8);
                img.put_pixel(x, y, Rgb(px));
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}

pub fn hold_boxes() -> [BoundingBox; 3] {
    [
        BoundingBox { x1: 20, y1: 30, x2: 60, y2: 70 },
        BoundingBox { x1: 100, y1: 110, x2: 150, y2: 150 },
        BoundingBox { x1: 180, y1: 190, x2: 230, y2: 240 },
    ]
}

/// Detections matching the holds painted by [`wall_image`].
pub fn wall_detections() -> Vec<Detection> {
    hold_boxes()
        .into_iter()
        .enumerate()
        .map(|(id, bbox)| Detection {
            id: id as u32,
            class: "hold".to_string(),
            confidence: 0.9,
            color: HoldColor::Unknown,
            bbox,
        })
        .collect()
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)
        .expect("Failed to encode test image");
    bytes
}

pub fn prediction(confidence: f32, x: f32, y: f32, size: f32) -> RawPrediction {
    RawPrediction {
        class: "hold".to_string(),
        confidence,
        x,
        y,
        width: size,
        height: size,
    }
}

/// Detector returning a fixed prediction list, or failing.
#[derive(Default)]
pub struct MockDetector {
    pub predictions: Vec<RawPrediction>,
    pub fail: bool,
    pub calls: Mutex<usize>,
}

impl MockDetector {
    pub fn returning(predictions: Vec<RawPrediction>) -> Self {
        Self {
            predictions,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl HoldDetector for MockDetector {
    async fn detect(&self, _jpeg: &[u8], _min_confidence: f32) -> Result<Vec<RawPrediction>> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(PipelineError::UpstreamDetection("detector offline".to_string()));
        }
        Ok(self.predictions.clone())
    }
}

/// Scripted comparator reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Match(Option<&'static str>),
    NoMatch(Option<&'static str>),
    Fail,
}

/// Comparator whose answer depends on the reference bytes it is shown.
pub struct MockComparator {
    replies: HashMap<Vec<u8>, Reply>,
    fallback: Reply,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl MockComparator {
    pub fn always(reply: Reply) -> Self {
        Self {
            replies: HashMap::new(),
            fallback: reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn keyed(replies: impl IntoIterator<Item = (&'static [u8], Reply)>, fallback: Reply) -> Self {
        Self {
            replies: replies.into_iter().map(|(k, v)| (k.to_vec(), v)).collect(),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// References compared so far, in call order.
    pub fn seen(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

impl RouteComparator for MockComparator {
    async fn compare(&self, _query: &[u8], reference: &[u8]) -> Result<ComparatorReply> {
        self.seen.lock().unwrap().push(reference.to_vec());
        let reply = self.replies.get(reference).unwrap_or(&self.fallback);
        match reply {
            Reply::Match(explanation) => Ok(ComparatorReply {
                is_match: true,
                explanation: explanation.map(str::to_string),
            }),
            Reply::NoMatch(explanation) => Ok(ComparatorReply {
                is_match: false,
                explanation: explanation.map(str::to_string),
            }),
            Reply::Fail => Err(PipelineError::UpstreamComparison("comparator offline".to_string())),
        }
    }
}

/// Opens a route store in a fresh temp directory (keep the dir alive).
pub async fn create_test_store() -> (Arc<FsRouteStore>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = FsRouteStore::open(dir.path().join("images"))
        .await
        .expect("Failed to open route store");
    (Arc::new(store), dir)
}

/// An accepted rendering whose encoded bytes are exactly `bytes`.
pub fn stored_rendering(bytes: &[u8]) -> Rendering {
    Rendering {
        role: RenderRole::Accepted,
        image: RgbImage::new(1, 1),
        jpeg: bytes.to_vec(),
    }
}

pub fn matcher(comparator: Arc<MockComparator>, policy: MatchPolicy) -> DuplicateMatcher<MockComparator> {
    DuplicateMatcher::new(comparator, WorkerPool::new(2)).with_policy(policy)
}

pub fn orchestrator(
    store: Arc<FsRouteStore>,
    comparator: Arc<MockComparator>,
) -> SelectionOrchestrator<FsRouteStore, MockComparator> {
    let pool = WorkerPool::new(2);
    let renderer = RouteRenderer::new(HoldAnnotator::new());
    let matcher = DuplicateMatcher::new(comparator, pool.clone());
    SelectionOrchestrator::new(renderer, matcher, store, pool)
}

pub fn detection_service(detector: Arc<MockDetector>) -> DetectionService<MockDetector> {
    DetectionService::new(detector, WorkerPool::new(2))
}

/// Names of every file currently in the store directory.
pub fn dir_listing(store: &FsRouteStore) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store.dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn route_names(routes: &[RouteImage]) -> Vec<String> {
    let mut names: Vec<String> = routes.iter().map(|r| r.name.clone()).collect();
    names.sort();
    names
}
