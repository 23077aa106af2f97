use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::annotate::{HoldAnnotator, LabelFont};
use crate::detection::RoboflowDetector;
use crate::route::{GeminiComparator, MatchPolicy};

/// Runtime settings shared by every subcommand.
///
/// Each flag can also be supplied through the environment variable named in
/// its help text.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Directory holding stored route images
    #[arg(long, env = "SPRAYWALL_ROUTES_DIR", default_value = "images")]
    pub routes_dir: PathBuf,

    /// Side length of the square images are resized to before detection
    #[arg(long, env = "SPRAYWALL_CANONICAL_SIZE", default_value_t = 1024)]
    pub canonical_size: u32,

    /// Minimum detector confidence (0-1) for a hold to be kept
    #[arg(long, env = "SPRAYWALL_MIN_CONFIDENCE", default_value_t = 0.40)]
    pub min_confidence: f32,

    /// Maximum number of image operations and upstream calls in flight
    #[arg(long, env = "SPRAYWALL_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Timeout for each detector or comparator request, in seconds
    #[arg(long, env = "SPRAYWALL_UPSTREAM_TIMEOUT_SECS", default_value_t = 120)]
    pub upstream_timeout_secs: u64,

    /// Base URL of the hosted hold detector
    #[arg(long, env = "SPRAYWALL_DETECTOR_URL", default_value = "https://detect.roboflow.com")]
    pub detector_url: String,

    /// Detector model id, as `<project>/<version>`
    #[arg(long, env = "SPRAYWALL_DETECTOR_MODEL", default_value = "climbing-rv6vd/1")]
    pub detector_model: String,

    /// API key for the hold detector
    #[arg(long, env = "ROBOFLOW_API_KEY", hide_env_values = true)]
    pub detector_api_key: Option<String>,

    /// Base URL of the route comparison API
    #[arg(long, env = "SPRAYWALL_COMPARATOR_URL", default_value = crate::route::compare::DEFAULT_ENDPOINT)]
    pub comparator_url: String,

    /// Multimodal model used to compare routes
    #[arg(long, env = "SPRAYWALL_COMPARATOR_MODEL", default_value = "gemini-3-pro-preview")]
    pub comparator_model: String,

    /// API key for the route comparator
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub comparator_api_key: Option<String>,

    /// TrueType font for hold labels (a built-in bitmap face is used otherwise)
    #[arg(long, env = "SPRAYWALL_LABEL_FONT")]
    pub label_font: Option<PathBuf>,

    /// Label height in pixels when a font file is configured
    #[arg(long, env = "SPRAYWALL_LABEL_SIZE", default_value_t = 18.0)]
    pub label_size: f32,

    /// Use hold colours sent by the client instead of re-classifying them
    #[arg(long, env = "SPRAYWALL_TRUST_CLIENT_COLORS")]
    pub trust_client_colors: bool,

    /// Compare against every stored route even after a match is found
    #[arg(long, env = "SPRAYWALL_NO_SHORT_CIRCUIT")]
    pub no_short_circuit: bool,

    /// Fail the submission when the comparison service is down instead of
    /// treating the route as new
    #[arg(long, env = "SPRAYWALL_FAIL_CLOSED")]
    pub fail_closed: bool,
}

impl Config {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs.max(1))
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            short_circuit: !self.no_short_circuit,
            fail_open: !self.fail_closed,
        }
    }

    pub fn annotator(&self) -> anyhow::Result<HoldAnnotator> {
        let annotator = HoldAnnotator::new();
        Ok(match &self.label_font {
            Some(path) => annotator.with_font(LabelFont::from_file(path, self.label_size)?),
            None => annotator,
        })
    }

    pub fn detector(&self) -> anyhow::Result<RoboflowDetector> {
        if self.detector_api_key.is_none() {
            tracing::warn!("ROBOFLOW_API_KEY is not set; hold detection requests will fail");
        }
        Ok(RoboflowDetector::new(
            &self.detector_url,
            &self.detector_model,
            self.detector_api_key.clone(),
            self.upstream_timeout(),
        )?)
    }

    pub fn comparator(&self) -> anyhow::Result<GeminiComparator> {
        if self.comparator_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; duplicate scans will treat every route as new");
        }
        Ok(GeminiComparator::new(
            &self.comparator_model,
            self.comparator_api_key.clone(),
            self.upstream_timeout(),
        )?
        .with_endpoint(&self.comparator_url))
    }
}
