//! Gauge Reader
//!
//! One cycle, run by the tick when the canonical slot is ready:
//!
//! ```text
//! lock slot ─▶ decode ─▶ normalize ─▶ edges ─▶ segments ─▶ needle ─▶ tip
//!           ─▶ angle ─▶ value ─▶ value file ─▶ archive ─▶ annotate ─▶ clear flag
//! ```
//!
//! The slot guard is held for the whole cycle, so the watcher cannot swap
//! the canonical file between the decode and the archive move.

pub mod annotate;
pub mod archive;
pub mod calibration;
pub mod vision;

pub use archive::{relabel, write_value_file, ArchiveError, Archiver};
pub use vision::{HoughParams, LineSegment};

use chrono::{Local, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{CalibrationConfig, GaugeConfig, VisionConfig};
use crate::types::{Reading, ReadingEvent};
use crate::watcher::CanonicalSlot;

/// Failures that end a cycle without a reading. The ready flag is cleared
/// either way; the bad image is not retried.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Intermediate results of analyzing one decoded frame.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// Frame normalized to the working resolution
    pub frame: RgbImage,
    pub segment_count: usize,
    pub needle: Option<LineSegment>,
    pub tip: Option<(i32, i32)>,
    pub angle: Option<f64>,
    pub reading: Reading,
}

pub struct GaugeReader {
    calibration: CalibrationConfig,
    vision: VisionConfig,
    hough: HoughParams,
    archiver: Archiver,
    value_file: PathBuf,
}

impl GaugeReader {
    pub fn new(config: &GaugeConfig) -> Self {
        let blur = config
            .vision
            .blur_archive
            .then_some(config.vision.privacy_blur_kernel);
        Self {
            calibration: config.calibration,
            vision: config.vision.clone(),
            hough: HoughParams::from_config(&config.vision),
            archiver: Archiver::new(&config.storage.archive_dir, &config.watch.canonical_name, blur),
            value_file: config.storage.value_file.clone(),
        }
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    pub fn value_file(&self) -> &Path {
        &self.value_file
    }

    /// Run one cycle if the slot holds an unread image.
    ///
    /// Returns `Ok(None)` when there is nothing to read.
    pub fn process(&self, slot: &CanonicalSlot) -> Result<Option<ReadingEvent>, ReaderError> {
        let mut state = slot.lock();
        if !state.ready {
            return Ok(None);
        }

        let source = slot.path();
        let source_timestamp = state.placed_at.unwrap_or_else(Utc::now);

        let decoded = match decode(source) {
            Ok(img) => img,
            Err(e) => {
                state.clear();
                return Err(e);
            }
        };

        let analysis = self.analyze(&decoded);
        debug!(
            segments = analysis.segment_count,
            needle = ?analysis.needle,
            angle = ?analysis.angle,
            "Frame analyzed"
        );

        if let Err(e) = write_value_file(&self.value_file, analysis.reading) {
            warn!(path = %self.value_file.display(), error = %e, "Failed to write value file");
        }

        match analysis.reading {
            Reading::Value(v) => info!(
                value = v,
                angle = analysis.angle.unwrap_or_default(),
                source = state.source_name.as_deref().unwrap_or("?"),
                "Gauge read"
            ),
            Reading::NoReading => warn!(
                source = state.source_name.as_deref().unwrap_or("?"),
                "No needle found"
            ),
        }

        let archive = match self
            .archiver
            .archive(source, &analysis.frame, analysis.reading, Local::now())
        {
            Ok(record) => {
                info!(path = %record.path.display(), "Image archived");
                Some(record)
            }
            Err(e) => {
                warn!(error = %e, "Archiving failed");
                None
            }
        };

        let overlay = annotate::annotate(&analysis.frame, analysis.needle.as_ref());
        let annotated = if self.vision.composite_display {
            annotate::composite(&overlay, self.vision.privacy_blur_kernel)
        } else {
            overlay
        };

        state.clear();

        Ok(Some(ReadingEvent {
            reading: analysis.reading,
            angle: analysis.angle,
            annotated,
            source_timestamp,
            archive,
        }))
    }

    /// Pure image analysis: normalize, detect, select, calibrate.
    pub fn analyze(&self, image: &DynamicImage) -> FrameAnalysis {
        let res = self.vision.resolution;
        let frame = image.resize_exact(res, res, FilterType::Triangle).to_rgb8();

        let edges = vision::edge_map(&frame, &self.vision);
        let segments = vision::detect_segments(&edges, &self.hough);
        let needle = vision::select_needle(&segments);

        let center = ((res / 2) as i32, (res / 2) as i32);
        let tip = needle.as_ref().and_then(|n| vision::select_tip(n, center));
        let angle = tip.and_then(|(x, y)| {
            calibration::needle_angle(
                (f64::from(center.0), f64::from(center.1)),
                (f64::from(x), f64::from(y)),
            )
        });
        let reading = angle.map_or(Reading::NoReading, |a| {
            Reading::Value(calibration::value_for_angle(&self.calibration, a))
        });

        FrameAnalysis {
            frame,
            segment_count: segments.len(),
            needle,
            tip,
            angle,
            reading,
        }
    }
}

/// Decode by content, not by file extension.
fn decode(path: &Path) -> Result<DynamicImage, ReaderError> {
    let bytes = std::fs::read(path).map_err(|source| ReaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes).map_err(|source| ReaderError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::Rgb;
    use imageproc::drawing::draw_line_segment_mut;
    use std::fs;
    use std::sync::Arc;

    /// White 500×500 dial with a 5 px black needle from the centre to `tip`.
    fn needle_image(tip: (f32, f32)) -> RgbImage {
        let mut img = RgbImage::from_pixel(500, 500, Rgb([255, 255, 255]));
        let vertical = (tip.0 - 250.0).abs() < (tip.1 - 250.0).abs();
        for off in -2..=2 {
            let o = off as f32;
            let (start, end) = if vertical {
                ((250.0 + o, 250.0), (tip.0 + o, tip.1))
            } else {
                ((250.0, 250.0 + o), (tip.0, tip.1 + o))
            };
            draw_line_segment_mut(&mut img, start, end, Rgb([0, 0, 0]));
        }
        img
    }

    fn write_jpeg(path: &Path, img: &RgbImage) {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 95)
            .encode_image(img)
            .unwrap();
        fs::write(path, buf).unwrap();
    }

    fn angle_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        reader: GaugeReader,
        slot: Arc<CanonicalSlot>,
        incoming: PathBuf,
        config: GaugeConfig,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = GaugeConfig::default();
        config.storage.archive_dir = tmp.path().join("archive");
        config.storage.value_file = tmp.path().join("value.txt");
        let slot = Arc::new(CanonicalSlot::new(tmp.path().join("latest.jpg")));
        Fixture {
            incoming: tmp.path().join("incoming.jpg"),
            reader: GaugeReader::new(&config),
            slot,
            config,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_analyze_vertical_needle() {
        let f = fixture();
        let img = DynamicImage::ImageRgb8(needle_image((250.0, 70.0)));

        let a = f.reader.analyze(&img);

        let angle = a.angle.unwrap();
        assert!(angle_diff(angle, 0.0) < 2.0, "angle {angle}");
        let v = a.reading.value().unwrap();
        assert!((58.5..=60.5).contains(&v), "value {v}");
    }

    #[test]
    fn test_analyze_left_needle() {
        let f = fixture();
        let img = DynamicImage::ImageRgb8(needle_image((70.0, 250.0)));

        let a = f.reader.analyze(&img);

        let angle = a.angle.unwrap();
        assert!(angle_diff(angle, 270.0) < 2.0, "angle {angle}");
        let v = a.reading.value().unwrap();
        assert!((19.0..=21.0).contains(&v), "value {v}");
    }

    #[test]
    fn test_analyze_blank_frame_is_no_reading() {
        let f = fixture();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 500, Rgb([255, 255, 255])));

        let a = f.reader.analyze(&img);

        assert_eq!(a.segment_count, 0);
        assert_eq!(a.reading, Reading::NoReading);
    }

    #[test]
    fn test_analyze_normalizes_resolution() {
        let f = fixture();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([255, 255, 255])));
        let a = f.reader.analyze(&img);
        assert_eq!(a.frame.dimensions(), (500, 500));
    }

    #[test]
    fn test_process_idle_slot_does_nothing() {
        let f = fixture();
        assert!(f.reader.process(&f.slot).unwrap().is_none());
        assert!(!f.config.storage.value_file.exists());
    }

    #[test]
    fn test_process_full_cycle() {
        let f = fixture();
        write_jpeg(&f.incoming, &needle_image((70.0, 250.0)));
        f.slot.replace_with(&f.incoming).unwrap();

        let event = f.reader.process(&f.slot).unwrap().unwrap();

        assert!(!f.slot.is_ready());
        assert!(!f.slot.path().exists(), "canonical image moved to archive");
        let value = event.reading.value().unwrap();
        assert_eq!(
            fs::read_to_string(&f.config.storage.value_file).unwrap(),
            event.reading.to_string()
        );
        let record = event.archive.unwrap();
        assert!(record.path.exists());
        assert!(record.file_name().starts_with(&format!("latest_{}_", event.reading)));
        assert_eq!(event.annotated.dimensions(), (500, 500));

        // Flag cleared: a second tick has nothing to do
        assert!(f.reader.process(&f.slot).unwrap().is_none());
    }

    #[test]
    fn test_process_no_reading_still_archives() {
        let f = fixture();
        write_jpeg(&f.incoming, &RgbImage::from_pixel(500, 500, Rgb([255, 255, 255])));
        f.slot.replace_with(&f.incoming).unwrap();

        let event = f.reader.process(&f.slot).unwrap().unwrap();

        assert_eq!(event.reading, Reading::NoReading);
        assert_eq!(fs::read_to_string(&f.config.storage.value_file).unwrap(), "-1");
        assert!(event.archive.unwrap().file_name().starts_with("latest_-1_"));
    }

    #[test]
    fn test_process_decodes_by_content() {
        let f = fixture();
        // PNG bytes behind a .jpg name
        let png = f.incoming.with_extension("png");
        needle_image((250.0, 70.0)).save(&png).unwrap();
        fs::rename(&png, &f.incoming).unwrap();
        f.slot.replace_with(&f.incoming).unwrap();

        let event = f.reader.process(&f.slot).unwrap().unwrap();

        assert!(event.reading.value().is_some());
    }

    #[test]
    fn test_process_undecodable_clears_flag() {
        let f = fixture();
        fs::write(&f.incoming, b"definitely not an image").unwrap();
        f.slot.replace_with(&f.incoming).unwrap();

        let err = f.reader.process(&f.slot).unwrap_err();

        assert!(matches!(err, ReaderError::Decode { .. }));
        assert!(!f.slot.is_ready());
        assert!(f.reader.process(&f.slot).unwrap().is_none());
    }

    #[test]
    fn test_process_missing_canonical_clears_flag() {
        let f = fixture();
        write_jpeg(&f.incoming, &needle_image((250.0, 70.0)));
        f.slot.replace_with(&f.incoming).unwrap();
        fs::remove_file(f.slot.path()).unwrap();

        let err = f.reader.process(&f.slot).unwrap_err();

        assert!(matches!(err, ReaderError::Io { .. }));
        assert!(!f.slot.is_ready());
    }

    #[test]
    fn test_composite_display_doubles_width() {
        let mut f = fixture();
        f.config.vision.composite_display = true;
        let reader = GaugeReader::new(&f.config);
        write_jpeg(&f.incoming, &needle_image((250.0, 70.0)));
        f.slot.replace_with(&f.incoming).unwrap();

        let event = reader.process(&f.slot).unwrap().unwrap();

        assert_eq!(event.annotated.dimensions(), (700, 350));
    }
}
