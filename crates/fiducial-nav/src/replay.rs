//! Replay of recorded detector output through a [`Locator`].

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use fiducial_nav_core::DetectedCorners;
use fiducial_nav_track::FIRST_UPDATE_DT;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::config::LocatorConfigError;
use crate::locator::{FrameReport, Locator};

/// One detected marker as written by a capture tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedMarker {
    pub id: u32,
    /// `[u, v]` pixels: top-left, top-right, bottom-right, bottom-left.
    pub corners: [[f64; 2]; 4],
}

impl RecordedMarker {
    pub fn to_detection(&self) -> DetectedCorners {
        DetectedCorners::new(self.id, self.corners.map(|[u, v]| Point2::new(u, v)))
    }
}

impl From<&DetectedCorners> for RecordedMarker {
    fn from(det: &DetectedCorners) -> Self {
        Self {
            id: det.id,
            corners: det.corners.map(|c| [c.x, c.y]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_s: f64,
    #[serde(default)]
    pub markers: Vec<RecordedMarker>,
}

pub fn load_frames(path: impl AsRef<Path>) -> Result<Vec<RecordedFrame>, LocatorConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Per-frame summary row, flat so it serializes to one CSV record.
///
/// Position columns are empty (`null` in JSON) when the frame produced no
/// fused position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub frame: usize,
    pub timestamp_s: f64,
    pub markers: usize,
    pub inliers: usize,
    pub fused_x: Option<f64>,
    pub fused_y: Option<f64>,
    pub fused_z: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl FrameRow {
    pub const CSV_HEADER: &'static str =
        "frame,timestamp_s,markers,inliers,fused_x,fused_y,fused_z,x,y,z";

    pub fn from_report(frame: usize, timestamp_s: f64, markers: usize, report: &FrameReport) -> Self {
        let fused = report.fused.as_ref().map(|f| f.position);
        let smoothed = report.smoothed;
        Self {
            frame,
            timestamp_s,
            markers,
            inliers: report.inlier_count(),
            fused_x: fused.map(|p| p.x),
            fused_y: fused.map(|p| p.y),
            fused_z: fused.map(|p| p.z),
            x: smoothed.map(|p| p.x),
            y: smoothed.map(|p| p.y),
            z: smoothed.map(|p| p.z),
        }
    }

    pub fn fused(&self) -> Option<Point3<f64>> {
        Some(Point3::new(self.fused_x?, self.fused_y?, self.fused_z?))
    }

    pub fn smoothed(&self) -> Option<Point3<f64>> {
        Some(Point3::new(self.x?, self.y?, self.z?))
    }
}

/// Write `rows` as CSV with a [`FrameRow::CSV_HEADER`] header line.
pub fn write_csv<W: Write>(rows: &[FrameRow], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parse rows written by [`write_csv`].
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<FrameRow>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    rdr.deserialize().collect()
}

/// Run every frame through `locator`, timing the smoother with the recorded
/// timestamps.
///
/// The time step is measured from the last frame that produced a fused
/// position; after a frame without one the next step restarts at
/// [`FIRST_UPDATE_DT`].
pub fn replay(locator: &mut Locator, frames: &[RecordedFrame]) -> Vec<FrameRow> {
    let mut last_fused: Option<f64> = None;
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let detections: Vec<DetectedCorners> =
                frame.markers.iter().map(RecordedMarker::to_detection).collect();
            let dt = last_fused.map_or(FIRST_UPDATE_DT, |t| frame.timestamp_s - t);
            let report = locator.process_frame_with_delta(&detections, dt);
            last_fused = report.fused.as_ref().map(|_| frame.timestamp_s);
            FrameRow::from_report(i, frame.timestamp_s, detections.len(), &report)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(frame: usize, fused: Option<Point3<f64>>) -> FrameRow {
        FrameRow {
            frame,
            timestamp_s: 0.5,
            markers: 1,
            inliers: if fused.is_some() { 2 } else { 0 },
            fused_x: fused.map(|p| p.x),
            fused_y: fused.map(|p| p.y),
            fused_z: fused.map(|p| p.z),
            x: fused.map(|p| p.x),
            y: fused.map(|p| p.y),
            z: fused.map(|p| p.z),
        }
    }

    #[test]
    fn csv_leaves_missing_positions_empty() {
        let mut out = Vec::new();
        write_csv(&[row(3, None)], &mut out).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![FrameRow::CSV_HEADER, "3,0.5,1,0,,,,,,"]);
    }

    #[test]
    fn csv_rows_read_back() {
        let rows = vec![row(0, Some(Point3::new(0.25, -1.5, 2.0))), row(1, None)];
        let mut out = Vec::new();
        write_csv(&rows, &mut out).expect("write");
        let back = read_csv(out.as_slice()).expect("read");
        assert_eq!(back, rows);
        assert_eq!(back[0].fused(), Some(Point3::new(0.25, -1.5, 2.0)));
        assert_eq!(back[1].smoothed(), None);
    }

    #[test]
    fn recorded_marker_round_trips_detection() {
        let det = DetectedCorners::new(
            5,
            [
                Point2::new(1.0, 2.0),
                Point2::new(3.0, 2.0),
                Point2::new(3.0, 4.0),
                Point2::new(1.0, 4.0),
            ],
        );
        assert_eq!(RecordedMarker::from(&det).to_detection(), det);
    }

    #[test]
    fn frames_parse_without_markers() {
        let frames: Vec<RecordedFrame> =
            serde_json::from_str(r#"[{"timestamp_s": 0.0}, {"timestamp_s": 0.1, "markers": []}]"#)
                .expect("parse");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].markers.is_empty());
    }
}
