//! Append-only session logs and per-frame image files.
//!
//! Every log is wrapped in a [`LineWriter`], so each appended line reaches
//! the file before the call returns and a crash loses at most the record in
//! flight.

use crate::error::{CollectorError, Result};
use crate::imu::ImuRecord;
use crate::layout::DataLayout;
use crate::stream::StreamRole;
use image::{ExtendedColorType, ImageFormat};
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

/// `<ts> <path>` line of a camera index log, without newline.
pub fn index_line(timestamp: f64, image_path: &Path) -> String {
    format!("{:.6} {}", timestamp, image_path.display())
}

/// Image file name for a frame timestamp.
pub fn image_file_name(timestamp: f64) -> String {
    format!("{:.6}.png", timestamp)
}

fn open_log(path: &Path) -> Result<LineWriter<File>> {
    File::create(path)
        .map(LineWriter::new)
        .map_err(|source| CollectorError::OpenLog {
            path: path.to_path_buf(),
            source,
        })
}

/// PNG writer plus index log for one infrared camera.
pub struct ImageWriter {
    role: StreamRole,
    dir: PathBuf,
    index_path: PathBuf,
    index: LineWriter<File>,
}

impl ImageWriter {
    /// Open (truncating) the index log for `role`.
    pub fn open(layout: &DataLayout, role: StreamRole) -> Result<Self> {
        let (dir, index_path) = match (layout.image_dir(role), layout.index_log(role)) {
            (Some(dir), Some(index)) => (dir, index),
            _ => return Err(CollectorError::MissingStream(role)),
        };
        let index = open_log(&index_path)?;
        Ok(Self {
            role,
            dir,
            index_path,
            index,
        })
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    /// Store one 8-bit single-channel frame and index it.
    ///
    /// The index line is only written once the image is on disk.
    pub fn write(
        &mut self,
        timestamp: f64,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<PathBuf> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(CollectorError::FrameSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        let path = self.dir.join(image_file_name(timestamp));
        image::save_buffer_with_format(
            &path,
            pixels,
            width,
            height,
            ExtendedColorType::L8,
            ImageFormat::Png,
        )
        .map_err(|source| CollectorError::Image {
            path: path.clone(),
            source,
        })?;

        writeln!(self.index, "{}", index_line(timestamp, &path)).map_err(|source| {
            CollectorError::Append {
                path: self.index_path.clone(),
                source,
            }
        })?;
        Ok(path)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.index.flush().map_err(|source| CollectorError::Append {
            path: self.index_path.clone(),
            source,
        })
    }
}

/// Append-only IMU log.
pub struct ImuWriter {
    path: PathBuf,
    file: LineWriter<File>,
}

impl ImuWriter {
    pub fn open(layout: &DataLayout) -> Result<Self> {
        let path = layout.imu_log();
        let file = open_log(&path)?;
        Ok(Self { path, file })
    }

    pub fn append(&mut self, record: &ImuRecord) -> Result<()> {
        writeln!(self.file, "{}", record.to_csv_line()).map_err(|source| CollectorError::Append {
            path: self.path.clone(),
            source,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|source| CollectorError::Append {
            path: self.path.clone(),
            source,
        })
    }
}

/// The three outputs of a session.
pub struct SessionWriters {
    pub left: ImageWriter,
    pub right: ImageWriter,
    pub imu: ImuWriter,
}

impl SessionWriters {
    /// Open all logs under `layout`. The directories must exist.
    pub fn open(layout: &DataLayout) -> Result<Self> {
        Ok(Self {
            left: ImageWriter::open(layout, StreamRole::LeftInfrared)?,
            right: ImageWriter::open(layout, StreamRole::RightInfrared)?,
            imu: ImuWriter::open(layout)?,
        })
    }

    /// Image writer for a video role.
    pub fn image(&mut self, role: StreamRole) -> Option<&mut ImageWriter> {
        match role {
            StreamRole::LeftInfrared => Some(&mut self.left),
            StreamRole::RightInfrared => Some(&mut self.right),
            StreamRole::Gyro | StreamRole::Accel => None,
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.left.flush()?;
        self.right.flush()?;
        self.imu.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Vector3;
    use std::fs;

    fn layout_in(tmp: &tempfile::TempDir) -> DataLayout {
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.bootstrap().unwrap();
        layout
    }

    #[test]
    fn test_index_line_format() {
        let path = Path::new("./data/cam0").join(image_file_name(12.345));
        assert_eq!(
            index_line(12.345, &path),
            "12.345000 ./data/cam0/12.345000.png"
        );
    }

    #[test]
    fn test_image_written_and_indexed() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(&tmp);
        let mut writer = ImageWriter::open(&layout, StreamRole::LeftInfrared).unwrap();

        let pixels: Vec<u8> = (0..640 * 480).map(|i| (i % 251) as u8).collect();
        let path = writer.write(12.345, 640, 480, &pixels).unwrap();
        assert_eq!(path, tmp.path().join("data/cam0/12.345000.png"));

        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (640, 480));
        assert_eq!(decoded.as_raw(), &pixels);

        let index = fs::read_to_string(tmp.path().join("data/cam0.csv")).unwrap();
        assert_eq!(index, format!("12.345000 {}\n", path.display()));
    }

    #[test]
    fn test_index_lines_keep_arrival_order() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(&tmp);
        let mut writer = ImageWriter::open(&layout, StreamRole::RightInfrared).unwrap();
        let pixels = vec![0u8; 4 * 2];
        for ts in [3.0, 1.0, 2.0] {
            writer.write(ts, 4, 2, &pixels).unwrap();
        }
        let index = fs::read_to_string(layout.index_log(StreamRole::RightInfrared).unwrap()).unwrap();
        let stamps: Vec<&str> = index
            .lines()
            .map(|l| l.split(' ').next().unwrap())
            .collect();
        assert_eq!(stamps, ["3.000000", "1.000000", "2.000000"]);
    }

    #[test]
    fn test_wrong_buffer_size_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(&tmp);
        let mut writer = ImageWriter::open(&layout, StreamRole::LeftInfrared).unwrap();
        let err = writer.write(1.0, 640, 480, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CollectorError::FrameSize { actual: 10, .. }));

        let index = fs::read_to_string(layout.index_log(StreamRole::LeftInfrared).unwrap()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_failed_image_is_not_indexed() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(&tmp);
        let mut writer = ImageWriter::open(&layout, StreamRole::LeftInfrared).unwrap();
        fs::remove_dir_all(layout.image_dir(StreamRole::LeftInfrared).unwrap()).unwrap();

        let err = writer.write(1.0, 2, 2, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, CollectorError::Image { .. }));
        let index = fs::read_to_string(layout.index_log(StreamRole::LeftInfrared).unwrap()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_imu_log_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout_in(&tmp);
        let mut writer = ImuWriter::open(&layout).unwrap();
        let record = ImuRecord {
            timestamp: 1.0,
            gyro: Vector3::new(0.5, 0.0, -0.5),
            accel: Vector3::new(0.0, -9.5, 0.0),
        };
        writer.append(&record).unwrap();
        writer.append(&ImuRecord { timestamp: 1.005, ..record }).unwrap();

        let log = fs::read_to_string(layout.imu_log()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(
            lines,
            [
                "1.000000,0.500000,0.000000,-0.500000,0.000000,-9.500000,0.000000",
                "1.005000,0.500000,0.000000,-0.500000,0.000000,-9.500000,0.000000",
            ]
        );
    }

    #[test]
    fn test_open_requires_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path().join("absent"));
        assert!(matches!(
            SessionWriters::open(&layout),
            Err(CollectorError::OpenLog { .. })
        ));
    }
}
