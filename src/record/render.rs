//! PNG rendering of survey height maps, placement accuracy plots and
//! fiducial diagnostics

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::alignment::geometry::{rotate, vector_angle_deg, Point2};
use crate::entities::{OffsetTriple, ReferencePins};

const HEIGHT_MAP_SIZE: u32 = 480;
const COLORBAR_WIDTH: u32 = 16;
const MARKER_RADIUS: i32 = 5;

const ACCURACY_PLOT_SIZE: u32 = 320;
/// Offsets (µm) mapped to the edge of the accuracy plot
const ACCURACY_RANGE_UM: f64 = 200.0;
/// Angle offsets are tiny; ticks are drawn at this multiple
const ANGLE_EXAGGERATION: f64 = 100.0;

const FIDUCIAL_PLOT_SIZE: u32 = 400;
/// Border around the fiducials and pins (pixels)
const FIDUCIAL_PLOT_MARGIN: f64 = 20.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([200, 200, 200]);
const SENSOR: Rgb<u8> = Rgb([31, 119, 180]);
const PCB: Rgb<u8> = Rgb([214, 39, 40]);
const PIN_AXIS: Rgb<u8> = Rgb([44, 160, 44]);

/// Inputs of a height map besides the points
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMapSpec {
    /// Used for the saved file name
    pub name: String,
    /// Orientation the point cloud is rotated into (degrees)
    pub new_angle: f64,
    pub vmin: f64,
    pub vmax: f64,
}

/// Renders the images attached to an upload record
///
/// Rendering never fails from the caller's side; a problem is logged and
/// yields an empty image.
pub trait PlotRenderer {
    /// Height map of `(x, y, z)` points
    fn render_height_map(&self, points: &[(f64, f64, f64)], spec: &HeightMapSpec) -> Vec<u8>;

    /// Sensor and PCB offsets drawn as markers with orientation ticks
    fn render_accuracy_plot(&self, name: &str, sensor: OffsetTriple, pcb: OffsetTriple) -> Vec<u8>;

    /// Measured fiducials next to the tray pins they were aligned against
    fn render_fiducials(&self, name: &str, fiducials: &[(usize, Point2)], pins: &ReferencePins) -> Vec<u8>;
}

/// [`PlotRenderer`] producing PNG bytes, optionally saving a copy
#[derive(Debug, Clone, Default)]
pub struct PngRenderer {
    save_dir: Option<PathBuf>,
}

impl PngRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write every rendered image into `dir`
    pub fn saving_to(dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: Some(dir.into()),
        }
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    fn finish(&self, image: RgbImage, file_name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        if let Err(e) =
            DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        {
            tracing::warn!(file_name, "PNG encoding failed: {}", e);
            return Vec::new();
        }

        if let Some(dir) = &self.save_dir {
            let path = dir.join(file_name);
            let saved = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &bytes));
            match saved {
                Ok(()) => tracing::debug!(path = %path.display(), "saved image"),
                Err(e) => tracing::warn!(path = %path.display(), "could not save image: {}", e),
            }
        }
        bytes
    }
}

impl PlotRenderer for PngRenderer {
    fn render_height_map(&self, points: &[(f64, f64, f64)], spec: &HeightMapSpec) -> Vec<u8> {
        let mut img = RgbImage::from_pixel(HEIGHT_MAP_SIZE, HEIGHT_MAP_SIZE, WHITE);
        let plot_width = HEIGHT_MAP_SIZE - COLORBAR_WIDTH * 3;

        let canonical = canonical_orientation(points, spec.new_angle);
        let extent = canonical
            .iter()
            .map(|(x, y, _)| x.abs().max(y.abs()))
            .fold(0.0f64, f64::max);
        let half = plot_width as f64 / 2.0;
        let scale = if extent > 0.0 { (half - 12.0) / extent } else { 1.0 };

        for &(x, y, z) in &canonical {
            let px = (half + x * scale).round() as i32;
            let py = (half - y * scale).round() as i32;
            fill_circle(&mut img, px, py, MARKER_RADIUS, colormap(z, spec.vmin, spec.vmax));
        }

        // Colorbar, vmax at the top
        let bar_x = HEIGHT_MAP_SIZE - COLORBAR_WIDTH * 2;
        for py in 0..HEIGHT_MAP_SIZE {
            let t = 1.0 - py as f64 / (HEIGHT_MAP_SIZE - 1) as f64;
            let color = colormap(spec.vmin + t * (spec.vmax - spec.vmin), spec.vmin, spec.vmax);
            for px in bar_x..bar_x + COLORBAR_WIDTH {
                img.put_pixel(px, py, color);
            }
        }

        self.finish(img, &format!("{}_heights.png", spec.name))
    }

    fn render_accuracy_plot(&self, name: &str, sensor: OffsetTriple, pcb: OffsetTriple) -> Vec<u8> {
        let size = ACCURACY_PLOT_SIZE;
        let mut img = RgbImage::from_pixel(size, size, WHITE);
        let half = size as f64 / 2.0;
        let scale = (half - 10.0) / ACCURACY_RANGE_UM;

        // Axes and the grade A/B boxes (50 µm, 100 µm)
        draw_line(&mut img, (0.0, half), (size as f64, half), GRID);
        draw_line(&mut img, (half, 0.0), (half, size as f64), GRID);
        for bound in [50.0, 100.0] {
            let d = bound * scale;
            let corners = [
                (half - d, half - d),
                (half + d, half - d),
                (half + d, half + d),
                (half - d, half + d),
            ];
            for i in 0..4 {
                draw_line(&mut img, corners[i], corners[(i + 1) % 4], GRID);
            }
        }

        for (offsets, color) in [(sensor, SENSOR), (pcb, PCB)] {
            let x = (half + offsets.x_um.clamp(-ACCURACY_RANGE_UM, ACCURACY_RANGE_UM) * scale).round();
            let y = (half - offsets.y_um.clamp(-ACCURACY_RANGE_UM, ACCURACY_RANGE_UM) * scale).round();
            fill_circle(&mut img, x as i32, y as i32, MARKER_RADIUS, color);

            let tick = (offsets.angle_deg * ANGLE_EXAGGERATION + 90.0).to_radians();
            let len = 24.0;
            draw_line(&mut img, (x, y), (x + len * tick.cos(), y - len * tick.sin()), color);
        }

        self.finish(img, &format!("{}_offsetplot.png", name))
    }

    fn render_fiducials(&self, name: &str, fiducials: &[(usize, Point2)], pins: &ReferencePins) -> Vec<u8> {
        let size = FIDUCIAL_PLOT_SIZE;
        let mut img = RgbImage::from_pixel(size, size, WHITE);

        let all = fiducials
            .iter()
            .map(|(_, p)| *p)
            .chain([pins.hole, pins.slot]);
        let (mut min, mut max) = (pins.hole, pins.hole);
        for p in all {
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        let extent = (max.x - min.x).max(max.y - min.y);
        let scale = if extent > 0.0 {
            (size as f64 - 2.0 * FIDUCIAL_PLOT_MARGIN) / extent
        } else {
            1.0
        };
        let center = Point2::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
        let half = size as f64 / 2.0;
        // mm to pixels, y pointing up
        let to_px = |p: Point2| (half + (p.x - center.x) * scale, half - (p.y - center.y) * scale);

        let (hole, slot) = (to_px(pins.hole), to_px(pins.slot));
        draw_line(&mut img, slot, hole, PIN_AXIS);
        fill_circle(&mut img, hole.0.round() as i32, hole.1.round() as i32, MARKER_RADIUS, PCB);
        fill_circle(&mut img, slot.0.round() as i32, slot.1.round() as i32, MARKER_RADIUS, SENSOR);

        for &(_, point) in fiducials {
            let (x, y) = to_px(point);
            fill_circle(&mut img, x.round() as i32, y.round() as i32, MARKER_RADIUS - 2, PCB);
        }

        self.finish(img, &format!("{}_FDpoints.png", name))
    }
}

/// Center points on their bounding box and rotate them so the first point
/// sits at `new_angle`
pub fn canonical_orientation(points: &[(f64, f64, f64)], new_angle: f64) -> Vec<(f64, f64, f64)> {
    let Some(&(fx, fy, _)) = points.first() else {
        return Vec::new();
    };

    let (mut min, mut max) = (Point2::new(fx, fy), Point2::new(fx, fy));
    for &(x, y, _) in points {
        min = Point2::new(min.x.min(x), min.y.min(y));
        max = Point2::new(max.x.max(x), max.y.max(y));
    }
    let center = Point2::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);

    let from_angle = vector_angle_deg(fx - center.x, fy - center.y);
    points
        .iter()
        .map(|&(x, y, z)| {
            let (rx, ry) = rotate(x - center.x, y - center.y, from_angle, new_angle);
            (rx, ry, z)
        })
        .collect()
}

/// Cool to warm color scale, clamped to `[vmin, vmax]`
pub fn colormap(value: f64, vmin: f64, vmax: f64) -> Rgb<u8> {
    let t = if vmax > vmin && value.is_finite() {
        ((value - vmin) / (vmax - vmin)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let cool = [59.0, 76.0, 192.0];
    let mid = [221.0, 221.0, 221.0];
    let warm = [180.0, 4.0, 38.0];
    let (a, b, s) = if t < 0.5 {
        (cool, mid, t * 2.0)
    } else {
        (mid, warm, (t - 0.5) * 2.0)
    };
    let lerp = |i: usize| (a[i] + (b[i] - a[i]) * s).round() as u8;
    Rgb([lerp(0), lerp(1), lerp(2)])
}

fn fill_circle(img: &mut RgbImage, cx: i32, cy: i32, r: i32, color: Rgb<u8>) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_line(img: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as i32;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        put(img, x.round() as i32, y.round() as i32, color);
    }
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    fn spec() -> HeightMapSpec {
        HeightMapSpec {
            name: "PM1_alice".into(),
            new_angle: 270.0,
            vmin: 1.37,
            vmax: 1.79,
        }
    }

    #[test]
    fn test_height_map_is_png() {
        let points = [(10.0, 10.0, 1.4), (20.0, 10.0, 1.5), (15.0, 18.0, 1.7)];
        let bytes = PngRenderer::new().render_height_map(&points, &spec());
        assert!(bytes.starts_with(PNG_MAGIC));

        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), HEIGHT_MAP_SIZE);
    }

    #[test]
    fn test_empty_points_still_render() {
        let bytes = PngRenderer::new().render_height_map(&[], &spec());
        assert!(bytes.starts_with(PNG_MAGIC));
    }

    #[test]
    fn test_accuracy_plot_saved() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PngRenderer::saving_to(dir.path().join("protomodules"));
        let bytes = renderer.render_accuracy_plot(
            "PM1",
            OffsetTriple {
                x_um: 30.0,
                y_um: -40.0,
                angle_deg: 0.01,
            },
            OffsetTriple::default(),
        );
        assert!(bytes.starts_with(PNG_MAGIC));
        let saved = std::fs::read(dir.path().join("protomodules").join("PM1_offsetplot.png")).unwrap();
        assert_eq!(saved, bytes);
    }

    #[test]
    fn test_fiducial_plot_saved() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PngRenderer::saving_to(dir.path());
        let pins = ReferencePins {
            hole: Point2::new(100.0, 100.0),
            slot: Point2::new(200.0, 100.0),
        };
        let fiducials = [(1, Point2::new(130.0, 100.0)), (3, Point2::new(70.0, 100.0))];

        let bytes = renderer.render_fiducials("PM1", &fiducials, &pins);
        assert!(bytes.starts_with(PNG_MAGIC));
        let saved = std::fs::read(dir.path().join("PM1_FDpoints.png")).unwrap();
        assert_eq!(saved, bytes);

        // Span 70..200 mm over 360 px: hole pin at x=103, slot pin on the right margin
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let mid = FIDUCIAL_PLOT_SIZE / 2;
        assert_eq!(*img.get_pixel(103, mid), PCB);
        assert_eq!(*img.get_pixel(380, mid), SENSOR);
        assert_eq!(*img.get_pixel(250, mid), PIN_AXIS);
    }

    #[test]
    fn test_canonical_orientation() {
        let points = [(2.0, 1.0, 0.1), (0.0, 1.0, 0.2), (1.0, 0.0, 0.3)];
        let out = canonical_orientation(&points, 270.0);
        // First point rotated onto 270° around the box center (1, 0.5)
        let (x, y, z) = out[0];
        assert!(x.abs() < 1e-9);
        assert!((y + 1.0f64.hypot(0.5)).abs() < 1e-9);
        assert_eq!(z, 0.1);

        // Distances to the center are preserved
        for (p, q) in points.iter().zip(&out) {
            let before = (p.0 - 1.0).hypot(p.1 - 0.5);
            assert!((before - q.0.hypot(q.1)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_colormap_clamps() {
        assert_eq!(colormap(-5.0, 1.0, 2.0), colormap(1.0, 1.0, 2.0));
        assert_eq!(colormap(9.0, 1.0, 2.0), Rgb([180, 4, 38]));
        assert_eq!(colormap(1.5, 1.0, 2.0), Rgb([221, 221, 221]));
    }
}
