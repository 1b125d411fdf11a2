use crate::error::{SimError, SimResult};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

// Pixels of exactly this color are walls, everything else is drivable.
pub const BORDER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Classification of a single pixel of the boundary map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pixel {
    Track,
    Boundary,
    OutOfBounds,
}

impl Pixel {
    // Anything that is not drivable stops a ray and kills a car.
    pub fn is_blocked(self) -> bool {
        !matches!(self, Pixel::Track)
    }
}

/// Read-only raster of wall/track pixels, addressed in the same frame as car positions
/// (origin top-left, y grows downwards).
#[derive(Debug, Clone)]
pub struct BoundaryMap {
    width: u32,
    height: u32,
    walls: Vec<bool>,
}

impl BoundaryMap {
    pub fn from_fn(width: u32, height: u32, mut is_wall: impl FnMut(u32, u32) -> bool) -> Self {
        let mut walls = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                walls.push(is_wall(x, y));
            }
        }
        Self { width, height, walls }
    }

    pub fn from_image(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            walls: image.pixels().map(|p| *p == BORDER_COLOR).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn classify(&self, x: i64, y: i64) -> Pixel {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return Pixel::OutOfBounds;
        }
        let idx = y as usize * self.width as usize + x as usize;
        if self.walls[idx] {
            Pixel::Boundary
        } else {
            Pixel::Track
        }
    }

    pub fn is_blocked(&self, x: i64, y: i64) -> bool {
        self.classify(x, y).is_blocked()
    }
}

/// Registry entry: where cars spawn on a given track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    pub name: &'static str,
    pub start: (i32, i32),
    pub heading: f64,
}

pub const TRACKS: &[TrackInfo] = &[
    TrackInfo { name: "spa", start: (789, 247), heading: 135.0 },
    TrackInfo { name: "monza", start: (624, 867), heading: 85.0 },
    TrackInfo { name: "shanghai", start: (968, 857), heading: 200.0 },
    TrackInfo { name: "cota", start: (380, 698), heading: 140.0 },
    TrackInfo { name: "interlagos", start: (672, 772), heading: 300.0 },
    TrackInfo { name: "bahrain", start: (575, 727), heading: 80.0 },
    TrackInfo { name: "silverstone", start: (595, 805), heading: 50.0 },
    TrackInfo { name: "zandvoort", start: (457, 459), heading: 70.0 },
];

pub fn lookup_track(name: &str) -> SimResult<TrackInfo> {
    TRACKS
        .iter()
        .find(|t| t.name == name)
        .copied()
        .ok_or_else(|| SimError::UnknownTrack {
            name: name.to_string(),
            known: TRACKS.iter().map(|t| t.name).collect::<Vec<_>>().join(", "),
        })
}

/// A resolved track: registry entry, collision raster and the original artwork
/// (kept around for the viewer).
#[derive(Debug, Clone)]
pub struct Track {
    pub info: TrackInfo,
    pub map: Arc<BoundaryMap>,
    pub image: RgbaImage,
}

impl Track {
    pub fn image_path(tracks_dir: &Path, name: &str) -> PathBuf {
        tracks_dir.join(format!("{}.png", name))
    }

    /// Resolves `name` in the registry, then decodes `<tracks_dir>/<name>.png`.
    pub fn load(tracks_dir: &Path, name: &str) -> SimResult<Self> {
        let info = lookup_track(name)?;
        let path = Self::image_path(tracks_dir, name);
        let image = image::open(&path)
            .map_err(|source| SimError::MissingAsset { path: path.clone(), source })?
            .to_rgba8();
        let map = Arc::new(BoundaryMap::from_image(&image));
        info!(
            "Loaded track '{}' from {} ({}x{})",
            info.name,
            path.display(),
            map.width(),
            map.height()
        );
        Ok(Self { info, map, image })
    }
}
