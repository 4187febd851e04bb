//! Fiducial marks located on the component by the survey

use thiserror::Error;

use crate::alignment::geometry::Point2;
use crate::entities::survey::FeaturePoint;

/// Number of fiducial slots on every component
pub const FIDUCIAL_SLOTS: usize = 8;

/// Accepted counts of measured fiducials
pub const VALID_FIDUCIAL_COUNTS: [usize; 4] = [2, 4, 6, 8];

#[derive(Debug, Error, PartialEq)]
pub enum FiducialError {
    #[error("measured {count} fiducial points ({names}); 2, 4, 6, or 8 are required")]
    InvalidCount { count: usize, names: String },

    #[error("fiducial FD{index} measured more than once ('{first}' and '{second}')")]
    Duplicate {
        index: usize,
        first: String,
        second: String,
    },

    #[error("fiducial index {0} is outside FD1..FD8")]
    OutOfRange(usize),
}

/// Eight fiducial slots, FD1..FD8, each measured or missing
#[derive(Debug, Clone, PartialEq)]
pub struct FiducialSet {
    slots: [Option<Point2>; FIDUCIAL_SLOTS],
}

impl FiducialSet {
    /// Build from explicit `(index, point)` pairs, 1-based
    pub fn from_indexed<I>(entries: I) -> Result<Self, FiducialError>
    where
        I: IntoIterator<Item = (usize, Point2)>,
    {
        let mut slots = [None; FIDUCIAL_SLOTS];
        let mut names: [Option<String>; FIDUCIAL_SLOTS] = Default::default();

        for (index, point) in entries {
            Self::place(&mut slots, &mut names, index, point, format!("FD{}", index))?;
        }

        Self::validated(slots, &names)
    }

    /// Collect fiducials from survey features whose name resolves to an index
    ///
    /// Features the resolver does not recognize are ignored.
    pub fn from_features<'a, I, F>(features: I, resolve: F) -> Result<Self, FiducialError>
    where
        I: IntoIterator<Item = &'a FeaturePoint>,
        F: Fn(&str) -> Option<usize>,
    {
        let mut slots = [None; FIDUCIAL_SLOTS];
        let mut names: [Option<String>; FIDUCIAL_SLOTS] = Default::default();

        for feature in features {
            if let Some(index) = resolve(&feature.name) {
                tracing::debug!(feature = %feature.name, index, "matched fiducial");
                Self::place(
                    &mut slots,
                    &mut names,
                    index,
                    Point2::new(feature.x, feature.y),
                    feature.name.clone(),
                )?;
            }
        }

        Self::validated(slots, &names)
    }

    fn place(
        slots: &mut [Option<Point2>; FIDUCIAL_SLOTS],
        names: &mut [Option<String>; FIDUCIAL_SLOTS],
        index: usize,
        point: Point2,
        name: String,
    ) -> Result<(), FiducialError> {
        if index == 0 || index > FIDUCIAL_SLOTS {
            return Err(FiducialError::OutOfRange(index));
        }
        let slot = index - 1;
        if let Some(first) = &names[slot] {
            return Err(FiducialError::Duplicate {
                index,
                first: first.clone(),
                second: name,
            });
        }
        slots[slot] = Some(point);
        names[slot] = Some(name);
        Ok(())
    }

    fn validated(
        slots: [Option<Point2>; FIDUCIAL_SLOTS],
        names: &[Option<String>; FIDUCIAL_SLOTS],
    ) -> Result<Self, FiducialError> {
        let count = slots.iter().filter(|s| s.is_some()).count();
        if !VALID_FIDUCIAL_COUNTS.contains(&count) {
            let names = names
                .iter()
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            return Err(FiducialError::InvalidCount { count, names });
        }
        Ok(Self { slots })
    }

    /// Point at a 1-based index, `None` when missing or out of range
    pub fn get(&self, index: usize) -> Option<Point2> {
        if index == 0 || index > FIDUCIAL_SLOTS {
            return None;
        }
        self.slots[index - 1]
    }

    /// Number of measured fiducials
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Measured fiducials as `(index, point)` pairs, 1-based
    pub fn present(&self) -> impl Iterator<Item = (usize, Point2)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|p| (i + 1, p)))
    }

    /// Slots for the given 1-based indices, preserving order
    pub fn select(&self, indices: &[usize]) -> Vec<Option<Point2>> {
        indices.iter().map(|&i| self.get(i)).collect()
    }
}

/// Nominal tray pin coordinates defining the reference frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePins {
    /// Pin engaging the hole of the component
    pub hole: Point2,
    /// Pin engaging the slot of the component
    pub slot: Point2,
}

impl ReferencePins {
    /// Vector pointing from the hole pin to the slot pin
    pub fn axis(&self) -> Point2 {
        self.slot - self.hole
    }
}
